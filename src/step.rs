use crate::{config::BuildConfig, error::GridforgeError, metrics::MetricsSink, state::BuildState};

/// One stage of the build pipeline. A step reads whichever `BuildState` slots it needs and
/// writes whichever it produces; the pipeline itself doesn't know or enforce step ordering
/// beyond what the caller assembles in `BuildConfig`.
pub trait BuildStep: Send + Sync {
    fn name(&self) -> &'static str;

    fn run(
        &self,
        state: &mut BuildState,
        config: &BuildConfig,
        metrics: &MetricsSink,
    ) -> Result<(), GridforgeError>;
}
