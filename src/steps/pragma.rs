use once_cell::sync::Lazy;
use regex::Regex;

use crate::{
    config::BuildConfig,
    error::GridforgeError,
    metrics::MetricsSink,
    model::SourcePath,
    state::BuildState,
    step::BuildStep,
    utils::{read_source, relocate, write_file},
};

static USR_INCLUDE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"^\s*#include\s*"([^"]+)"\s*$"#).unwrap());
static SYS_INCLUDE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*#include\s*<([^>]+)>\s*$").unwrap());

const USR_START: &str = "#pragma GridforgeUsrIncludeStart";
const USR_END: &str = "#pragma GridforgeUsrIncludeEnd";
const SYS_START: &str = "#pragma GridforgeSysIncludeStart";
const SYS_END: &str = "#pragma GridforgeSysIncludeEnd";

/// C2: wraps every `#include` directive in a `.c` file with pragma markers distinguishing
/// project headers from system headers, so the C analyser (C4) can skip system-header regions
/// without re-parsing them.
pub struct PragmaInjectorStep;

impl BuildStep for PragmaInjectorStep {
    fn name(&self) -> &'static str {
        "pragma"
    }

    fn run(&self, state: &mut BuildState, config: &BuildConfig, metrics: &MetricsSink) -> Result<(), GridforgeError> {
        let all_source = state.require_all_source()?;
        let mut pragmad = Vec::new();
        for path in all_source {
            if path.as_path().extension().and_then(|e| e.to_str()) != Some("c") {
                continue;
            }
            let content = read_source(path.as_path())?;
            let rewritten = inject_pragmas(&content);
            let output = relocate(path.as_path(), &config.source_root, &config.build_output_root())?
                .with_extension("prag");
            write_file(&output, &rewritten)?;
            pragmad.push(SourcePath::new(output));
        }
        debug!(count = pragmad.len(), "pragma injection complete");
        metrics.record("pragma", "files", pragmad.len().to_string());
        state.pragmad_c = Some(pragmad);
        Ok(())
    }
}

fn inject_pragmas(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    for line in content.lines() {
        if USR_INCLUDE.is_match(line) {
            out.push_str(USR_START);
            out.push('\n');
            out.push_str(line);
            out.push('\n');
            out.push_str(USR_END);
            out.push('\n');
        } else if SYS_INCLUDE.is_match(line) {
            out.push_str(SYS_START);
            out.push('\n');
            out.push_str(line);
            out.push('\n');
            out.push_str(SYS_END);
            out.push('\n');
        } else {
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}
