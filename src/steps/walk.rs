use walkdir::WalkDir;

use crate::{
    config::BuildConfig, error::GridforgeError, metrics::MetricsSink, model::SourcePath,
    state::BuildState, step::BuildStep, utils::slashed,
};

/// One ordered include/exclude rule: `include` is the verdict applied to every path containing
/// any fragment in `fragments`. The last matching rule wins (§4.1).
#[derive(Debug, Clone)]
pub struct FilterRule {
    pub fragments: Vec<String>,
    pub include: bool,
}

/// C1: recursively enumerates `config.source_root`, applies the ordered filter rules, and
/// writes the sorted survivor list to `all_source`.
pub struct WalkStep;

impl BuildStep for WalkStep {
    fn name(&self) -> &'static str {
        "walk"
    }

    fn run(&self, state: &mut BuildState, config: &BuildConfig, metrics: &MetricsSink) -> Result<(), GridforgeError> {
        trace!(root = %config.source_root.display(), "walking source tree");
        let mut found = Vec::new();
        for entry in WalkDir::new(&config.source_root).same_file_system(true).follow_links(false) {
            let entry = entry.map_err(|e| {
                GridforgeError::io(config.source_root.clone(), std::io::Error::new(std::io::ErrorKind::Other, e))
            })?;
            if entry.file_type().is_file() {
                found.push(entry.into_path());
            }
        }
        found.sort();

        let mut wanted: Vec<bool> = vec![true; found.len()];
        for rule in &config.filter_rules {
            for (path, flag) in found.iter().zip(wanted.iter_mut()) {
                let rendered = slashed(path);
                if rule.fragments.iter().any(|fragment| rendered.contains(fragment.as_str())) {
                    *flag = rule.include;
                }
            }
        }

        let survivors: Vec<SourcePath> = found
            .into_iter()
            .zip(wanted)
            .filter_map(|(path, keep)| keep.then(|| SourcePath::new(path)))
            .collect();

        if survivors.is_empty() {
            return Err(GridforgeError::config(format!(
                "no source files survived filtering under {}",
                config.source_root.display()
            )));
        }

        debug!(count = survivors.len(), "source walk complete");
        metrics.record("walk", "files_found", survivors.len().to_string());
        state.all_source = Some(survivors);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricsHandle;
    use std::fs;

    fn config_for(dir: &std::path::Path, rules: Vec<FilterRule>) -> BuildConfig {
        let mut builder = BuildConfig::builder()
            .label("t")
            .workspace(dir.join("ws"))
            .source_root(dir.to_path_buf())
            .root_symbol("main");
        for rule in rules {
            builder = builder.filter_rule(rule.fragments, rule.include);
        }
        builder.build().unwrap()
    }

    #[test]
    fn last_matching_rule_wins() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("tests")).unwrap();
        fs::write(dir.path().join("tests/t1.f90"), "program p\nend program\n").unwrap();
        fs::write(dir.path().join("main.f90"), "program p\nend program\n").unwrap();

        let config = config_for(
            dir.path(),
            vec![
                FilterRule { fragments: vec![".f90".into()], include: true },
                FilterRule { fragments: vec!["tests/".into()], include: false },
            ],
        );
        let mut state = BuildState::default();
        let (sink, _handle) = MetricsHandle::spawn();
        WalkStep.run(&mut state, &config, &sink).unwrap();

        let found = state.all_source.unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].as_path().ends_with("main.f90"));
    }

    #[test]
    fn empty_result_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(dir.path(), vec![]);
        let mut state = BuildState::default();
        let (sink, _handle) = MetricsHandle::spawn();
        assert!(WalkStep.run(&mut state, &config, &sink).is_err());
    }
}
