use std::process::Command;

use crate::{
    config::BuildConfig, error::GridforgeError, metrics::MetricsSink, model::CompileUnit,
    state::BuildState, step::BuildStep, utils::create_parent_dir_all,
};

/// C9: collects every `CompileUnit` produced by C8 and invokes the configured archiver or linker
/// to produce the final library or executable. Honours the same debug-skip contract as C3: when
/// `config.skip_if_exists` is set and the output already exists, the external invocation is
/// bypassed and the expected path is returned unchanged.
pub struct ArchiveStep;

impl BuildStep for ArchiveStep {
    fn name(&self) -> &'static str {
        "archive"
    }

    fn run(&self, state: &mut BuildState, config: &BuildConfig, metrics: &MetricsSink) -> Result<(), GridforgeError> {
        let mut objects: Vec<&CompileUnit> = Vec::new();
        if let Some(units) = &state.compiled_fortran {
            objects.extend(units.iter());
        }
        if let Some(units) = &state.compiled_c {
            objects.extend(units.iter());
        }

        let output = config.workspace.join(&config.label).join(&config.label);

        if config.skip_if_exists && output.exists() {
            debug!(output = %output.display(), "link step skipped, output already exists");
            metrics.record("archive", "skipped", "true");
            return Ok(());
        }

        create_parent_dir_all(&output)?;

        let mut flags = config.link_flags.clone();
        if config.build_shared_object {
            for required in ["-fPIC", "-shared"] {
                if !flags.iter().any(|f| f == required) {
                    flags.push(required.to_string());
                }
            }
        }

        let program = if config.build_shared_object { &config.linker } else { &config.archiver };
        let mut parts = program.split_whitespace();
        let binary = parts.next().ok_or_else(|| GridforgeError::config("empty archiver/linker command"))?;
        let mut cmd = Command::new(binary);
        cmd.args(parts);

        if config.build_shared_object {
            cmd.args(&flags);
            cmd.arg("-o").arg(&output);
            cmd.args(objects.iter().map(|unit| unit.object_path.as_path()));
        } else {
            // `ar rcs output obj1 obj2 ...`
            cmd.arg("rcs").arg(&output);
            cmd.args(objects.iter().map(|unit| unit.object_path.as_path()));
            cmd.args(&flags);
        }

        let result = cmd.output().map_err(|e| GridforgeError::Link { message: e.to_string() })?;
        if !result.status.success() {
            return Err(GridforgeError::Link { message: String::from_utf8_lossy(&result.stderr).into_owned() });
        }

        metrics.record("archive", "objects", objects.len().to_string());
        debug!(output = %output.display(), objects = objects.len(), "link step complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnalysedFile, FileHash, SourcePath};

    fn config_for(dir: &std::path::Path, skip: bool, shared: bool) -> BuildConfig {
        BuildConfig::builder()
            .label("um")
            .workspace(dir.to_path_buf())
            .source_root(dir.join("src"))
            .root_symbol("um_main")
            .skip_if_exists(skip)
            .build_shared_object(shared)
            .build()
            .unwrap()
    }

    #[test]
    fn skip_if_exists_bypasses_invocation() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(dir.path(), true, false);
        let output = config.workspace.join(&config.label).join(&config.label);
        std::fs::create_dir_all(output.parent().unwrap()).unwrap();
        std::fs::write(&output, b"stale").unwrap();

        let mut state = BuildState::default();
        let unit = CompileUnit {
            source: AnalysedFile::new(SourcePath::new("m.f90"), FileHash(1)),
            object_path: SourcePath::new("m.o"),
        };
        state.compiled_fortran = Some(vec![unit]);
        let (sink, _handle) = crate::metrics::MetricsHandle::spawn();

        ArchiveStep.run(&mut state, &config, &sink).unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), b"stale");
    }

    #[test]
    fn shared_object_flags_include_fpic_shared() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_for(dir.path(), false, true);
        config.linker = "true".to_string();
        let mut state = BuildState::default();
        let (sink, _handle) = crate::metrics::MetricsHandle::spawn();
        // `true` ignores all arguments and exits 0, so this only exercises flag assembly & the
        // success path, not actual object-file handling.
        assert!(ArchiveStep.run(&mut state, &config, &sink).is_ok());
    }
}
