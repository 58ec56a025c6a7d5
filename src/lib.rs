#![doc = include_str!("../README.md")]
#![warn(rustdoc::all)]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![deny(unused_must_use, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

#[macro_use]
extern crate tracing;

pub mod error;
pub use error::{GridforgeError, Result};

pub mod model;
pub use model::{
    AnalysedFile, AnalysisOutcome, BuildTree, CompileUnit, EmptySourceFile, FileHash, SourcePath,
    Symbol,
};

pub mod config;
pub use config::{matching_flags, BuildConfig, BuildConfigBuilder, PathFlagRule};

pub mod state;
pub use state::BuildState;

pub mod metrics;
pub use metrics::{MetricsEvent, MetricsHandle, MetricsSink};

pub mod step;
pub use step::BuildStep;

pub mod steps;
pub use steps::{
    archive::ArchiveStep, cache::AnalysisCacheStep, compile::CompileStep,
    pragma::PragmaInjectorStep, preprocess::PreprocessStep, resolver::ResolverStep,
    subtree::SubtreeStep, walk::{FilterRule, WalkStep},
};

pub mod utils;

/// Utilities for scaffolding and tearing down throwaway build workspaces, used by this crate's
/// own integration tests and available to embedders that want the same scaffolding.
#[cfg(feature = "project-util")]
pub mod testing;

/// Installs a default `tracing-subscriber` formatter reading `RUST_LOG`, for binaries that embed
/// this crate and want sensible output without composing their own subscriber.
#[cfg(feature = "subscriber")]
pub fn install_default_subscriber() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Runs every step of `config.steps()` in order against a fresh [`BuildState`], spawning and
/// joining the metrics collector around the run. This is the single entry point a caller needs
/// once a [`BuildConfig`] has been built with [`BuildConfigBuilder::add_default_pipeline`] (or a
/// custom step list).
pub fn run(config: &BuildConfig) -> Result<BuildState> {
    let mut state = BuildState::default();
    let (metrics, handle) = MetricsHandle::spawn();

    for step in config.steps() {
        info!(step = step.name(), "running build step");
        step.run(&mut state, config, &metrics)?;
    }

    drop(metrics);
    handle.join_and_write(&config.metrics_dir(), &config.label)?;
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    /// End-to-end scenario S1 from the design spec: a single Fortran module and its user,
    /// compiled in two passes and archived into a static library.
    #[test]
    fn single_fortran_module_builds_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let source_root = dir.path().join("src");
        fs::create_dir_all(&source_root).unwrap();
        fs::write(source_root.join("main.f90"), "program p\n  use m\n  call m_sub\nend program\n").unwrap();
        fs::write(
            source_root.join("m.f90"),
            "module m\ncontains\n  subroutine m_sub\n  end subroutine\nend module\n",
        )
        .unwrap();

        let fake_preprocessor = write_fake_preprocessor(dir.path());
        let fake_compiler = write_fake_compiler(dir.path());
        let fake_archiver = write_fake_archiver(dir.path());

        let config = BuildConfig::builder()
            .label("s1")
            .workspace(dir.path().join("ws"))
            .source_root(source_root)
            .root_symbol("p")
            .fortran_preprocessor(fake_preprocessor)
            .fortran_compiler(fake_compiler)
            .archiver(fake_archiver)
            .n_procs(2)
            .add_default_pipeline()
            .build()
            .unwrap();

        let state = run(&config).unwrap();

        let tree = state.build_tree.unwrap();
        assert_eq!(tree.len(), 2);

        let compiled = state.compiled_fortran.unwrap();
        assert_eq!(compiled.len(), 2);

        let output = config.workspace.join(&config.label).join(&config.label);
        assert!(output.exists());
    }

    /// S4 from the design spec: a mutual-use cycle between two Fortran files is reported as an
    /// unresolvable graph rather than looping forever.
    #[test]
    fn mutual_use_cycle_fails_the_build() {
        let dir = tempfile::tempdir().unwrap();
        let source_root = dir.path().join("src");
        fs::create_dir_all(&source_root).unwrap();
        fs::write(source_root.join("x.f90"), "module x\n  use y\nend module\n").unwrap();
        fs::write(source_root.join("y.f90"), "module y\n  use x\nend module\n").unwrap();

        let config = BuildConfig::builder()
            .label("s4")
            .workspace(dir.path().join("ws"))
            .source_root(source_root)
            .root_symbol("x")
            .fortran_preprocessor(write_fake_preprocessor(dir.path()))
            .add_default_pipeline()
            .build()
            .unwrap();

        let result = run(&config);
        assert!(matches!(result, Err(GridforgeError::UnresolvableGraph { .. })));
    }

    /// A shell-script stand-in for the Fortran preprocessor: copies its input (the argument
    /// immediately before `-o`) to its output (the final argument), since these tests only need
    /// preprocessing to produce *a* file at the relocated path, not real macro expansion.
    fn write_fake_preprocessor(dir: &std::path::Path) -> String {
        let script = dir.join("fake_cpp.sh");
        fs::write(
            &script,
            "#!/bin/sh\na=\"\"\nb=\"\"\nc=\"\"\nfor arg in \"$@\"; do\n  a=\"$b\"\n  b=\"$c\"\n  c=\"$arg\"\ndone\ncp \"$a\" \"$c\"\n",
        )
        .unwrap();
        make_executable(&script);
        format!("sh {}", script.display())
    }

    fn write_fake_compiler(dir: &std::path::Path) -> String {
        let script = dir.join("fake_compiler.sh");
        fs::write(
            &script,
            "#!/bin/sh\nwhile [ \"$#\" -gt 0 ]; do\n  if [ \"$1\" = \"-o\" ]; then\n    shift\n    touch \"$1\"\n    exit 0\n  fi\n  shift\ndone\nexit 1\n",
        )
        .unwrap();
        make_executable(&script);
        format!("sh {}", script.display())
    }

    fn write_fake_archiver(dir: &std::path::Path) -> String {
        let script = dir.join("fake_archiver.sh");
        fs::write(&script, "#!/bin/sh\nshift\ntouch \"$1\"\nexit 0\n").unwrap();
        make_executable(&script);
        format!("sh {}", script.display())
    }

    fn make_executable(path: &std::path::Path) {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
        }
        #[cfg(not(unix))]
        let _ = path;
    }
}
