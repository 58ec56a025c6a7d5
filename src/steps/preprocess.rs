use std::{path::PathBuf, process::Command};

use rayon::prelude::*;

use crate::{
    config::{matching_flags, BuildConfig},
    error::GridforgeError,
    metrics::MetricsSink,
    model::SourcePath,
    state::BuildState,
    step::BuildStep,
    utils::{create_parent_dir_all, relocate, template_flag},
};

/// C3: invokes the configured C and Fortran preprocessors over a `rayon` worker pool, one
/// external process per file, mirroring the teacher's `compile_parallel` fan-out.
pub struct PreprocessStep;

impl BuildStep for PreprocessStep {
    fn name(&self) -> &'static str {
        "preprocess"
    }

    fn run(&self, state: &mut BuildState, config: &BuildConfig, metrics: &MetricsSink) -> Result<(), GridforgeError> {
        let all_source = state.require_all_source()?.to_vec();
        let fortran_inputs: Vec<PathBuf> = all_source
            .iter()
            .filter(|p| is_fortran(p.as_path()))
            .map(|p| p.as_path().to_path_buf())
            .collect();

        let c_inputs: Vec<PathBuf> = state
            .pragmad_c
            .as_ref()
            .map(|v| v.iter().map(|p| p.as_path().to_path_buf()).collect())
            .unwrap_or_default();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.n_procs)
            .build()
            .map_err(|e| GridforgeError::config(e.to_string()))?;

        let (fortran_results, c_results) = pool.install(|| {
            rayon::join(
                || preprocess_many(&fortran_inputs, config, Lang::Fortran),
                || preprocess_many(&c_inputs, config, Lang::C),
            )
        });

        let (fortran_outputs, fortran_failures) = split(fortran_results);
        let (c_outputs, c_failures) = split(c_results);

        let mut failures = fortran_failures;
        failures.extend(c_failures);
        if !failures.is_empty() {
            return Err(GridforgeError::Preprocess { failures });
        }

        metrics.record("preprocess", "fortran_files", fortran_outputs.len().to_string());
        metrics.record("preprocess", "c_files", c_outputs.len().to_string());
        debug!(fortran = fortran_outputs.len(), c = c_outputs.len(), "preprocessing complete");

        state.preprocessed_fortran = Some(fortran_outputs);
        state.preprocessed_c = Some(c_outputs);
        Ok(())
    }
}

enum Lang {
    Fortran,
    C,
}

fn is_fortran(path: &std::path::Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("f90") | Some("f") | Some("F90") | Some("F")
    )
}

fn preprocess_many(
    inputs: &[PathBuf],
    config: &BuildConfig,
    lang: Lang,
) -> Vec<Result<SourcePath, (PathBuf, String)>> {
    inputs.par_iter().map(|input| preprocess_one(input, config, &lang)).collect()
}

fn preprocess_one(input: &PathBuf, config: &BuildConfig, lang: &Lang) -> Result<SourcePath, (PathBuf, String)> {
    let output = relocate(input, &config.source_root, &config.build_output_root())
        .map_err(|e| (input.clone(), e.to_string()))?;

    if config.skip_if_exists && output.exists() {
        return Ok(SourcePath::new(output));
    }

    create_parent_dir_all(&output).map_err(|e| (input.clone(), e.to_string()))?;

    let (program, rules) = match lang {
        Lang::Fortran => (&config.fortran_preprocessor, &config.preprocess_path_flags),
        Lang::C => (&config.c_preprocessor, &config.preprocess_path_flags),
    };

    let mut parts = program.split_whitespace();
    let binary = parts.next().ok_or_else(|| (input.clone(), "empty preprocessor command".to_string()))?;
    let mut cmd = Command::new(binary);
    cmd.args(parts);
    for flag in &config.common_preprocess_flags {
        cmd.arg(template_flag(flag, &config.source_root, &config.build_output_root(), input.parent()));
    }
    for flag in matching_flags(rules, input) {
        cmd.arg(template_flag(flag, &config.source_root, &config.build_output_root(), input.parent()));
    }
    cmd.arg(input).arg("-o").arg(&output);

    let result = cmd.output().map_err(|e| (input.clone(), e.to_string()))?;
    if !result.status.success() {
        return Err((input.clone(), String::from_utf8_lossy(&result.stderr).into_owned()));
    }
    Ok(SourcePath::new(output))
}

fn split(results: Vec<Result<SourcePath, (PathBuf, String)>>) -> (Vec<SourcePath>, Vec<(PathBuf, String)>) {
    let mut ok = Vec::new();
    let mut err = Vec::new();
    for r in results {
        match r {
            Ok(path) => ok.push(path),
            Err(e) => err.push(e),
        }
    }
    (ok, err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_fortran_recognises_extensions() {
        assert!(is_fortran(std::path::Path::new("a.f90")));
        assert!(is_fortran(std::path::Path::new("a.F90")));
        assert!(!is_fortran(std::path::Path::new("a.c")));
    }
}
