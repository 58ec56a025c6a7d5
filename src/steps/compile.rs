use std::{collections::BTreeSet, path::PathBuf, process::Command};

use rayon::prelude::*;

use crate::{
    config::{matching_flags, BuildConfig},
    error::GridforgeError,
    metrics::MetricsSink,
    model::{AnalysedFile, CompileUnit, SourcePath, Symbol},
    state::BuildState,
    step::BuildStep,
    utils::{create_parent_dir_all, template_flag},
};

/// C8: drives wave-by-wave parallel compilation of the `BuildTree`. A file becomes *ready* once
/// every module it `use`s has already been compiled; each wave runs on a fresh `rayon::ThreadPool`
/// torn down at wave end, so a compile failure in one pass can never poison the next.
pub struct CompileStep;

impl BuildStep for CompileStep {
    fn name(&self) -> &'static str {
        "compile"
    }

    fn run(&self, state: &mut BuildState, config: &BuildConfig, metrics: &MetricsSink) -> Result<(), GridforgeError> {
        let tree = state.require_build_tree()?;
        let mut remaining: Vec<AnalysedFile> = tree.values().cloned().collect();

        let all_module_defs: BTreeSet<Symbol> =
            remaining.iter().flat_map(|f| f.module_defs.iter().cloned()).collect();

        let mut compiled_names: BTreeSet<Symbol> = BTreeSet::new();
        let mut per_pass_counts = Vec::new();
        let mut compiled_c = Vec::new();
        let mut compiled_fortran = Vec::new();

        while !remaining.is_empty() {
            let (ready, blocked): (Vec<_>, Vec<_>) = remaining.into_iter().partition(|file| {
                file.symbol_deps
                    .intersection(&all_module_defs)
                    .all(|dep| compiled_names.contains(dep))
            });

            if ready.is_empty() {
                let blockers = blocked
                    .iter()
                    .map(|file| {
                        let unmet: Vec<String> = file
                            .symbol_deps
                            .intersection(&all_module_defs)
                            .filter(|dep| !compiled_names.contains(*dep))
                            .map(|s| s.as_str().to_string())
                            .collect();
                        (file.fpath.clone().into_path_buf(), unmet)
                    })
                    .collect();
                return Err(GridforgeError::UnresolvableGraph { blockers });
            }

            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(config.n_procs)
                .build()
                .map_err(|e| GridforgeError::config(e.to_string()))?;

            let results: Vec<Result<CompileUnit, (PathBuf, String)>> =
                pool.install(|| ready.par_iter().map(|file| compile_one(file, config)).collect());

            let mut failures = Vec::new();
            let mut units = Vec::new();
            for result in results {
                match result {
                    Ok(unit) => units.push(unit),
                    Err(failure) => failures.push(failure),
                }
            }

            if !failures.is_empty() {
                return Err(GridforgeError::Compile { failures });
            }

            for unit in &units {
                compiled_names.extend(unit.source.module_defs.iter().cloned());
                if is_fortran(unit.source.fpath.as_path()) {
                    compiled_fortran.push(unit.clone());
                } else {
                    compiled_c.push(unit.clone());
                }
            }

            per_pass_counts.push(ready.len());
            debug!(pass = per_pass_counts.len(), files = ready.len(), "compile pass complete");
            remaining = blocked;
        }

        metrics.record("compile", "passes", per_pass_counts.len().to_string());
        metrics.record(
            "compile",
            "files",
            (compiled_c.len() + compiled_fortran.len()).to_string(),
        );

        state.compiled_c = Some(compiled_c);
        state.compiled_fortran = Some(compiled_fortran);
        Ok(())
    }
}

fn is_fortran(path: &std::path::Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()).map(|e| e.to_lowercase()),
        Some(ref ext) if ext == "f90" || ext == "f" || ext == "f77"
    )
}

fn compile_one(file: &AnalysedFile, config: &BuildConfig) -> Result<CompileUnit, (PathBuf, String)> {
    let input = file.fpath.as_path();
    let output = input.with_extension("o");

    create_parent_dir_all(&output).map_err(|e| (input.to_path_buf(), e.to_string()))?;

    let (program, rules) = if is_fortran(input) {
        (&config.fortran_compiler, &config.compile_path_flags)
    } else {
        (&config.c_compiler, &config.compile_path_flags)
    };

    let mut parts = program.split_whitespace();
    let binary = parts.next().ok_or_else(|| (input.to_path_buf(), "empty compiler command".to_string()))?;
    let mut cmd = Command::new(binary);
    cmd.args(parts);
    for flag in &config.common_compile_flags {
        cmd.arg(template_flag(flag, &config.source_root, &config.build_output_root(), input.parent()));
    }
    for flag in matching_flags(rules, input) {
        cmd.arg(template_flag(flag, &config.source_root, &config.build_output_root(), input.parent()));
    }
    cmd.arg("-c");
    if is_fortran(input) {
        cmd.arg("-J").arg(config.build_output_root());
    }
    cmd.arg(input).arg("-o").arg(&output);

    let result = cmd.output().map_err(|e| (input.to_path_buf(), e.to_string()))?;
    if !result.status.success() {
        return Err((input.to_path_buf(), String::from_utf8_lossy(&result.stderr).into_owned()));
    }

    Ok(CompileUnit { source: file.clone(), object_path: SourcePath::new(output) })
}
