use std::path::{Path, PathBuf};

use crate::{
    error::GridforgeError,
    step::BuildStep,
    steps::{
        archive::ArchiveStep,
        cache::AnalysisCacheStep,
        compile::CompileStep,
        pragma::PragmaInjectorStep,
        preprocess::PreprocessStep,
        resolver::ResolverStep,
        subtree::SubtreeStep,
        walk::{FilterRule, WalkStep},
    },
};

/// A glob-matched set of extra flags applied, in declaration order, to every path the pattern
/// matches. Per §6, rules add to the common flags rather than replacing them.
#[derive(Debug, Clone)]
pub struct PathFlagRule {
    pub pattern: glob::Pattern,
    pub add_flags: Vec<String>,
}

/// Run-scoped parameters shared read-only by every step. Constructed once via
/// [`BuildConfig::builder`].
#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub label: String,
    pub workspace: PathBuf,
    pub source_root: PathBuf,
    pub root_symbol: String,

    pub filter_rules: Vec<FilterRule>,
    pub unreferenced_deps: Vec<String>,

    pub c_preprocessor: String,
    pub fortran_preprocessor: String,
    pub c_compiler: String,
    pub fortran_compiler: String,
    pub archiver: String,
    pub linker: String,

    pub common_preprocess_flags: Vec<String>,
    pub preprocess_path_flags: Vec<PathFlagRule>,
    pub common_compile_flags: Vec<String>,
    pub compile_path_flags: Vec<PathFlagRule>,
    pub link_flags: Vec<String>,

    pub n_procs: usize,
    pub skip_if_exists: bool,
    pub build_shared_object: bool,

    steps: Vec<std::sync::Arc<dyn BuildStep>>,
}

impl BuildConfig {
    pub fn builder() -> BuildConfigBuilder {
        BuildConfigBuilder::default()
    }

    pub fn build_output_root(&self) -> PathBuf {
        self.workspace.join(&self.label).join("build_output")
    }

    pub fn source_tree_root(&self) -> PathBuf {
        self.workspace.join(&self.label).join("source")
    }

    pub fn analysis_cache_path(&self) -> PathBuf {
        self.workspace.join(&self.label).join("__analysis.csv")
    }

    pub fn metrics_dir(&self) -> PathBuf {
        self.workspace.join(&self.label).join("metrics")
    }

    pub fn steps(&self) -> &[std::sync::Arc<dyn BuildStep>] {
        &self.steps
    }
}

#[derive(Debug, Default)]
pub struct BuildConfigBuilder {
    label: Option<String>,
    workspace: Option<PathBuf>,
    source_root: Option<PathBuf>,
    root_symbol: Option<String>,
    filter_rules: Vec<FilterRule>,
    unreferenced_deps: Vec<String>,
    c_preprocessor: Option<String>,
    fortran_preprocessor: Option<String>,
    c_compiler: Option<String>,
    fortran_compiler: Option<String>,
    archiver: Option<String>,
    linker: Option<String>,
    common_preprocess_flags: Vec<String>,
    preprocess_path_flags: Vec<PathFlagRule>,
    common_compile_flags: Vec<String>,
    compile_path_flags: Vec<PathFlagRule>,
    link_flags: Vec<String>,
    n_procs: Option<usize>,
    skip_if_exists: bool,
    build_shared_object: bool,
    steps: Vec<std::sync::Arc<dyn BuildStep>>,
}

impl BuildConfigBuilder {
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn workspace(mut self, path: impl Into<PathBuf>) -> Self {
        self.workspace = Some(path.into());
        self
    }

    pub fn source_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_root = Some(path.into());
        self
    }

    pub fn root_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.root_symbol = Some(symbol.into());
        self
    }

    pub fn filter_rule(mut self, fragments: Vec<String>, include: bool) -> Self {
        self.filter_rules.push(FilterRule { fragments, include });
        self
    }

    pub fn unreferenced_dep(mut self, symbol: impl Into<String>) -> Self {
        self.unreferenced_deps.push(symbol.into());
        self
    }

    pub fn c_preprocessor(mut self, cmd: impl Into<String>) -> Self {
        self.c_preprocessor = Some(cmd.into());
        self
    }

    pub fn fortran_preprocessor(mut self, cmd: impl Into<String>) -> Self {
        self.fortran_preprocessor = Some(cmd.into());
        self
    }

    pub fn c_compiler(mut self, cmd: impl Into<String>) -> Self {
        self.c_compiler = Some(cmd.into());
        self
    }

    pub fn fortran_compiler(mut self, cmd: impl Into<String>) -> Self {
        self.fortran_compiler = Some(cmd.into());
        self
    }

    pub fn archiver(mut self, cmd: impl Into<String>) -> Self {
        self.archiver = Some(cmd.into());
        self
    }

    pub fn linker(mut self, cmd: impl Into<String>) -> Self {
        self.linker = Some(cmd.into());
        self
    }

    pub fn common_preprocess_flag(mut self, flag: impl Into<String>) -> Self {
        self.common_preprocess_flags.push(flag.into());
        self
    }

    pub fn preprocess_path_flags(mut self, pattern: &str, flags: Vec<String>) -> Self {
        if let Ok(pattern) = glob::Pattern::new(pattern) {
            self.preprocess_path_flags.push(PathFlagRule { pattern, add_flags: flags });
        }
        self
    }

    pub fn common_compile_flag(mut self, flag: impl Into<String>) -> Self {
        self.common_compile_flags.push(flag.into());
        self
    }

    pub fn compile_path_flags(mut self, pattern: &str, flags: Vec<String>) -> Self {
        if let Ok(pattern) = glob::Pattern::new(pattern) {
            self.compile_path_flags.push(PathFlagRule { pattern, add_flags: flags });
        }
        self
    }

    pub fn link_flag(mut self, flag: impl Into<String>) -> Self {
        self.link_flags.push(flag.into());
        self
    }

    pub fn n_procs(mut self, n: usize) -> Self {
        self.n_procs = Some(n);
        self
    }

    pub fn skip_if_exists(mut self, skip: bool) -> Self {
        self.skip_if_exists = skip;
        self
    }

    pub fn build_shared_object(mut self, shared: bool) -> Self {
        self.build_shared_object = shared;
        self
    }

    pub fn step(mut self, step: impl BuildStep + 'static) -> Self {
        self.steps.push(std::sync::Arc::new(step));
        self
    }

    /// Appends the nine canonical steps (C1-C9) in pipeline order, reading their tool/flag
    /// configuration from the builder's existing fields. Callers building a custom pipeline can
    /// use [`BuildConfigBuilder::step`] instead.
    pub fn add_default_pipeline(mut self) -> Self {
        self.steps.push(std::sync::Arc::new(WalkStep));
        self.steps.push(std::sync::Arc::new(PragmaInjectorStep));
        self.steps.push(std::sync::Arc::new(PreprocessStep));
        self.steps.push(std::sync::Arc::new(AnalysisCacheStep));
        self.steps.push(std::sync::Arc::new(ResolverStep));
        self.steps.push(std::sync::Arc::new(SubtreeStep));
        self.steps.push(std::sync::Arc::new(CompileStep));
        self.steps.push(std::sync::Arc::new(ArchiveStep));
        self
    }

    pub fn build(self) -> Result<BuildConfig, GridforgeError> {
        let label = self.label.ok_or_else(|| GridforgeError::config("a build label is required"))?;
        let workspace = resolve_workspace(self.workspace)?;
        let source_root =
            self.source_root.ok_or_else(|| GridforgeError::config("a source root is required"))?;
        let root_symbol =
            self.root_symbol.ok_or_else(|| GridforgeError::config("a root symbol is required"))?;

        Ok(BuildConfig {
            label,
            workspace,
            source_root,
            root_symbol,
            filter_rules: self.filter_rules,
            unreferenced_deps: self.unreferenced_deps,
            c_preprocessor: self.c_preprocessor.unwrap_or_else(|| "cpp".to_string()),
            fortran_preprocessor: self
                .fortran_preprocessor
                .unwrap_or_else(|| "cpp -traditional-cpp -P".to_string()),
            c_compiler: self.c_compiler.unwrap_or_else(|| "gcc".to_string()),
            fortran_compiler: self.fortran_compiler.unwrap_or_else(|| {
                resolve_env("GFORTRAN").or_else(|| resolve_env("OMPI_FC")).unwrap_or_else(|| "gfortran".to_string())
            }),
            archiver: self.archiver.unwrap_or_else(|| "ar".to_string()),
            linker: self.linker.unwrap_or_else(|| "gcc".to_string()),
            common_preprocess_flags: self.common_preprocess_flags,
            preprocess_path_flags: self.preprocess_path_flags,
            common_compile_flags: self.common_compile_flags,
            compile_path_flags: self.compile_path_flags,
            link_flags: self.link_flags,
            n_procs: self.n_procs.unwrap_or_else(|| num_cpus::get().saturating_sub(1).max(1)),
            skip_if_exists: self.skip_if_exists,
            build_shared_object: self.build_shared_object,
            steps: self.steps,
        })
    }
}

fn resolve_workspace(explicit: Option<PathBuf>) -> Result<PathBuf, GridforgeError> {
    if let Some(path) = explicit {
        return Ok(path);
    }
    resolve_env("FAB_WORKSPACE")
        .map(PathBuf::from)
        .ok_or_else(|| GridforgeError::config("no workspace root given and FAB_WORKSPACE is unset"))
}

fn resolve_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

pub fn matching_flags<'a>(rules: &'a [PathFlagRule], path: &Path) -> Vec<&'a str> {
    rules
        .iter()
        .filter(|rule| rule.pattern.matches_path(path))
        .flat_map(|rule| rule.add_flags.iter().map(String::as_str))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_missing_required_fields() {
        let result = BuildConfig::builder().label("x").build();
        assert!(result.is_err());
    }

    #[test]
    fn builds_with_defaults_when_workspace_given() {
        let config = BuildConfig::builder()
            .label("um")
            .workspace("/tmp/ws")
            .source_root("/tmp/src")
            .root_symbol("um_main")
            .build()
            .unwrap();
        assert_eq!(config.c_compiler, "gcc");
        assert!(config.n_procs >= 1);
    }

    #[test]
    fn matching_flags_composes_in_declaration_order() {
        let rules = vec![
            PathFlagRule { pattern: glob::Pattern::new("**/*.f90").unwrap(), add_flags: vec!["-ffree-form".into()] },
            PathFlagRule { pattern: glob::Pattern::new("**/gcom/**").unwrap(), add_flags: vec!["-DGCOM".into()] },
        ];
        let flags = matching_flags(&rules, Path::new("src/gcom/mod.f90"));
        assert_eq!(flags, vec!["-ffree-form", "-DGCOM"]);
    }
}
