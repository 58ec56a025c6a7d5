use crate::{
    error::GridforgeError,
    model::{AnalysedFile, BuildTree, CompileUnit, SourcePath},
};

/// Typed artefact store shared between steps within a single run (design note: "Artefact store
/// typing"). Replaces a loosely-typed name -> value dictionary with one `Option<T>` field per
/// named slot, so a step reading a slot before it's populated is a `Config` error naming the
/// field, not a runtime lookup miss.
#[derive(Debug, Default)]
pub struct BuildState {
    pub all_source: Option<Vec<SourcePath>>,
    pub pragmad_c: Option<Vec<SourcePath>>,
    pub preprocessed_c: Option<Vec<SourcePath>>,
    pub preprocessed_fortran: Option<Vec<SourcePath>>,
    pub analysed_files: Option<Vec<AnalysedFile>>,
    pub build_tree: Option<BuildTree>,
    pub compiled_c: Option<Vec<CompileUnit>>,
    pub compiled_fortran: Option<Vec<CompileUnit>>,
}

impl BuildState {
    pub fn require_all_source(&self) -> Result<&[SourcePath], GridforgeError> {
        self.all_source.as_deref().ok_or_else(|| missing("all_source"))
    }

    pub fn require_analysed_files(&self) -> Result<&[AnalysedFile], GridforgeError> {
        self.analysed_files.as_deref().ok_or_else(|| missing("analysed_files"))
    }

    pub fn require_build_tree(&self) -> Result<&BuildTree, GridforgeError> {
        self.build_tree.as_ref().ok_or_else(|| missing("build_tree"))
    }
}

fn missing(slot: &str) -> GridforgeError {
    GridforgeError::config(format!("build state slot `{slot}` was read before it was populated"))
}
