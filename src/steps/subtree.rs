use std::collections::{BTreeMap, BTreeSet};

use crate::{
    config::BuildConfig,
    error::GridforgeError,
    metrics::MetricsSink,
    model::{AnalysedFile, BuildTree, SourcePath, Symbol},
    state::BuildState,
    step::BuildStep,
    steps::resolver::build_symbol_table,
};

/// C7: from `config.root_symbol`, computes the transitive closure of `file_deps` reachable from
/// the file that defines it. Missing file deps are collected, not silently dropped; a non-empty
/// missing set is a fatal `MissingBuildDeps` (no auto-inclusion of files outside the tree).
pub struct SubtreeStep;

impl BuildStep for SubtreeStep {
    fn name(&self) -> &'static str {
        "subtree"
    }

    fn run(&self, state: &mut BuildState, config: &BuildConfig, metrics: &MetricsSink) -> Result<(), GridforgeError> {
        let files = state.require_analysed_files()?;
        let by_path: BTreeMap<SourcePath, AnalysedFile> =
            files.iter().map(|f| (f.fpath.clone(), f.clone())).collect();

        let root_symbol = Symbol::new(&config.root_symbol)
            .ok_or_else(|| GridforgeError::config("root symbol is empty"))?;
        let symbol_table = build_symbol_table(files);
        let root_path = symbol_table.get(&root_symbol).cloned().ok_or_else(|| {
            GridforgeError::config(format!("root symbol `{}` is not defined by any analysed file", config.root_symbol))
        })?;

        let (tree, missing) = extract_subtree(&by_path, &root_path);

        if !missing.is_empty() {
            return Err(GridforgeError::MissingBuildDeps {
                missing: missing.into_iter().map(SourcePath::into_path_buf).collect(),
            });
        }

        metrics.record("subtree", "files", tree.len().to_string());
        debug!(files = tree.len(), "subtree extraction complete");
        state.build_tree = Some(tree);
        Ok(())
    }
}

/// Pure depth-first traversal from `root`, following `file_deps` edges. Returns the closed tree
/// plus any referenced path absent from `by_path`.
pub fn extract_subtree(
    by_path: &BTreeMap<SourcePath, AnalysedFile>,
    root: &SourcePath,
) -> (BuildTree, BTreeSet<SourcePath>) {
    let mut tree = BuildTree::new();
    let mut missing = BTreeSet::new();
    let mut stack = vec![root.clone()];

    while let Some(path) = stack.pop() {
        if tree.contains_key(&path) {
            continue;
        }
        match by_path.get(&path) {
            Some(file) => {
                tree.insert(path.clone(), file.clone());
                for dep in &file.file_deps {
                    if !tree.contains_key(dep) {
                        stack.push(dep.clone());
                    }
                }
            }
            None => {
                missing.insert(path);
            }
        }
    }

    (tree, missing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FileHash;

    #[test]
    fn closure_is_closed_under_file_deps() {
        let mut main = AnalysedFile::new(SourcePath::new("main.f90"), FileHash(1));
        main.file_deps.insert(SourcePath::new("m.f90"));
        let m = AnalysedFile::new(SourcePath::new("m.f90"), FileHash(2));

        let by_path: BTreeMap<_, _> =
            [(main.fpath.clone(), main.clone()), (m.fpath.clone(), m.clone())].into_iter().collect();

        let (tree, missing) = extract_subtree(&by_path, &main.fpath);
        assert!(missing.is_empty());
        assert!(tree.contains_key(&SourcePath::new("main.f90")));
        assert!(tree.contains_key(&SourcePath::new("m.f90")));
    }

    #[test]
    fn reports_missing_dependency_without_including_it() {
        let mut main = AnalysedFile::new(SourcePath::new("main.f90"), FileHash(1));
        main.file_deps.insert(SourcePath::new("ghost.f90"));
        let by_path: BTreeMap<_, _> = [(main.fpath.clone(), main.clone())].into_iter().collect();

        let (tree, missing) = extract_subtree(&by_path, &main.fpath);
        assert_eq!(missing.len(), 1);
        assert!(!tree.contains_key(&SourcePath::new("ghost.f90")));
    }
}
