use std::collections::BTreeMap;

use crate::{
    config::BuildConfig, error::GridforgeError, metrics::MetricsSink, model::Symbol,
    state::BuildState, step::BuildStep,
};

/// C6: builds the symbol -> defining-file table, turns `symbol_deps` into `file_deps`, resolves
/// `DEPENDS ON:` comments against analysed C files, and splices in user-declared unreferenced
/// dependencies. Mutates `analysed_files` in place to populate `file_deps`.
pub struct ResolverStep;

impl BuildStep for ResolverStep {
    fn name(&self) -> &'static str {
        "resolver"
    }

    fn run(&self, state: &mut BuildState, config: &BuildConfig, metrics: &MetricsSink) -> Result<(), GridforgeError> {
        let mut files = state.require_analysed_files()?.to_vec();

        let symbol_table = build_symbol_table(&files);
        let stem_table: BTreeMap<String, usize> = files
            .iter()
            .enumerate()
            .filter_map(|(i, f)| {
                f.fpath.as_path().file_stem().and_then(|s| s.to_str()).map(|s| (s.to_string(), i))
            })
            .collect();

        let mut unresolved_count = 0usize;
        for i in 0..files.len() {
            let deps = files[i].symbol_deps.clone();
            for symbol in &deps {
                match symbol_table.get(symbol) {
                    Some(target) if *target != files[i].fpath => {
                        files[i].file_deps.insert(target.clone());
                    }
                    Some(_) => {}
                    None => {
                        unresolved_count += 1;
                        warn!(file = %files[i].fpath, symbol = %symbol, "unresolved symbol dependency");
                    }
                }
            }

            let comment_deps = files[i].mo_commented_file_deps.clone();
            for stem in &comment_deps {
                if let Some(&target_idx) = stem_table.get(stem) {
                    let target_path = files[target_idx].fpath.clone();
                    files[i].file_deps.insert(target_path);
                } else {
                    warn!(file = %files[i].fpath, stem = %stem, "DEPENDS ON: comment references unknown file");
                }
            }
        }

        let root_symbol = Symbol::new(&config.root_symbol);
        let root_path = root_symbol.as_ref().and_then(|s| symbol_table.get(s).cloned());

        for declared in &config.unreferenced_deps {
            let Some(symbol) = Symbol::new(declared) else { continue };
            match symbol_table.get(&symbol) {
                Some(target) => {
                    // Splice the file defining this otherwise-invisible symbol onto the root, so
                    // C7's traversal pulls in its whole transitive closure even though nothing
                    // in the tree actually references it via `use`/`extern` (§4.6 step 4).
                    if let Some(root) = &root_path {
                        if let Some(root_file) = files.iter_mut().find(|f| &f.fpath == root) {
                            if &root_file.fpath != target {
                                root_file.file_deps.insert(target.clone());
                            }
                        }
                    }
                }
                None => warn!(symbol = %declared, "user-declared unreferenced dependency has no definition"),
            }
        }

        metrics.record("resolver", "unresolved_symbols", unresolved_count.to_string());
        debug!(files = files.len(), unresolved = unresolved_count, "dependency resolution complete");

        state.analysed_files = Some(files);
        Ok(())
    }
}

/// Pure: inverts every file's `symbol_defs` into one `Symbol -> SourcePath` table. When a symbol
/// is defined by more than one file, the lexicographically-first defining file wins and the
/// collision is logged; this function's output depends only on its input.
pub fn build_symbol_table(files: &[crate::model::AnalysedFile]) -> BTreeMap<Symbol, crate::model::SourcePath> {
    let mut table: BTreeMap<Symbol, crate::model::SourcePath> = BTreeMap::new();
    for file in files {
        for symbol in &file.symbol_defs {
            match table.get(symbol) {
                Some(existing) if existing <= &file.fpath => {}
                Some(existing) => {
                    warn!(symbol = %symbol, first = %existing, other = %file.fpath, "symbol defined by multiple files, keeping lexicographically-first");
                }
                None => {
                    table.insert(symbol.clone(), file.fpath.clone());
                }
            }
        }
    }
    table
}
