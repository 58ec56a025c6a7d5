use std::{
    collections::{BTreeMap, BTreeSet},
    fs::{self, File},
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
};

use rayon::prelude::*;

use crate::{
    config::BuildConfig,
    error::GridforgeError,
    metrics::MetricsSink,
    model::{AnalysedFile, FileHash, SourcePath, Symbol},
    state::BuildState,
    step::BuildStep,
    steps::analyse::analyse_path,
    utils::create_parent_dir_all,
};

const HEADER: &str = "fpath,file_hash,module_defs,symbol_defs,symbol_deps,file_deps,mo_commented_file_deps";

/// C4+C5 combined: for every preprocessed file, reuses its cached `AnalysedFile` if the content
/// hash is unchanged, otherwise re-analyses it; writes a complete, streaming-flushed cache file
/// so a crash mid-analysis loses at most the files analysed after the last flush.
pub struct AnalysisCacheStep;

impl BuildStep for AnalysisCacheStep {
    fn name(&self) -> &'static str {
        "analysis_cache"
    }

    fn run(&self, state: &mut BuildState, config: &BuildConfig, metrics: &MetricsSink) -> Result<(), GridforgeError> {
        let mut inputs = Vec::new();
        if let Some(files) = &state.preprocessed_fortran {
            inputs.extend(files.iter().cloned());
        }
        if let Some(files) = &state.preprocessed_c {
            inputs.extend(files.iter().cloned());
        }

        let cache_path = config.analysis_cache_path();
        let cached = load_cache_entries(&cache_path)?;

        let mut unchanged = Vec::new();
        let mut stale = Vec::new();
        for path in &inputs {
            match cached.get(path) {
                Some(previous) if current_hash(path)? == previous.file_hash => unchanged.push(previous.clone()),
                _ => stale.push(path.clone()),
            }
        }

        create_parent_dir_all(&cache_path)?;
        let file = File::create(&cache_path).map_err(|e| GridforgeError::io(&cache_path, e))?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{HEADER}").map_err(|e| GridforgeError::io(&cache_path, e))?;
        for entry in &unchanged {
            write_row(&mut writer, entry).map_err(|e| GridforgeError::io(&cache_path, e))?;
        }
        writer.flush().map_err(|e| GridforgeError::io(&cache_path, e))?;

        let outcomes: Vec<_> = stale.par_iter().map(|path| analyse_path(path)).collect();

        let unchanged_count = unchanged.len();
        let mut analysed = unchanged;
        let mut failures = Vec::new();
        for (_, outcome) in outcomes {
            match outcome {
                crate::model::AnalysisOutcome::Analysed(entry) => {
                    write_row(&mut writer, &entry).map_err(|e| GridforgeError::io(&cache_path, e))?;
                    writer.flush().map_err(|e| GridforgeError::io(&cache_path, e))?;
                    analysed.push(entry);
                }
                crate::model::AnalysisOutcome::Empty(_) => {}
                crate::model::AnalysisOutcome::Failed { path, cause } => {
                    failures.push((path.into_path_buf(), cause));
                }
            }
        }

        if !failures.is_empty() {
            return Err(GridforgeError::Analysis {
                path: failures[0].0.clone(),
                cause: failures.iter().map(|(p, c)| format!("{}: {c}", p.display())).collect::<Vec<_>>().join("; "),
            });
        }

        metrics.record("analyse", "unchanged", unchanged_count.to_string());
        metrics.record("analyse", "reanalysed", stale.len().to_string());
        debug!(total = analysed.len(), reanalysed = stale.len(), "analysis cache refreshed");

        state.analysed_files = Some(analysed);
        Ok(())
    }
}

fn current_hash(path: &SourcePath) -> Result<FileHash, GridforgeError> {
    let content = crate::utils::read_source(path.as_path())?;
    Ok(FileHash::of_str(&content))
}

/// Loads an existing cache file into a lookup map. A missing file is not an error (treated as
/// empty); a present-but-malformed file is fatal.
pub fn load_cache_entries(path: &Path) -> Result<BTreeMap<SourcePath, AnalysedFile>, GridforgeError> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let file = fs::File::open(path).map_err(|e| GridforgeError::io(path, e))?;
    let reader = BufReader::new(file);
    let mut lines = reader.lines();
    let Some(header) = lines.next() else { return Ok(BTreeMap::new()) };
    let header = header.map_err(|e| GridforgeError::io(path, e))?;
    if header.trim_end() != HEADER {
        return Err(GridforgeError::cache(format!("unrecognised cache header {header:?}")));
    }

    let mut entries = BTreeMap::new();
    for (lineno, line) in lines.enumerate() {
        let line = line.map_err(|e| GridforgeError::io(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        let entry = parse_row(&line)
            .ok_or_else(|| GridforgeError::cache(format!("malformed cache row {} at line {}", line, lineno + 2)))?;
        entries.insert(entry.fpath.clone(), entry);
    }
    Ok(entries)
}

fn write_row(writer: &mut impl Write, entry: &AnalysedFile) -> std::io::Result<()> {
    writeln!(
        writer,
        "{},{},{},{},{},{},{}",
        entry.fpath,
        entry.file_hash,
        join_symbols(&entry.module_defs),
        join_symbols(&entry.symbol_defs),
        join_symbols(&entry.symbol_deps),
        entry.file_deps.iter().map(|p| p.to_string()).collect::<Vec<_>>().join(";"),
        entry.mo_commented_file_deps.iter().cloned().collect::<Vec<_>>().join(";"),
    )
}

fn join_symbols(symbols: &BTreeSet<Symbol>) -> String {
    symbols.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(";")
}

fn parse_row(line: &str) -> Option<AnalysedFile> {
    let columns: Vec<&str> = line.splitn(7, ',').collect();
    if columns.len() != 7 {
        return None;
    }
    let fpath = SourcePath::new(columns[0]);
    let file_hash = FileHash(columns[1].parse().ok()?);
    let mut entry = AnalysedFile::new(fpath, file_hash);
    entry.module_defs = split_symbols(columns[2]);
    entry.symbol_defs = split_symbols(columns[3]);
    entry.symbol_deps = split_symbols(columns[4]);
    entry.file_deps = columns[5]
        .split(';')
        .filter(|s| !s.is_empty())
        .map(SourcePath::new)
        .collect();
    entry.mo_commented_file_deps =
        columns[6].split(';').filter(|s| !s.is_empty()).map(str::to_string).collect();
    Some(entry)
}

fn split_symbols(field: &str) -> BTreeSet<Symbol> {
    field.split(';').filter_map(Symbol::new).collect()
}
