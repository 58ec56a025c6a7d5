use std::{
    collections::BTreeSet,
    fmt,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::GridforgeError;

/// Absolute path to a file on disk. After preprocessing it always lies under the build output
/// root, mirroring its position under the source root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourcePath(PathBuf);

impl SourcePath {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    pub fn into_path_buf(self) -> PathBuf {
        self.0
    }
}

impl From<PathBuf> for SourcePath {
    fn from(value: PathBuf) -> Self {
        Self(value)
    }
}

impl AsRef<Path> for SourcePath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for SourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// 32-bit content checksum of a source file, used as the analysis cache's validity key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FileHash(pub i64);

impl FileHash {
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self(crc32fast::hash(bytes) as i64)
    }

    pub fn of_str(content: &str) -> Self {
        Self::of_bytes(content.as_bytes())
    }
}

impl fmt::Display for FileHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A lower-cased, non-empty identifier defined or referenced by a source file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Symbol(String);

impl Symbol {
    /// Returns `None` for an empty or whitespace-only name, enforcing the invariant once here
    /// rather than at every analyser call site.
    pub fn new(name: impl AsRef<str>) -> Option<Self> {
        let trimmed = name.as_ref().trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self(trimmed.to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result of analysing a single Fortran or C source file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AnalysedFile {
    pub fpath: SourcePath,
    pub file_hash: FileHash,
    pub module_defs: BTreeSet<Symbol>,
    pub symbol_defs: BTreeSet<Symbol>,
    pub symbol_deps: BTreeSet<Symbol>,
    pub file_deps: BTreeSet<SourcePath>,
    pub mo_commented_file_deps: BTreeSet<String>,
}

impl AnalysedFile {
    pub fn new(fpath: SourcePath, file_hash: FileHash) -> Self {
        Self {
            fpath,
            file_hash,
            module_defs: BTreeSet::new(),
            symbol_defs: BTreeSet::new(),
            symbol_deps: BTreeSet::new(),
            file_deps: BTreeSet::new(),
            mo_commented_file_deps: BTreeSet::new(),
        }
    }

    /// `module_defs` must always be a subset of `symbol_defs`.
    pub fn add_module_def(&mut self, symbol: Symbol) {
        self.symbol_defs.insert(symbol.clone());
        self.module_defs.insert(symbol);
    }

    pub fn is_well_formed(&self) -> bool {
        self.module_defs.is_subset(&self.symbol_defs)
    }
}

/// A source file that parsed to nothing but comments or whitespace; not an analysis failure, and
/// never considered for compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmptySourceFile {
    pub fpath: SourcePath,
}

/// Outcome of analysing one file: either a real record, an empty file, or a failure. Kept
/// separate from `Result<AnalysedFile, GridforgeError>` because `EmptySourceFile` is a distinct
/// success case, not a fallback.
#[derive(Debug, Clone)]
pub enum AnalysisOutcome {
    Analysed(AnalysedFile),
    Empty(EmptySourceFile),
    Failed { path: SourcePath, cause: String },
}

impl AnalysisOutcome {
    pub fn into_result(self) -> Result<Option<AnalysedFile>, GridforgeError> {
        match self {
            AnalysisOutcome::Analysed(file) => Ok(Some(file)),
            AnalysisOutcome::Empty(_) => Ok(None),
            AnalysisOutcome::Failed { path, cause } => {
                Err(GridforgeError::Analysis { path: path.into_path_buf(), cause })
            }
        }
    }
}

/// An `AnalysedFile` paired with the object file produced by compiling it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileUnit {
    pub source: AnalysedFile,
    pub object_path: SourcePath,
}

/// The transitively-closed subset of analysed files required to build a root symbol.
pub type BuildTree = std::collections::BTreeMap<SourcePath, AnalysedFile>;
