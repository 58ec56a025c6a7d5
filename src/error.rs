use std::path::PathBuf;

/// The one error type returned from every fallible public function in this crate.
#[derive(Debug, thiserror::Error)]
pub enum GridforgeError {
    #[error("{message}")]
    Config { message: String },

    #[error("io error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("preprocessing failed for {} file(s):\n{}", .failures.len(), format_failures(.failures))]
    Preprocess { failures: Vec<(PathBuf, String)> },

    #[error("failed to analyse {path:?}: {cause}")]
    Analysis { path: PathBuf, cause: String },

    #[error("dependency graph cannot be scheduled, {} file(s) blocked:\n{}", .blockers.len(), format_blockers(.blockers))]
    UnresolvableGraph { blockers: Vec<(PathBuf, Vec<String>)> },

    #[error("build tree references {} file(s) outside the source tree:\n{}", .missing.len(), format_paths(.missing))]
    MissingBuildDeps { missing: Vec<PathBuf> },

    #[error("compilation failed for {} file(s):\n{}", .failures.len(), format_failures(.failures))]
    Compile { failures: Vec<(PathBuf, String)> },

    #[error("analysis cache error: {message}")]
    Cache { message: String },

    #[error("link step failed: {message}")]
    Link { message: String },

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

impl GridforgeError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        GridforgeError::Io { path: path.into(), source }
    }

    pub(crate) fn config(msg: impl std::fmt::Display) -> Self {
        GridforgeError::Config { message: msg.to_string() }
    }

    pub(crate) fn cache(msg: impl std::fmt::Display) -> Self {
        GridforgeError::Cache { message: msg.to_string() }
    }
}

fn format_failures(failures: &[(PathBuf, String)]) -> String {
    failures.iter().map(|(p, m)| format!("  {}: {m}", p.display())).collect::<Vec<_>>().join("\n")
}

fn format_blockers(blockers: &[(PathBuf, Vec<String>)]) -> String {
    blockers
        .iter()
        .map(|(p, deps)| format!("  {}: waiting on {}", p.display(), deps.join(", ")))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_paths(paths: &[PathBuf]) -> String {
    paths.iter().map(|p| format!("  {}", p.display())).collect::<Vec<_>>().join("\n")
}

pub type Result<T, E = GridforgeError> = std::result::Result<T, E>;
