pub mod c;
pub mod fortran;

use crate::model::{AnalysisOutcome, FileHash, SourcePath};
use crate::utils::read_source;

/// Reads `path`, hashes its content, and dispatches to the Fortran or C analyser by extension.
/// Pure besides the read: no other I/O, no cache awareness. Used by the analysis cache step
/// (C5), which is the one that decides whether a file needs analysing at all.
pub fn analyse_path(path: &SourcePath) -> (FileHash, AnalysisOutcome) {
    let content = match read_source(path.as_path()) {
        Ok(content) => content,
        Err(e) => {
            return (FileHash(0), AnalysisOutcome::Failed { path: path.clone(), cause: e.to_string() })
        }
    };
    let hash = FileHash::of_str(&content);

    if is_comment_only(&content) {
        return (hash, AnalysisOutcome::Empty(crate::model::EmptySourceFile { fpath: path.clone() }));
    }

    let outcome = if fortran::looks_like_fortran(path.as_path()) {
        fortran::analyse(path.clone(), hash, &content)
    } else {
        c::analyse(path.clone(), hash, &content)
    };
    (hash, outcome)
}

fn is_comment_only(content: &str) -> bool {
    content.lines().all(|line| {
        let trimmed = line.trim();
        trimmed.is_empty() || trimmed.starts_with('!') || trimmed.starts_with("//")
    })
}
