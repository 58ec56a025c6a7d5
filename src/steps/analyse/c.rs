use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::{AnalysedFile, AnalysisOutcome, FileHash, SourcePath, Symbol};

static SYS_START: &str = "#pragma GridforgeSysIncludeStart";
static SYS_END: &str = "#pragma GridforgeSysIncludeEnd";

static FUNCTION_DEF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:static\s+)?(?:\w[\w\s\*]*?)\s+(\w+)\s*\([^;{]*\)\s*\{").unwrap());
static EXTERN_DECL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*extern\s+[\w\s\*]+?\b(\w+)\s*\(").unwrap());
static CALL_EXPR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\w+)\s*\(").unwrap());

const C_KEYWORDS: &[&str] = &[
    "if", "for", "while", "switch", "return", "sizeof", "do", "else", "goto", "case", "default",
];

/// Regex-level extraction over pragma-delimited C source, the way the distilled spec describes
/// C analysis: system-header regions marked by C2 are skipped entirely so library symbols never
/// pollute `symbol_defs`/`symbol_deps`.
pub fn analyse(path: SourcePath, hash: FileHash, content: &str) -> AnalysisOutcome {
    let mut file = AnalysedFile::new(path.clone(), hash);
    let mut in_system_region = false;

    for line in content.lines() {
        if line.trim() == SYS_START {
            in_system_region = true;
            continue;
        }
        if line.trim() == SYS_END {
            in_system_region = false;
            continue;
        }
        if in_system_region {
            continue;
        }

        if let Some(caps) = FUNCTION_DEF.captures(line) {
            if let Some(symbol) = Symbol::new(&caps[1]) {
                file.symbol_defs.insert(symbol);
            }
            continue;
        }
        if let Some(caps) = EXTERN_DECL.captures(line) {
            if let Some(symbol) = Symbol::new(&caps[1]) {
                file.symbol_deps.insert(symbol);
            }
            continue;
        }
        for caps in CALL_EXPR.captures_iter(line) {
            let name = &caps[1];
            if C_KEYWORDS.contains(&name) {
                continue;
            }
            if let Some(symbol) = Symbol::new(name) {
                file.symbol_deps.insert(symbol);
            }
        }
    }

    let defs = file.symbol_defs.clone();
    file.symbol_deps = file.symbol_deps.difference(&defs).cloned().collect();

    AnalysisOutcome::Analysed(file)
}
