use std::{collections::BTreeSet, path::Path};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::{AnalysedFile, AnalysisOutcome, FileHash, SourcePath, Symbol};

/// Fortran intrinsic modules that should never be treated as inter-file dependencies.
const INTRINSIC_MODULES: &[&str] = &["iso_c_binding", "iso_fortran_env", "ieee_arithmetic", "ieee_exceptions"];

/// A conservative allowlist of intrinsic procedures that would otherwise show up as unresolved
/// `symbol_deps`.
const INTRINSIC_PROCEDURES: &[&str] = &[
    "allocate", "deallocate", "present", "associated", "size", "trim", "adjustl", "adjustr", "min", "max",
    "abs", "sqrt", "mod", "modulo", "real", "int", "nint", "merge", "reshape", "allocated",
];

static MODULE_DEF: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^\s*module\s+(\w+)\s*$").unwrap());
static PROGRAM_DEF: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^\s*program\s+(\w+)").unwrap());
static SUBROUTINE_DEF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(?:recursive\s+)?subroutine\s+(\w+)").unwrap());
static FUNCTION_DEF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:recursive\s+|pure\s+|elemental\s+)*(?:\w+\s+)*function\s+(\w+)").unwrap()
});
static USE_STMT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^\s*use\s+(?:,\s*\w+\s*::\s*)?(\w+)").unwrap());
static CALL_STMT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bcall\s+(\w+)").unwrap());
static DEPENDS_ON: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)!\s*depends\s+on\s*:\s*([\w.]+)\.o").unwrap());

pub fn looks_like_fortran(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()).map(|e| e.to_lowercase()),
        Some(ref ext) if ext == "f90" || ext == "f" || ext == "f77"
    )
}

/// Lexical, line-oriented extraction (no full AST) mirroring the resolver's regex-based import
/// capture: scans line by line for definition/use/call keywords and `DEPENDS ON:` comments.
pub fn analyse(path: SourcePath, hash: FileHash, content: &str) -> AnalysisOutcome {
    let mut file = AnalysedFile::new(path.clone(), hash);

    for line in content.lines() {
        if let Some(caps) = MODULE_DEF.captures(line) {
            if let Some(symbol) = Symbol::new(&caps[1]) {
                file.add_module_def(symbol);
            }
            continue;
        }
        if let Some(caps) = PROGRAM_DEF.captures(line) {
            if let Some(symbol) = Symbol::new(&caps[1]) {
                file.symbol_defs.insert(symbol);
            }
            continue;
        }
        if let Some(caps) = SUBROUTINE_DEF.captures(line) {
            if let Some(symbol) = Symbol::new(&caps[1]) {
                file.symbol_defs.insert(symbol);
            }
        }
        if let Some(caps) = FUNCTION_DEF.captures(line) {
            if let Some(symbol) = Symbol::new(&caps[1]) {
                file.symbol_defs.insert(symbol);
            }
        }
        if let Some(caps) = USE_STMT.captures(line) {
            if let Some(symbol) = Symbol::new(&caps[1]) {
                if !is_intrinsic_module(symbol.as_str()) {
                    file.symbol_deps.insert(symbol);
                }
            }
        }
        for caps in CALL_STMT.captures_iter(line) {
            if let Some(symbol) = Symbol::new(&caps[1]) {
                if !is_intrinsic_procedure(symbol.as_str()) {
                    file.symbol_deps.insert(symbol);
                }
            }
        }
        if let Some(caps) = DEPENDS_ON.captures(line) {
            file.mo_commented_file_deps.insert(caps[1].to_string());
        }
    }

    // A symbol a file defines is never also a dependency of that same file.
    let defs = file.symbol_defs.clone();
    file.symbol_deps = file.symbol_deps.difference(&defs).cloned().collect::<BTreeSet<_>>();

    AnalysisOutcome::Analysed(file)
}

fn is_intrinsic_module(name: &str) -> bool {
    INTRINSIC_MODULES.contains(&name)
}

fn is_intrinsic_procedure(name: &str) -> bool {
    INTRINSIC_PROCEDURES.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_module_and_subroutine_defs() {
        let content = "module m\ncontains\n  subroutine m_sub\n  end subroutine\nend module\n";
        let outcome = analyse(SourcePath::new("m.f90"), FileHash(0), content);
        let AnalysisOutcome::Analysed(file) = outcome else { panic!("expected analysed") };
        assert!(file.module_defs.contains(&Symbol::new("m").unwrap()));
        assert!(file.symbol_defs.contains(&Symbol::new("m_sub").unwrap()));
    }

    #[test]
    fn extracts_use_and_call_as_deps() {
        let content = "program p\n  use m\n  call m_sub\nend program\n";
        let outcome = analyse(SourcePath::new("main.f90"), FileHash(0), content);
        let AnalysisOutcome::Analysed(file) = outcome else { panic!("expected analysed") };
        assert!(file.symbol_deps.contains(&Symbol::new("m").unwrap()));
        assert!(file.symbol_deps.contains(&Symbol::new("m_sub").unwrap()));
    }

    #[test]
    fn intrinsic_modules_and_procedures_are_filtered() {
        let content = "subroutine s\n  use iso_c_binding\n  x = sqrt(y)\nend subroutine\n";
        let outcome = analyse(SourcePath::new("s.f90"), FileHash(0), content);
        let AnalysisOutcome::Analysed(file) = outcome else { panic!("expected analysed") };
        assert!(!file.symbol_deps.contains(&Symbol::new("iso_c_binding").unwrap()));
        assert!(!file.symbol_deps.contains(&Symbol::new("sqrt").unwrap()));
    }

    #[test]
    fn captures_depends_on_comment() {
        let content = "subroutine s\n  ! DEPENDS ON: helper.o\nend subroutine\n";
        let outcome = analyse(SourcePath::new("s.f90"), FileHash(0), content);
        let AnalysisOutcome::Analysed(file) = outcome else { panic!("expected analysed") };
        assert!(file.mo_commented_file_deps.contains("helper"));
    }
}
