//! Small filesystem and templating helpers shared across steps, in the spirit of the teacher's
//! own grab-bag `utils` module.

use std::{
    fs,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use path_slash::PathExt as _;

use crate::error::GridforgeError;

/// Reads a file's full contents as UTF-8, normalizing `\r\n` to `\n` the way the teacher's
/// `Source::read` does so hashes and line-oriented regexes are platform-independent.
pub fn read_source(path: &Path) -> Result<String, GridforgeError> {
    let content = fs::read_to_string(path).map_err(|e| GridforgeError::io(path, e))?;
    Ok(if content.contains("\r\n") { content.replace("\r\n", "\n") } else { content })
}

pub fn write_file(path: &Path, content: &str) -> Result<(), GridforgeError> {
    create_parent_dir_all(path)?;
    let file = fs::File::create(path).map_err(|e| GridforgeError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    writer.write_all(content.as_bytes()).map_err(|e| GridforgeError::io(path, e))?;
    Ok(())
}

pub fn create_parent_dir_all(path: &Path) -> Result<(), GridforgeError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| GridforgeError::io(parent, e))?;
    }
    Ok(())
}

pub fn canonicalize(path: &Path) -> Result<PathBuf, GridforgeError> {
    dunce::canonicalize(path).map_err(|e| GridforgeError::io(path, e))
}

/// Renders a path with `/` separators regardless of platform, used for the walker's substring
/// matching against filter fragments.
pub fn slashed(path: &Path) -> String {
    path.to_slash_lossy().into_owned()
}

/// Relocates `input`, which must lie under `source_root`, to the same relative position under
/// `output_root`.
pub fn relocate(input: &Path, source_root: &Path, output_root: &Path) -> Result<PathBuf, GridforgeError> {
    let relative = input.strip_prefix(source_root).map_err(|_| {
        GridforgeError::config(format!(
            "{} does not lie under source root {}",
            input.display(),
            source_root.display()
        ))
    })?;
    Ok(output_root.join(relative))
}

/// Substitutes `$source`, `$output`, and (if `relative` is given) `$relative` placeholders in a
/// flag template string.
pub fn template_flag(flag: &str, source_root: &Path, output_root: &Path, relative: Option<&Path>) -> String {
    let mut out = flag
        .replace("$source", &source_root.display().to_string())
        .replace("$output", &output_root.display().to_string());
    if let Some(rel) = relative {
        out = out.replace("$relative", &rel.display().to_string());
    }
    out
}
