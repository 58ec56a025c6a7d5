//! Utilities for mocking build workspaces in tests (teacher's `project_util::TempProject`
//! pattern, generalized from a `solc` project root to a `$workspace/$label/source` tree).

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::{config::BuildConfigBuilder, error::GridforgeError};

/// A throwaway source tree backed by a [`TempDir`]; dropped, the directory and everything
/// written under it are removed.
pub struct TestWorkspace {
    root: TempDir,
    source_root: PathBuf,
}

impl TestWorkspace {
    /// Creates an empty temporary workspace with a `source/` directory ready to receive files.
    pub fn new() -> Result<Self, GridforgeError> {
        let root = tempfile::tempdir().map_err(|e| GridforgeError::io(".", e))?;
        let source_root = root.path().join("source");
        std::fs::create_dir_all(&source_root).map_err(|e| GridforgeError::io(&source_root, e))?;
        Ok(Self { root, source_root })
    }

    /// Writes `content` to `relative` under the source root, creating parent directories.
    pub fn write_source(&self, relative: impl AsRef<Path>, content: &str) -> Result<(), GridforgeError> {
        let path = self.source_root.join(relative);
        crate::utils::write_file(&path, content)
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    pub fn workspace_root(&self) -> &Path {
        self.root.path()
    }

    /// Returns a [`BuildConfigBuilder`] pre-populated with this workspace's roots; callers still
    /// need to set `label` and `root_symbol` before calling `build()`.
    pub fn config_builder(&self) -> BuildConfigBuilder {
        crate::config::BuildConfig::builder()
            .workspace(self.root.path())
            .source_root(&self.source_root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_files_under_the_source_root() {
        let workspace = TestWorkspace::new().unwrap();
        workspace.write_source("a/b.f90", "module m\nend module\n").unwrap();
        assert!(workspace.source_root().join("a/b.f90").exists());
    }
}
