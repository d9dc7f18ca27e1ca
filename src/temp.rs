//! Lazily created, scoped temporary directories.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::Result;

/// Prefix shared by every temporary directory the pipeline creates.
pub const TEMP_PREFIX: &str = ".nestpack-";

/// A temporary directory owned by a single pipeline call.
///
/// Nothing touches the filesystem until [`path`](Self::path) is first called.
/// The directory and everything below it are removed when the value is
/// dropped, on success and error paths alike.
pub(crate) struct ScopedTempDir {
    parent: PathBuf,
    depth: usize,
    dir: Option<TempDir>,
}

impl ScopedTempDir {
    /// Prepares a directory below `parent`. The recursion `depth` is part of
    /// the name; the remaining characters are random, so concurrent calls at
    /// the same depth never collide.
    pub(crate) fn new(parent: &Path, depth: usize) -> Self {
        Self {
            parent: parent.to_path_buf(),
            depth,
            dir: None,
        }
    }

    /// Returns the directory path, creating it on first use.
    pub(crate) fn path(&mut self) -> Result<&Path> {
        let dir = match self.dir.take() {
            Some(dir) => dir,
            None => {
                std::fs::create_dir_all(&self.parent)?;
                let dir = tempfile::Builder::new()
                    .prefix(&format!("{}d{}-", TEMP_PREFIX, self.depth))
                    .tempdir_in(&self.parent)?;
                log::debug!("Created temporary directory '{}'", dir.path().display());
                dir
            }
        };
        Ok(self.dir.insert(dir).path())
    }

    /// Returns true once the directory exists on disk.
    #[cfg(test)]
    pub(crate) fn is_created(&self) -> bool {
        self.dir.is_some()
    }
}

impl Drop for ScopedTempDir {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                log::warn!(
                    "Failed to remove temporary directory '{}': {}",
                    path.display(),
                    e
                );
            }
        }
    }
}
