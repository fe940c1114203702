//! Agent data directories for tests.

// Test utilities are expected to panic on failure.
#![allow(clippy::expect_used)]

use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// A throwaway agent data directory, removed when dropped.
///
/// Mirrors the layout the resolver uses under its data directory: inline
/// genesis files in [`genesis_dir`](Self::genesis_dir) and file-backed cache
/// records under [`records`](Self::records).
///
/// # Example
///
/// ```
/// use vdr_test_utils::TestDir;
///
/// let dir = TestDir::new();
/// assert_eq!(dir.records(), dir.path().join("records"));
/// assert_eq!(dir.genesis_dir(), dir.path().join("genesis"));
/// ```
#[derive(Debug)]
pub struct TestDir {
    inner: TempDir,
}

impl TestDir {
    /// Creates a new temporary data directory.
    ///
    /// # Panics
    ///
    /// Panics if the directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        let inner = TempDir::new().expect("failed to create temp directory");
        Self { inner }
    }

    /// Returns the data directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.inner.path()
    }

    /// Joins `path` onto the data directory.
    #[must_use]
    pub fn join<P: AsRef<Path>>(&self, path: P) -> PathBuf {
        self.inner.path().join(path)
    }

    /// Root for file-backed cache records.
    #[must_use]
    pub fn records(&self) -> PathBuf {
        self.join("records")
    }

    /// Where inline genesis transactions are written, matching
    /// `ResolverConfig::genesis_dir` for a config rooted here.
    #[must_use]
    pub fn genesis_dir(&self) -> PathBuf {
        self.join("genesis")
    }

    /// Writes `contents` to `path` under the data directory, creating parent
    /// directories. Used to plant files a previous run left behind.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be written.
    pub fn plant<P: AsRef<Path>>(&self, path: P, contents: &str) -> PathBuf {
        let path = self.join(path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("failed to create parent directory");
        }
        std::fs::write(&path, contents).expect("failed to write file");
        path
    }
}

impl Default for TestDir {
    fn default() -> Self {
        Self::new()
    }
}
