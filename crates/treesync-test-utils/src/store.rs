//! [`TestStore`]: a temporary shared store.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// A temporary directory holding an empty shared store (bare repository)
/// plus room for transaction workspaces.
///
/// # Example
///
/// ```rust,no_run
/// use treesync_test_utils::TestStore;
///
/// let store = TestStore::new();
/// let workspace = store.workspace("writer");
/// assert!(!workspace.exists());
/// ```
pub struct TestStore {
    temp_dir: TempDir,
}

impl Default for TestStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TestStore {
    /// Create an empty shared store.
    ///
    /// # Panics
    /// Panics if the repository cannot be initialised.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap_or_else(|e| panic!("TestStore::new: {e}"));
        git2::Repository::init_bare(temp_dir.path().join("shared"))
            .unwrap_or_else(|e| panic!("TestStore::new: failed to init shared store: {e}"));
        Self { temp_dir }
    }

    /// Root of the temporary directory.
    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Path of the shared store.
    pub fn address(&self) -> PathBuf {
        self.root().join("shared")
    }

    /// The shared store's address as a remote URL.
    pub fn url(&self) -> String {
        self.address().to_string_lossy().into_owned()
    }

    /// A fresh, not yet existing workspace directory named `name`.
    pub fn workspace(&self, name: &str) -> PathBuf {
        self.root().join("workspaces").join(name)
    }

    /// Open the shared store directly, bypassing transactions.
    ///
    /// # Panics
    /// Panics if the store cannot be opened.
    pub fn open(&self) -> git2::Repository {
        git2::Repository::open_bare(self.address())
            .unwrap_or_else(|e| panic!("TestStore::open: {e}"))
    }

    /// Tip of `branch` in the shared store, if the branch exists.
    pub fn branch_tip(&self, branch: &str) -> Option<git2::Oid> {
        self.open()
            .find_reference(&format!("refs/heads/{}", branch))
            .ok()
            .and_then(|r| r.target())
    }
}
