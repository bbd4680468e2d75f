//! Advisory locks guarding a shared store
//!
//! A store admits many concurrent readers or a single writer. Locks are
//! taken on a dedicated lock file and released when the guard is dropped.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::{Error, Result};

/// Kind of access a lock grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Many readers may hold a shared lock at the same time.
    Shared,
    /// A single writer, excluding all readers.
    Exclusive,
}

/// Guard for an acquired advisory lock.
#[derive(Debug)]
pub struct StoreLock {
    file: File,
    path: PathBuf,
    mode: LockMode,
}

impl StoreLock {
    /// Try to acquire a lock on `path` without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockFailed`] if the lock is held incompatibly by
    /// someone else.
    pub fn try_acquire(path: &Path, mode: LockMode) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| Error::io(path, e))?;

        let acquired = match mode {
            LockMode::Shared => FileExt::try_lock_shared(&file),
            LockMode::Exclusive => FileExt::try_lock_exclusive(&file),
        };
        acquired.map_err(|_| Error::LockFailed {
            path: path.to_path_buf(),
        })?;

        tracing::debug!(path = %path.display(), ?mode, "Acquired store lock");
        Ok(Self {
            file,
            path: path.to_path_buf(),
            mode,
        })
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to release store lock");
        }
    }
}
