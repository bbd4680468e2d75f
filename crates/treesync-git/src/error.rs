//! Error types for treesync-git

use std::path::PathBuf;

/// Result type for treesync-git operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in treesync-git operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("Could not clone shared store '{url}': {message}")]
    Clone { url: String, message: String },

    #[error("Workspace {path} is not empty")]
    WorkspaceNotEmpty { path: PathBuf },

    #[error("Transaction failed: shared store changed concurrently on {}", branches.join(", "))]
    TransactionFailed { branches: Vec<String> },

    #[error("Transaction is {actual}, expected {expected}")]
    InvalidState { expected: String, actual: String },

    #[error("Object {id} not found on {branch}")]
    ObjectNotFound { branch: String, id: String },

    #[error("Invalid object id '{id}'")]
    InvalidObjectId { id: String },

    #[error("Corrupt record at {path}: {source}")]
    CorruptRecord {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the caller may retry the whole operation from scratch.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransactionFailed { .. })
    }
}
