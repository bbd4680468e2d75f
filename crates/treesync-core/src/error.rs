//! Error types for treesync-core

/// Result type for treesync-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in treesync-core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Unknown snapshot, history, checkpoint or sync point
    #[error("Not found: {0}")]
    NotFound(String),

    /// `from` is not an earlier point than `to` on the checkpoint timeline
    #[error("Invalid range: {from} is not an ancestor of {to}")]
    InvalidRange { from: String, to: String },

    /// A change whose endpoints contradict its kind
    #[error("Invalid change: {reason}")]
    InvalidChange { reason: String },

    /// Group is not configured
    #[error("Group '{name}' not found")]
    GroupNotFound { name: String },

    /// Group is already configured
    #[error("Group '{name}' already exists")]
    GroupExists { name: String },

    /// Participant is already configured in the group
    #[error("Participant '{name}' already exists")]
    ParticipantExists { name: String },

    /// Participant is not configured in the group
    #[error("Participant '{name}' not found")]
    ParticipantNotFound { name: String },

    /// Illegal state transition of a sync action
    #[error("Invalid transition for sync action {id}: {reason}")]
    InvalidAction { id: String, reason: String },

    /// Operation requires exclusive access to the group
    #[error("Group '{name}' is open read-only")]
    ReadOnly { name: String },

    // Transparent wrappers for underlying crate errors
    /// Filesystem error from treesync-fs (includes path validation errors)
    #[error(transparent)]
    Fs(#[from] treesync_fs::Error),

    /// Storage or transaction error from treesync-git
    #[error(transparent)]
    Git(#[from] treesync_git::Error),

    /// Raw libgit2 error
    #[error(transparent)]
    Libgit(#[from] git2::Error),

    /// JSON serialization/deserialization error
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Standard I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the whole operation may be retried from a freshly fetched state.
    ///
    /// Only a lost optimistic commit race qualifies.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Git(e) if e.is_retryable())
    }

    /// Whether this error rejected malformed input at the boundary.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::Fs(treesync_fs::Error::InvalidPath { .. } | treesync_fs::Error::InvalidName { .. })
        )
    }
}
