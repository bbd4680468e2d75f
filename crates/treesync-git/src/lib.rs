//! Git-backed storage for treesync
//!
//! A shared store is a bare git repository. Each revision line (participant
//! history, checkpoint timeline, sync state, configuration) is a branch.
//! [`objects`] reads and writes record trees on those branches and
//! [`transaction`] provides the optimistic commit protocol.

pub mod error;
pub mod objects;
pub mod transaction;

pub use error::{Error, Result};
pub use transaction::{CommitOutcome, Transaction, TransactionState};

/// Create an empty shared store (bare repository) at `path`.
pub fn init_shared_store(path: &std::path::Path) -> Result<git2::Repository> {
    let repo = git2::Repository::init_bare(path)?;
    tracing::info!(path = %path.display(), "Initialized shared store");
    Ok(repo)
}
