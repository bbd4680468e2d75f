//! Names of the revision lines inside a shared store.

use std::fmt;

/// Prefix of every participant history branch.
pub const HISTORY_PREFIX: &str = "history/";

/// A revision line (branch) of the shared store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBranch<'a> {
    /// Snapshot timeline of one participant
    History(&'a str),
    /// The checkpoint timeline
    Checkpoints,
    /// Sync points, sync actions and conflicts
    State,
    /// Group configuration
    Config,
}

impl StoreBranch<'_> {
    pub fn name(&self) -> String {
        match self {
            Self::History(participant) => format!("{}{}", HISTORY_PREFIX, participant),
            Self::Checkpoints => "checkpoints".to_string(),
            Self::State => "state".to_string(),
            Self::Config => "config".to_string(),
        }
    }
}

impl fmt::Display for StoreBranch<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
