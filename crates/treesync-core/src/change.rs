//! Changes between two versions of a file

use std::fmt;

use serde::{Deserialize, Serialize};
use treesync_fs::FilePath;

use crate::reference::FileReference;
use crate::{Error, Result};

/// How something changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
        };
        write!(f, "{}", name)
    }
}

/// One file transitioning from one version to another.
///
/// `Added` has no `from`, `Deleted` has no `to`, `Modified` has both on the
/// same path. The fields are private so these invariants always hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    path: FilePath,
    kind: ChangeKind,
    from: Option<FileReference>,
    to: Option<FileReference>,
}

impl Change {
    /// Derive a change from its endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidChange`] when both endpoints are absent or
    /// they refer to different paths.
    pub fn new(from: Option<FileReference>, to: Option<FileReference>) -> Result<Self> {
        let (path, kind) = match (&from, &to) {
            (None, Some(to)) => (to.path.clone(), ChangeKind::Added),
            (Some(from), None) => (from.path.clone(), ChangeKind::Deleted),
            (Some(from), Some(to)) if from.path == to.path => (to.path.clone(), ChangeKind::Modified),
            (Some(from), Some(to)) => {
                return Err(Error::InvalidChange {
                    reason: format!("endpoints differ in path: {} vs {}", from.path, to.path),
                });
            }
            (None, None) => {
                return Err(Error::InvalidChange {
                    reason: "a change needs at least one endpoint".to_string(),
                });
            }
        };
        Ok(Self {
            path,
            kind,
            from,
            to,
        })
    }

    pub fn added(to: FileReference) -> Self {
        Self {
            path: to.path.clone(),
            kind: ChangeKind::Added,
            from: None,
            to: Some(to),
        }
    }

    pub fn deleted(from: FileReference) -> Self {
        Self {
            path: from.path.clone(),
            kind: ChangeKind::Deleted,
            from: Some(from),
            to: None,
        }
    }

    pub fn path(&self) -> &FilePath {
        &self.path
    }

    pub fn kind(&self) -> ChangeKind {
        self.kind
    }

    pub fn from(&self) -> Option<&FileReference> {
        self.from.as_ref()
    }

    pub fn to(&self) -> Option<&FileReference> {
        self.to.as_ref()
    }
}
