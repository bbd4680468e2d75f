//! File version references and their equality

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use treesync_fs::{FileEntry, FilePath};

/// Identity of one version of a file, without its content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileReference {
    pub path: FilePath,
    pub modified_at: Option<DateTime<Utc>>,
    pub size: Option<u64>,
}

impl FileReference {
    pub fn new(path: FilePath, modified_at: Option<DateTime<Utc>>, size: Option<u64>) -> Self {
        Self {
            path,
            modified_at,
            size,
        }
    }

    pub fn from_entry(path: FilePath, entry: &FileEntry) -> Self {
        Self::new(path, entry.modified_at, entry.size)
    }
}

impl fmt::Display for FileReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)?;
        if let Some(modified_at) = self.modified_at {
            write!(f, " @ {}", modified_at.to_rfc3339())?;
        }
        if let Some(size) = self.size {
            write!(f, " ({} bytes)", size)?;
        }
        Ok(())
    }
}

/// Decides when two file references denote the same version.
///
/// The comparer defines node identity in change graphs and decides which
/// differences between snapshots count as changes.
pub trait FileReferenceComparer: Send + Sync {
    fn equals(&self, a: &FileReference, b: &FileReference) -> bool;
}

/// Path, modification time and size must all match.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultComparer;

impl FileReferenceComparer for DefaultComparer {
    fn equals(&self, a: &FileReference, b: &FileReference) -> bool {
        a == b
    }
}

/// Compare two possibly absent versions; two absences are equal.
pub fn versions_equal(
    comparer: &dyn FileReferenceComparer,
    a: Option<&FileReference>,
    b: Option<&FileReference>,
) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => comparer.equals(a, b),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn reference(path: &str, secs: i64, size: u64) -> FileReference {
        FileReference::new(
            FilePath::new(path).unwrap(),
            Utc.timestamp_opt(secs, 0).single(),
            Some(size),
        )
    }

    #[test]
    fn default_comparer_requires_all_fields() {
        let comparer = DefaultComparer;
        let base = reference("/a", 10, 1);

        assert!(comparer.equals(&base, &reference("/a", 10, 1)));
        assert!(!comparer.equals(&base, &reference("/b", 10, 1)));
        assert!(!comparer.equals(&base, &reference("/a", 11, 1)));
        assert!(!comparer.equals(&base, &reference("/a", 10, 2)));
    }

    #[test]
    fn absent_versions_compare_equal_only_to_absence() {
        let a = reference("/a", 1, 1);
        assert!(versions_equal(&DefaultComparer, None, None));
        assert!(!versions_equal(&DefaultComparer, Some(&a), None));
        assert!(versions_equal(&DefaultComparer, Some(&a), Some(&a)));
    }
}
