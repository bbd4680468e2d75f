//! Validated, rooted file paths inside a synchronized tree

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Separator between path segments. Always a forward slash, on every platform.
pub const SEPARATOR: char = '/';

/// A file path relative to the root of a synchronized tree.
///
/// Paths are rooted (`/dir/file.txt`), use `/` as the only separator and
/// never end with a separator. Validation happens once, on construction,
/// so every `FilePath` in the system is well-formed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FilePath {
    inner: String,
}

impl FilePath {
    /// Parse and validate a path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPath`] if the path is empty, not rooted,
    /// contains a backslash, ends with a separator, or contains an empty,
    /// `.`, `..` or `.git` segment.
    pub fn new(path: impl AsRef<str>) -> Result<Self> {
        let path = path.as_ref();

        if path.is_empty() {
            return Err(Error::invalid_path(path, "path must not be empty"));
        }
        if path.contains('\\') {
            return Err(Error::invalid_path(path, "backslashes are not allowed"));
        }
        if !path.starts_with(SEPARATOR) {
            return Err(Error::invalid_path(path, "path must be rooted"));
        }
        if path.len() == 1 {
            return Err(Error::invalid_path(path, "the root is not a file path"));
        }
        if path.ends_with(SEPARATOR) {
            return Err(Error::invalid_path(path, "trailing separator"));
        }
        for segment in path[1..].split(SEPARATOR) {
            validate_segment(segment).map_err(|reason| Error::invalid_path(path, reason))?;
        }

        Ok(Self {
            inner: path.to_string(),
        })
    }

    /// Build a path from its segments.
    pub fn from_segments<I, S>(segments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut path = String::new();
        for segment in segments {
            path.push(SEPARATOR);
            path.push_str(segment.as_ref());
        }
        Self::new(path)
    }

    /// The path as a string, e.g. `/dir/file.txt`.
    pub fn as_str(&self) -> &str {
        &self.inner
    }

    /// Segments of the path without the leading separator.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.inner[1..].split(SEPARATOR)
    }

    /// The final segment.
    pub fn name(&self) -> &str {
        self.inner.rsplit(SEPARATOR).next().unwrap_or_default()
    }

    /// The parent path, or `None` when the parent is the root.
    pub fn parent(&self) -> Option<Self> {
        match self.inner.rfind(SEPARATOR) {
            Some(0) | None => None,
            Some(idx) => Some(Self {
                inner: self.inner[..idx].to_string(),
            }),
        }
    }

    /// Append a segment.
    pub fn join(&self, segment: &str) -> Result<Self> {
        Self::new(format!("{}{}{}", self.inner, SEPARATOR, segment))
    }

    /// The path without its leading separator, as stored in git trees.
    pub fn relative(&self) -> &str {
        &self.inner[1..]
    }
}

fn validate_segment(segment: &str) -> std::result::Result<(), &'static str> {
    match segment {
        "" => Err("empty path segment"),
        "." | ".." => Err("relative segments are not allowed"),
        s if is_reserved(s) => Err("'.git' is reserved by the storage backend"),
        _ => Ok(()),
    }
}

/// Whether `segment` names a git metadata directory, which cannot be stored
/// in a git tree.
pub(crate) fn is_reserved(segment: &str) -> bool {
    segment.eq_ignore_ascii_case(".git")
}

impl fmt::Display for FilePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl AsRef<str> for FilePath {
    fn as_ref(&self) -> &str {
        &self.inner
    }
}

impl FromStr for FilePath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for FilePath {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<FilePath> for String {
    fn from(path: FilePath) -> Self {
        path.inner
    }
}

/// Validate a name used as a participant, group or tree entry identifier.
///
/// Names must be non-empty, contain only ASCII alphanumerics, `-`, `_` or `.`,
/// and must not start with `.`.
pub fn validate_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| Error::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("name must not be empty"));
    }
    if name.starts_with('.') {
        return Err(invalid("name must not start with '.'"));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(invalid(&format!("character '{}' is not allowed", c)));
    }
    if name.contains("..") || name.ends_with(".lock") {
        return Err(invalid("name is reserved by the storage backend"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("/file.txt")]
    #[case("/dir/file.txt")]
    #[case("/a/b/c/d")]
    #[case("/with space/file name")]
    #[case("/.gitignore")]
    fn valid_paths_are_accepted(#[case] input: &str) {
        let path = FilePath::new(input).unwrap();
        assert_eq!(path.as_str(), input);
    }

    #[rstest]
    #[case("")]
    #[case("/")]
    #[case("file.txt")]
    #[case("/dir/")]
    #[case("/dir\\file")]
    #[case("/dir//file")]
    #[case("/dir/../file")]
    #[case("/./file")]
    #[case("/project/.git/HEAD")]
    #[case("/project/.GIT")]
    fn malformed_paths_are_rejected(#[case] input: &str) {
        let err = FilePath::new(input).unwrap_err();
        assert!(matches!(err, Error::InvalidPath { .. }), "got {err:?}");
    }

    #[test]
    fn parent_and_name() {
        let path = FilePath::new("/dir/sub/file").unwrap();
        assert_eq!(path.name(), "file");
        assert_eq!(path.parent().unwrap().as_str(), "/dir/sub");
        assert_eq!(FilePath::new("/file").unwrap().parent(), None);
    }

    #[test]
    fn serde_rejects_invalid_paths() {
        let ok: FilePath = serde_json::from_str("\"/a/b\"").unwrap();
        assert_eq!(ok.relative(), "a/b");
        assert!(serde_json::from_str::<FilePath>("\"a/b\"").is_err());
    }

    #[rstest]
    #[case("laptop", true)]
    #[case("nas-01.home", true)]
    #[case("", false)]
    #[case(".hidden", false)]
    #[case("a/b", false)]
    #[case("x.lock", false)]
    fn names_are_validated(#[case] name: &str, #[case] ok: bool) {
        assert_eq!(validate_name(name).is_ok(), ok);
    }
}
