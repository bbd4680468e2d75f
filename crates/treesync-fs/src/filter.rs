//! Path filters
//!
//! A filter expression is a `;`-separated list of glob patterns. A path is
//! included when it matches at least one include pattern and no exclude
//! pattern (`!`-prefixed). An empty expression includes every path.

use glob::{MatchOptions, Pattern};

use crate::{Error, FilePath, Result};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Compiled filter expression for one participant.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    expression: String,
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

impl PathFilter {
    /// A filter that includes every path.
    pub fn all() -> Self {
        Self::default()
    }

    /// Compile a filter expression.
    pub fn parse(expression: &str) -> Result<Self> {
        let mut include = Vec::new();
        let mut exclude = Vec::new();

        for raw in expression.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (target, pattern) = match raw.strip_prefix('!') {
                Some(rest) => (&mut exclude, rest.trim()),
                None => (&mut include, raw),
            };
            let compiled = Pattern::new(pattern).map_err(|e| Error::InvalidFilter {
                expression: expression.to_string(),
                message: e.to_string(),
            })?;
            target.push(compiled);
        }

        Ok(Self {
            expression: expression.to_string(),
            include,
            exclude,
        })
    }

    /// The expression this filter was compiled from.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Whether `path` passes the filter.
    pub fn include(&self, path: &FilePath) -> bool {
        let path = path.as_str();
        let included = self.include.is_empty()
            || self
                .include
                .iter()
                .any(|p| p.matches_with(path, MATCH_OPTIONS));
        included
            && !self
                .exclude
                .iter()
                .any(|p| p.matches_with(path, MATCH_OPTIONS))
    }
}
