//! Route pattern matching.
//!
//! # Responsibilities
//! - Compile route patterns once, at registration
//! - Search a metadata field value for the pattern
//! - Capture groups for handlers that need parts of the value
//!
//! # Design Decisions
//! - Search semantics, not full-string anchoring: `"bridge.*"` matches
//!   `"bridge_hangup"` and so does `".*hangup"`
//! - Patterns that want anchoring spell it out with `^`/`$`
//! - Invalid patterns are rejected when compiled, never at dispatch time

use std::fmt;

use regex::Regex;

use crate::routing::RouteError;
use crate::session::Metadata;

/// A compiled route pattern.
#[derive(Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    pub fn new(source: &str) -> Result<Self, RouteError> {
        let regex = Regex::new(source).map_err(|e| RouteError::InvalidPattern {
            pattern: source.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Returns true if the pattern occurs anywhere in `value`.
    pub fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }

    /// Search `value`, returning every capture group of the first hit.
    /// Group 0 is the whole matched text.
    pub fn captures(&self, value: &str) -> Option<Vec<Option<String>>> {
        self.regex.captures(value).map(|caps| {
            caps.iter()
                .map(|m| m.map(|m| m.as_str().to_string()))
                .collect()
        })
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pattern").field(&self.source).finish()
    }
}

/// Reads a field out of session metadata. Absent fields read as empty.
pub fn field_value<'a>(metadata: &'a Metadata, field: &str) -> &'a str {
    metadata.get(field).map(String::as_str).unwrap_or("")
}

/// What a route matched, handed to its handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    /// Registration index of the matched route.
    pub index: usize,
    /// Metadata key the pattern was applied to.
    pub field: String,
    /// The field value at dispatch time.
    pub value: String,
    groups: Vec<Option<String>>,
}

impl RouteMatch {
    pub(crate) fn new(index: usize, field: &str, value: &str, groups: Vec<Option<String>>) -> Self {
        Self {
            index,
            field: field.to_string(),
            value: value.to_string(),
            groups,
        }
    }

    /// Capture group `n`; `0` is the whole match.
    pub fn group(&self, n: usize) -> Option<&str> {
        self.groups.get(n).and_then(|g| g.as_deref())
    }

    pub fn groups(&self) -> &[Option<String>] {
        &self.groups
    }
}
