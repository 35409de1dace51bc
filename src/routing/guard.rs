//! Router guards.
//!
//! A guard is a set of `field = value` requirements a session's metadata must
//! satisfy before a router processes it. Comparison is exact string equality;
//! an empty guard accepts everything.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::session::Metadata;

/// Required metadata values, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Guard {
    required: BTreeMap<String, String>,
}

impl Guard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.required.insert(field.into(), value.into())
    }

    pub fn remove(&mut self, field: &str) -> Option<String> {
        self.required.remove(field)
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.required.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.required.is_empty()
    }

    pub fn len(&self) -> usize {
        self.required.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.required.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns true if every requirement is met by `metadata`.
    pub fn evaluate(&self, metadata: &Metadata) -> bool {
        evaluate(self, metadata)
    }

    /// Fields whose requirement is not met, in field order.
    pub fn mismatches<'a>(&'a self, metadata: &'a Metadata) -> impl Iterator<Item = &'a str> + 'a {
        self.required
            .iter()
            .filter(move |(k, v)| metadata.get(k.as_str()) != Some(*v))
            .map(|(k, _)| k.as_str())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Guard {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            required: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// Pure guard predicate: every `(field, value)` in `guard` must equal the
/// metadata value exactly. A missing field never satisfies a requirement.
pub fn evaluate(guard: &Guard, metadata: &Metadata) -> bool {
    guard
        .required
        .iter()
        .all(|(k, v)| metadata.get(k) == Some(v))
}
