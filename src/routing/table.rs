//! Ordered route storage and lookup.
//!
//! # Responsibilities
//! - Store routes in registration order
//! - Produce every route matching a session's metadata, in that order
//!
//! # Design Decisions
//! - Append-only: routes are never reordered, replaced or deduplicated
//! - Registration order is the only precedence; there are no priorities
//! - Lookup is a lazy iterator borrowing the table, so it cannot mutate it
//!   and can be restarted by calling `iter_matches` again
//! - All matches are yielded; this is not first-match-wins

use std::sync::Arc;

use thiserror::Error;

use crate::routing::handler::Handler;
use crate::routing::matcher::{field_value, Pattern, RouteMatch};
use crate::session::Metadata;

/// Configuration errors raised while registering routes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("invalid route pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("route {pattern:?} has an empty field name")]
    EmptyField { pattern: String },
}

/// A registered `(pattern, field, handler)` binding.
#[derive(Debug, Clone)]
pub struct Route {
    index: usize,
    name: String,
    field: String,
    pattern: Pattern,
    handler: Arc<dyn Handler>,
}

impl Route {
    /// Position in the table, assigned at registration.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn handler(&self) -> &Arc<dyn Handler> {
        &self.handler
    }

    /// Match this route against `metadata`.
    pub fn matches(&self, metadata: &Metadata) -> Option<RouteMatch> {
        let value = field_value(metadata, &self.field);
        self.pattern
            .captures(value)
            .map(|groups| RouteMatch::new(self.index, &self.field, value, groups))
    }
}

/// Append-only ordered list of routes.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a route. `name` defaults to `route-<index>`.
    pub fn register(
        &mut self,
        name: Option<String>,
        pattern: &str,
        field: &str,
        handler: Arc<dyn Handler>,
    ) -> Result<&Route, RouteError> {
        if field.is_empty() {
            return Err(RouteError::EmptyField {
                pattern: pattern.to_string(),
            });
        }
        let pattern = Pattern::new(pattern)?;
        let index = self.routes.len();

        self.routes.push(Route {
            index,
            name: name.unwrap_or_else(|| format!("route-{}", index)),
            field: field.to_string(),
            pattern,
            handler,
        });
        Ok(&self.routes[index])
    }

    /// Every route whose pattern occurs in its field's value, in
    /// registration order.
    pub fn iter_matches<'a>(&'a self, metadata: &'a Metadata) -> Matches<'a> {
        Matches {
            routes: self.routes.iter(),
            metadata,
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Route> {
        self.routes.iter()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Lazy iterator over matching routes.
#[derive(Clone)]
pub struct Matches<'a> {
    routes: std::slice::Iter<'a, Route>,
    metadata: &'a Metadata,
}

impl<'a> Iterator for Matches<'a> {
    type Item = (&'a Route, RouteMatch);

    fn next(&mut self) -> Option<Self::Item> {
        for route in self.routes.by_ref() {
            if let Some(matched) = route.matches(self.metadata) {
                return Some((route, matched));
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.routes.len()))
    }
}
