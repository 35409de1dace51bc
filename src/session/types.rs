//! Session identifiers, metadata and error definitions.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::state::CallStatus;

/// Call signaling headers keyed by name.
pub type Metadata = HashMap<String, String>;

/// Identifier assigned to a call by the connection layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors returned by session operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The operation is not legal in the current call status.
    #[error("cannot {operation} while call is {status}")]
    InvalidState {
        operation: &'static str,
        status: CallStatus,
    },

    /// The call went away before the awaited event arrived.
    #[error("session {0} terminated")]
    Terminated(SessionId),

    /// The connection layer no longer accepts commands.
    #[error("call control channel closed")]
    ControlClosed,
}
