//! Messages from the connection layer.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::session::{Metadata, SessionEvent, SessionId};

/// One notification from the connection layer.
///
/// The `run` command reads these as JSON lines:
///
/// ```json
/// {"type":"new_session","session_id":"a1","host":"fs1","headers":{"Caller-Destination-Number":"101"}}
/// {"type":"event","session_id":"a1","name":"CHANNEL_ANSWER"}
/// {"type":"gone","session_id":"a1"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    /// A new call was handed to us. A missing id is generated.
    NewSession {
        #[serde(default = "SessionId::generate")]
        session_id: SessionId,
        #[serde(default)]
        host: String,
        #[serde(default)]
        headers: Metadata,
    },
    /// An event for a live call.
    Event {
        session_id: SessionId,
        name: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
    /// The call no longer exists.
    Gone { session_id: SessionId },
}

impl InboundEvent {
    pub fn session_id(&self) -> &SessionId {
        match self {
            InboundEvent::NewSession { session_id, .. }
            | InboundEvent::Event { session_id, .. }
            | InboundEvent::Gone { session_id } => session_id,
        }
    }

    /// The session event carried, if any.
    pub fn to_session_event(&self) -> Option<SessionEvent> {
        match self {
            InboundEvent::Event { name, headers, .. } => Some(SessionEvent {
                name: name.clone(),
                headers: headers.clone(),
            }),
            _ => None,
        }
    }
}
