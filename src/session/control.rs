//! Boundary to the telephony connection layer.
//!
//! # Responsibilities
//! - Define the commands a session can issue for its call
//! - Hand commands to whatever owns the signaling socket
//!
//! # Design Decisions
//! - Sending never suspends: the connection layer queues the command and
//!   confirms it later through a session event
//! - The wire encoding is not part of this crate; `ChannelControl` simply
//!   forwards commands over an mpsc channel

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::session::{SessionError, SessionId};

/// A call-control command addressed to one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    Answer,
    Bridge {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        destination: Option<String>,
    },
    Playback {
        resource: String,
    },
    Hangup {
        cause: String,
    },
    Respond {
        code: u16,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Answer => "answer",
            Command::Bridge { .. } => "bridge",
            Command::Playback { .. } => "playback",
            Command::Hangup { .. } => "hangup",
            Command::Respond { .. } => "respond",
        }
    }
}

/// Sink for session commands, implemented by the connection layer.
pub trait CallControl: Send + Sync + std::fmt::Debug {
    /// Queue `command` for the call identified by `session`.
    fn send(&self, session: &SessionId, command: Command) -> Result<(), SessionError>;
}

/// A command together with the session it targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outbound {
    pub session_id: SessionId,
    #[serde(flatten)]
    pub command: Command,
}

/// Forwards commands over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelControl {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ChannelControl {
    /// Create the control and the receiver the connection layer drains.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl CallControl for ChannelControl {
    fn send(&self, session: &SessionId, command: Command) -> Result<(), SessionError> {
        self.tx
            .send(Outbound {
                session_id: session.clone(),
                command,
            })
            .map_err(|_| SessionError::ControlClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_control_forwards() {
        let (control, mut rx) = ChannelControl::new();
        let id = SessionId::from("abc");
        control.send(&id, Command::Respond { code: 407 }).unwrap();

        let out = rx.try_recv().unwrap();
        assert_eq!(out.session_id, id);
        assert_eq!(out.command, Command::Respond { code: 407 });
    }

    #[test]
    fn test_channel_control_closed() {
        let (control, rx) = ChannelControl::new();
        drop(rx);
        let err = control
            .send(&SessionId::from("abc"), Command::Answer)
            .unwrap_err();
        assert!(matches!(err, SessionError::ControlClosed));
    }

    #[test]
    fn test_outbound_json_shape() {
        let out = Outbound {
            session_id: SessionId::from("abc"),
            command: Command::Playback {
                resource: "welcome.wav".into(),
            },
        };
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["session_id"], "abc");
        assert_eq!(json["command"], "playback");
        assert_eq!(json["resource"], "welcome.wav");
    }
}
