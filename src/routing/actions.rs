//! Built-in route actions.
//!
//! Routes declared in configuration bind a list of these instead of code.
//! Each action drives the session the same way a hand-written handler would.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::routing::handler::{Flow, Handler, HandlerFuture, HandlerResult};
use crate::routing::matcher::RouteMatch;
use crate::routing::router::Router;
use crate::session::{CallStatus, Session};

/// One step of a declarative route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Answer if still ringing and wait for confirmation.
    Answer,
    /// Answer if needed, then bridge.
    Bridge {
        #[serde(default)]
        destination: Option<String>,
    },
    /// Start playback, optionally waiting for a named event.
    Playback {
        resource: String,
        #[serde(default)]
        until: Option<String>,
    },
    /// Wait for a named event.
    Wait { event: String },
    Respond { code: u16 },
    Hangup {
        #[serde(default)]
        cause: Option<String>,
    },
    /// Skip the remaining routes.
    Stop,
}

impl Action {
    pub async fn run(&self, session: &Session) -> HandlerResult {
        match self {
            Action::Answer => {
                if session.status() == CallStatus::Ringing {
                    session.answer().await?;
                }
            }
            Action::Bridge { destination } => {
                if session.status() == CallStatus::Ringing {
                    session.answer().await?;
                }
                session.bridge_to(destination.clone())?;
            }
            Action::Playback { resource, until } => {
                session.playback(resource.as_str())?;
                if let Some(event) = until {
                    session.recv(event).await?;
                }
            }
            Action::Wait { event } => {
                session.recv(event).await?;
            }
            Action::Respond { code } => session.respond(*code)?,
            Action::Hangup { cause } => match cause {
                Some(cause) => session.hangup_with(cause.as_str()).await?,
                None => session.hangup().await?,
            },
            Action::Stop => return Ok(Flow::StopRouting),
        }
        Ok(Flow::Continue)
    }

    /// Event names this action waits on, beyond the built-in call events.
    pub fn awaited_event(&self) -> Option<&str> {
        match self {
            Action::Playback { until, .. } => until.as_deref(),
            Action::Wait { event } => Some(event),
            _ => None,
        }
    }
}

/// A sequence of actions bound to one route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionList(pub Vec<Action>);

impl ActionList {
    pub async fn run(&self, session: &Session) -> HandlerResult {
        for action in &self.0 {
            if action.run(session).await? == Flow::StopRouting {
                return Ok(Flow::StopRouting);
            }
        }
        Ok(Flow::Continue)
    }
}

impl Handler for ActionList {
    fn call(&self, session: Session, _router: Arc<Router>, _matched: RouteMatch) -> HandlerFuture {
        let actions = self.clone();
        Box::pin(async move { actions.run(&session).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::events::{CHANNEL_ANSWER, CHANNEL_HANGUP};
    use crate::session::{ChannelControl, Command, SessionEvent, SessionId};

    #[test]
    fn test_action_deserialize() {
        #[derive(Deserialize)]
        struct Doc {
            actions: Vec<Action>,
        }
        let doc: Doc = toml::from_str(
            r#"
            actions = [
                { type = "answer" },
                { type = "playback", resource = "welcome.wav", until = "PLAYBACK_STOP" },
                { type = "respond", code = 407 },
                { type = "stop" },
            ]
            "#,
        )
        .unwrap();
        assert_eq!(
            doc.actions,
            vec![
                Action::Answer,
                Action::Playback {
                    resource: "welcome.wav".into(),
                    until: Some("PLAYBACK_STOP".into())
                },
                Action::Respond { code: 407 },
                Action::Stop,
            ]
        );
        assert_eq!(doc.actions[1].awaited_event(), Some("PLAYBACK_STOP"));
    }

    #[tokio::test]
    async fn test_welcome_sequence() {
        let (control, mut commands) = ChannelControl::new();
        let session = Session::new(SessionId::from("s1"), "fs1", Default::default(), Arc::new(control), 16);
        let actions = ActionList(vec![
            Action::Answer,
            Action::Playback {
                resource: "welcome.wav".into(),
                until: Some("PLAYBACK_STOP".into()),
            },
            Action::Hangup { cause: None },
        ]);

        let task = {
            let session = session.clone();
            tokio::spawn(async move { actions.run(&session).await })
        };

        assert_eq!(commands.recv().await.unwrap().command, Command::Answer);
        session.deliver(SessionEvent::new(CHANNEL_ANSWER));
        assert_eq!(
            commands.recv().await.unwrap().command,
            Command::Playback { resource: "welcome.wav".into() }
        );
        session.deliver(SessionEvent::new("PLAYBACK_STOP"));
        assert!(matches!(commands.recv().await.unwrap().command, Command::Hangup { .. }));
        session.deliver(SessionEvent::new(CHANNEL_HANGUP));

        assert_eq!(task.await.unwrap().unwrap(), Flow::Continue);
        assert!(session.is_hungup());
    }

    #[tokio::test]
    async fn test_stop_ends_sequence() {
        let (control, mut commands) = ChannelControl::new();
        let session = Session::new(SessionId::from("s1"), "fs1", Default::default(), Arc::new(control), 16);
        let actions = ActionList(vec![Action::Stop, Action::Respond { code: 486 }]);

        assert_eq!(actions.run(&session).await.unwrap(), Flow::StopRouting);
        assert!(commands.try_recv().is_err());
    }
}
