//! The per-call session handle used by route handlers.
//!
//! # Responsibilities
//! - Expose call commands (answer, bridge, playback, hangup, respond)
//! - Suspend handler tasks until the connection layer confirms state changes
//! - Track call status and the latest signaling headers
//!
//! # Design Decisions
//! - `Session` is a cheap clone around shared state
//! - Waiters are registered before a command is sent, so a fast confirmation
//!   can never be missed
//! - `answer`, `hangup` and `recv` suspend; every other command returns as
//!   soon as it is queued
//! - Metadata is swapped atomically; readers always get a consistent snapshot

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::ArcSwap;

use crate::session::control::{CallControl, Command};
use crate::session::events::{
    EventQueue, SessionEvent, WaitFor, CHANNEL_ANSWER, CHANNEL_HANGUP,
};
use crate::session::state::CallStatus;
use crate::session::types::{Metadata, SessionError, SessionId};

/// Hangup cause sent by [`Session::hangup`].
pub const NORMAL_CLEARING: &str = "NORMAL_CLEARING";

#[derive(Debug)]
struct CallState {
    status: CallStatus,
    events: EventQueue,
}

struct Inner {
    id: SessionId,
    host: String,
    metadata: ArcSwap<Metadata>,
    state: Mutex<CallState>,
    control: Arc<dyn CallControl>,
}

/// Handle to one live call.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl Session {
    /// Create a ringing session.
    ///
    /// `backlog` bounds how many undelivered events are buffered for later
    /// `recv` calls.
    pub fn new(
        id: SessionId,
        host: impl Into<String>,
        metadata: Metadata,
        control: Arc<dyn CallControl>,
        backlog: usize,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                id,
                host: host.into(),
                metadata: ArcSwap::from_pointee(metadata),
                state: Mutex::new(CallState {
                    status: CallStatus::Ringing,
                    events: EventQueue::new(backlog),
                }),
                control,
            }),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.inner.id
    }

    /// The switch node this call lives on, as reported by the connection layer.
    pub fn host(&self) -> &str {
        &self.inner.host
    }

    /// Snapshot of the current signaling headers.
    pub fn metadata(&self) -> Arc<Metadata> {
        self.inner.metadata.load_full()
    }

    pub fn header(&self, key: &str) -> Option<String> {
        self.inner.metadata.load().get(key).cloned()
    }

    pub fn status(&self) -> CallStatus {
        self.lock().status
    }

    pub fn is_answered(&self) -> bool {
        self.status().is_up()
    }

    pub fn is_hungup(&self) -> bool {
        self.status().is_terminal()
    }

    /// Answer the call and wait until the answer is confirmed.
    pub async fn answer(&self) -> Result<(), SessionError> {
        let wait = {
            let mut state = self.lock();
            if state.status != CallStatus::Ringing {
                return Err(SessionError::InvalidState {
                    operation: "answer",
                    status: state.status,
                });
            }
            state.events.wait(CHANNEL_ANSWER)
        };
        if matches!(wait, WaitFor::Closed) {
            return Err(SessionError::Terminated(self.inner.id.clone()));
        }
        self.send(Command::Answer)?;
        self.resolve(wait).await.map(|_| ())
    }

    /// Bridge the answered call. Does not wait for the bridge to complete.
    pub fn bridge(&self) -> Result<(), SessionError> {
        self.bridge_to(None)
    }

    /// Bridge to an explicit destination, or the switch default when `None`.
    pub fn bridge_to(&self, destination: Option<String>) -> Result<(), SessionError> {
        self.require("bridge", |s| s == CallStatus::Answered)?;
        self.send(Command::Bridge { destination })
    }

    /// Start playing `resource`. Completion is observed through `recv`.
    pub fn playback(&self, resource: impl Into<String>) -> Result<(), SessionError> {
        self.require("playback", CallStatus::is_up)?;
        self.send(Command::Playback {
            resource: resource.into(),
        })
    }

    /// Wait until an event named `name` is observed for this session.
    pub async fn recv(&self, name: &str) -> Result<SessionEvent, SessionError> {
        let wait = self.lock().events.wait(name);
        self.resolve(wait).await
    }

    /// Hang up with a normal clearing cause and wait for confirmation.
    pub async fn hangup(&self) -> Result<(), SessionError> {
        self.hangup_with(NORMAL_CLEARING).await
    }

    pub async fn hangup_with(&self, cause: impl Into<String>) -> Result<(), SessionError> {
        let wait = {
            let mut state = self.lock();
            if !state.status.is_up() {
                return Err(SessionError::InvalidState {
                    operation: "hangup",
                    status: state.status,
                });
            }
            state.events.wait(CHANNEL_HANGUP)
        };
        if matches!(wait, WaitFor::Closed) {
            return Err(SessionError::Terminated(self.inner.id.clone()));
        }
        self.send(Command::Hangup {
            cause: cause.into(),
        })?;
        self.resolve(wait).await.map(|_| ())
    }

    /// Send a signaling response. The call status is left untouched.
    pub fn respond(&self, code: u16) -> Result<(), SessionError> {
        self.require("respond", |s| !s.is_terminal())?;
        self.send(Command::Respond { code })
    }

    /// Feed an event from the connection layer into this session.
    ///
    /// Headers carried by the event are merged into the metadata, call-state
    /// events advance the status, and waiters for the event name are woken.
    pub fn deliver(&self, event: SessionEvent) {
        if !event.headers.is_empty() {
            self.inner.metadata.rcu(|current| {
                let mut next = Metadata::clone(current);
                next.extend(event.headers.iter().map(|(k, v)| (k.clone(), v.clone())));
                next
            });
        }

        let mut state = self.lock();
        if let Some(target) = event.status_change() {
            if state.status.can_transition_to(target) {
                tracing::debug!(
                    session_id = %self.inner.id,
                    from = %state.status,
                    to = %target,
                    "Call status changed"
                );
                state.status = target;
            } else {
                tracing::debug!(
                    session_id = %self.inner.id,
                    status = %state.status,
                    event = %event.name,
                    "Ignoring out-of-order call state event"
                );
            }
        }

        let woken = state.events.push(event);
        tracing::trace!(session_id = %self.inner.id, woken, "Event delivered");

        if state.status.is_terminal() {
            state.events.close();
        }
    }

    /// Mark the call as gone. Pending waits resolve with `Terminated`.
    pub fn terminate(&self) {
        let mut state = self.lock();
        if !state.status.is_terminal() {
            tracing::debug!(session_id = %self.inner.id, from = %state.status, "Session terminated");
            state.status = CallStatus::HungUp;
        }
        state.events.close();
    }

    pub fn is_terminated(&self) -> bool {
        self.lock().events.is_closed()
    }

    fn require(
        &self,
        operation: &'static str,
        allowed: impl Fn(CallStatus) -> bool,
    ) -> Result<(), SessionError> {
        let status = self.status();
        if allowed(status) {
            Ok(())
        } else {
            Err(SessionError::InvalidState { operation, status })
        }
    }

    fn send(&self, command: Command) -> Result<(), SessionError> {
        tracing::debug!(session_id = %self.inner.id, command = command.name(), "Sending command");
        self.lock().events.discard_backlog();
        self.inner.control.send(&self.inner.id, command)
    }

    async fn resolve(&self, wait: WaitFor) -> Result<SessionEvent, SessionError> {
        match wait {
            WaitFor::Ready(event) => Ok(event),
            WaitFor::Pending(rx) => rx
                .await
                .map_err(|_| SessionError::Terminated(self.inner.id.clone())),
            WaitFor::Closed => Err(SessionError::Terminated(self.inner.id.clone())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CallState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("host", &self.inner.host)
            .field("status", &self.status())
            .finish()
    }
}
