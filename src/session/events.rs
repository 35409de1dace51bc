//! Per-session event queue.
//!
//! # Responsibilities
//! - Hold events delivered by the connection layer for one session
//! - Wake tasks suspended in `recv` when a matching event arrives
//! - Buffer events nobody is waiting for yet (bounded)
//!
//! # Design Decisions
//! - One queue per session, no global bus
//! - An event wakes every waiter registered for its name at delivery time
//! - Buffered events are consumed by the first later waiter for that name,
//!   and discarded once the session issues its next command
//! - Closing the queue drops all waiters, which resolves them as terminated

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::session::state::CallStatus;

/// Emitted by the connection layer once an answer is confirmed.
pub const CHANNEL_ANSWER: &str = "CHANNEL_ANSWER";
/// Emitted by the connection layer once a bridge is established.
pub const CHANNEL_BRIDGE: &str = "CHANNEL_BRIDGE";
/// Emitted by the connection layer once the call is torn down.
pub const CHANNEL_HANGUP: &str = "CHANNEL_HANGUP";

/// Events every session receives regardless of router subscriptions.
pub const BUILTIN_EVENTS: [&str; 3] = [CHANNEL_ANSWER, CHANNEL_BRIDGE, CHANNEL_HANGUP];

/// A named notification for one session, with the headers that came with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub name: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl SessionEvent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            headers: HashMap::new(),
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// The status this event confirms, if it is a call-state event.
    pub fn status_change(&self) -> Option<CallStatus> {
        match self.name.as_str() {
            CHANNEL_ANSWER => Some(CallStatus::Answered),
            CHANNEL_BRIDGE => Some(CallStatus::Bridged),
            CHANNEL_HANGUP => Some(CallStatus::HungUp),
            _ => None,
        }
    }

    pub fn is_builtin(name: &str) -> bool {
        BUILTIN_EVENTS.contains(&name)
    }
}

/// Result of registering interest in an event name.
#[derive(Debug)]
pub(crate) enum WaitFor {
    /// A buffered event satisfied the wait immediately.
    Ready(SessionEvent),
    /// Resolves when the event is delivered; errors if the queue closes first.
    Pending(oneshot::Receiver<SessionEvent>),
    /// The session is gone and nothing buffered matches.
    Closed,
}

#[derive(Debug)]
struct Waiter {
    name: String,
    tx: oneshot::Sender<SessionEvent>,
}

#[derive(Debug)]
pub(crate) struct EventQueue {
    backlog: VecDeque<SessionEvent>,
    capacity: usize,
    waiters: Vec<Waiter>,
    closed: bool,
}

impl EventQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            backlog: VecDeque::new(),
            capacity,
            waiters: Vec::new(),
            closed: false,
        }
    }

    pub(crate) fn wait(&mut self, name: &str) -> WaitFor {
        if let Some(pos) = self.backlog.iter().position(|e| e.name == name) {
            if let Some(event) = self.backlog.remove(pos) {
                return WaitFor::Ready(event);
            }
        }
        if self.closed {
            return WaitFor::Closed;
        }
        let (tx, rx) = oneshot::channel();
        self.waiters.push(Waiter {
            name: name.to_string(),
            tx,
        });
        WaitFor::Pending(rx)
    }

    /// Deliver an event. Returns the number of waiters woken; when zero the
    /// event is buffered, evicting the oldest entry if the backlog is full.
    pub(crate) fn push(&mut self, event: SessionEvent) -> usize {
        if self.closed {
            return 0;
        }

        let mut woken = 0;
        let mut remaining = Vec::with_capacity(self.waiters.len());
        for waiter in self.waiters.drain(..) {
            if waiter.tx.is_closed() {
                continue;
            }
            if waiter.name == event.name {
                if waiter.tx.send(event.clone()).is_ok() {
                    woken += 1;
                }
            } else {
                remaining.push(waiter);
            }
        }
        self.waiters = remaining;

        if woken == 0 && self.capacity > 0 {
            if self.backlog.len() >= self.capacity {
                self.backlog.pop_front();
            }
            self.backlog.push_back(event);
        }
        woken
    }

    pub(crate) fn close(&mut self) {
        self.closed = true;
        self.waiters.clear();
    }

    /// Forget buffered events. Called when a new command goes out, so a
    /// later wait only sees events that follow that command.
    pub(crate) fn discard_backlog(&mut self) {
        self.backlog.clear();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    #[cfg(test)]
    fn backlog_len(&self) -> usize {
        self.backlog.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffered_event_satisfies_later_wait() {
        let mut queue = EventQueue::new(8);
        assert_eq!(queue.push(SessionEvent::new("PLAYBACK_START")), 0);

        match queue.wait("PLAYBACK_START") {
            WaitFor::Ready(event) => assert_eq!(event.name, "PLAYBACK_START"),
            other => panic!("expected buffered event, got {:?}", other),
        }
        assert_eq!(queue.backlog_len(), 0);
    }

    #[tokio::test]
    async fn test_push_wakes_all_waiters_for_name() {
        let mut queue = EventQueue::new(8);
        let WaitFor::Pending(rx1) = queue.wait("PLAYBACK_STOP") else {
            panic!("expected pending wait");
        };
        let WaitFor::Pending(rx2) = queue.wait("PLAYBACK_STOP") else {
            panic!("expected pending wait");
        };
        let WaitFor::Pending(_other) = queue.wait("DTMF") else {
            panic!("expected pending wait");
        };

        assert_eq!(queue.push(SessionEvent::new("PLAYBACK_STOP")), 2);
        assert_eq!(rx1.await.unwrap().name, "PLAYBACK_STOP");
        assert_eq!(rx2.await.unwrap().name, "PLAYBACK_STOP");
        assert_eq!(queue.backlog_len(), 0);
    }

    #[test]
    fn test_backlog_is_bounded() {
        let mut queue = EventQueue::new(2);
        queue.push(SessionEvent::new("A"));
        queue.push(SessionEvent::new("B"));
        queue.push(SessionEvent::new("C"));
        assert_eq!(queue.backlog_len(), 2);
        assert!(matches!(queue.wait("A"), WaitFor::Pending(_)));
        assert!(matches!(queue.wait("B"), WaitFor::Ready(_)));
    }

    #[test]
    fn test_discard_backlog_keeps_waiters() {
        let mut queue = EventQueue::new(4);
        queue.push(SessionEvent::new("PLAYBACK_STOP"));
        let WaitFor::Pending(_rx) = queue.wait("PLAYBACK_START") else {
            panic!("expected pending wait");
        };
        queue.discard_backlog();
        assert_eq!(queue.backlog_len(), 0);
        assert_eq!(queue.push(SessionEvent::new("PLAYBACK_START")), 1);
    }

    #[tokio::test]
    async fn test_close_drops_waiters() {
        let mut queue = EventQueue::new(2);
        let WaitFor::Pending(rx) = queue.wait("PLAYBACK_START") else {
            panic!("expected pending wait");
        };
        queue.close();
        assert!(rx.await.is_err());
        assert!(matches!(queue.wait("PLAYBACK_START"), WaitFor::Closed));
        assert_eq!(queue.push(SessionEvent::new("PLAYBACK_START")), 0);
    }

    #[test]
    fn test_status_change_mapping() {
        assert_eq!(
            SessionEvent::new(CHANNEL_ANSWER).status_change(),
            Some(CallStatus::Answered)
        );
        assert_eq!(SessionEvent::new("PLAYBACK_START").status_change(), None);
        assert!(SessionEvent::is_builtin(CHANNEL_HANGUP));
        assert!(!SessionEvent::is_builtin("PLAYBACK_START"));
    }
}
