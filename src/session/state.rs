//! Call status state machine.
//!
//! # States
//! - Ringing: call offered, not yet answered
//! - Answered: media path established with the caller
//! - Bridged: caller connected to another leg
//! - HungUp: call torn down (terminal)
//!
//! # State Transitions
//! ```text
//! Ringing  → Answered: answer confirmed
//! Answered → Bridged:  bridge confirmed
//! Answered → HungUp, Bridged → HungUp: hangup confirmed
//! Ringing  → HungUp: caller abandoned before answer (external only)
//! ```
//!
//! # Design Decisions
//! - Transitions only move forward; stale or duplicate events are ignored
//! - Commands validate against the current status before anything is sent

use std::fmt;

/// Status of a single call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CallStatus {
    Ringing,
    Answered,
    Bridged,
    HungUp,
}

impl CallStatus {
    /// Returns true if the state machine allows moving from `self` to `target`.
    pub fn can_transition_to(self, target: CallStatus) -> bool {
        matches!(
            (self, target),
            (CallStatus::Ringing, CallStatus::Answered)
                | (CallStatus::Ringing, CallStatus::HungUp)
                | (CallStatus::Answered, CallStatus::Bridged)
                | (CallStatus::Answered, CallStatus::HungUp)
                | (CallStatus::Bridged, CallStatus::HungUp)
        )
    }

    /// HungUp accepts no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, CallStatus::HungUp)
    }

    /// True once the call has media (answered or bridged).
    pub fn is_up(self) -> bool {
        matches!(self, CallStatus::Answered | CallStatus::Bridged)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CallStatus::Ringing => "ringing",
            CallStatus::Answered => "answered",
            CallStatus::Bridged => "bridged",
            CallStatus::HungUp => "hungup",
        }
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
