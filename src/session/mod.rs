//! Session subsystem.
//!
//! # Data Flow
//! ```text
//! Route handler
//!     → call.rs (answer / bridge / playback / hangup / respond)
//!     → control.rs (Command handed to the connection layer)
//!
//! Connection layer
//!     → Session::deliver(event)
//!     → state.rs (advance call status)
//!     → events.rs (wake waiters or buffer)
//!     → suspended handler resumes
//! ```
//!
//! # Design Decisions
//! - Each session owns its own event queue
//! - Only the issuing session's task suspends
//! - Status only moves forward; HungUp is terminal

pub mod call;
pub mod control;
pub mod events;
pub mod state;
pub mod types;

pub use call::Session;
pub use control::{CallControl, ChannelControl, Command, Outbound};
pub use events::SessionEvent;
pub use state::CallStatus;
pub use types::{Metadata, SessionError, SessionId};
