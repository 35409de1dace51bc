//! Session service subsystem.
//!
//! # Data Flow
//! ```text
//! Connection layer
//!     → ingress.rs (InboundEvent: new session / event / gone)
//!     → server.rs (registry lookup, subscription filter)
//!     → new session: spawn task → Composer::dispatch
//!     → event: Session::deliver
//!     → gone: Session::terminate
//!
//! Handlers
//!     → Session commands → CallControl → connection layer
//! ```

pub mod ingress;
pub mod server;

pub use ingress::InboundEvent;
pub use server::Service;
