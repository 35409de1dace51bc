//! Call routing and dispatch engine.
//!
//! Incoming calls carry signaling metadata. Routers gate them with guards,
//! match metadata fields against ordered regex routes and run the bound
//! handlers in sequence. A composer picks the application for a call and
//! hands it to the first router that accepts it.

pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod routing;
pub mod service;
pub mod session;

pub use config::RoutingConfig;
pub use lifecycle::Shutdown;
pub use routing::{Composer, Flow, Guard, Handler, HandlerError, RouteMatch, Router};
pub use service::{InboundEvent, Service};
pub use session::{CallControl, ChannelControl, Command, Session, SessionEvent, SessionId};
