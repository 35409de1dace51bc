//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming session (metadata from call signaling)
//!     → composer.rs (pick app, scan routers in order)
//!     → guard.rs (router accepts, rejects or declines)
//!     → table.rs (every matching route, registration order)
//!     → matcher.rs (pattern search on the route's field)
//!     → handler.rs (run handlers one by one until StopRouting or failure)
//!
//! Route registration (at startup):
//!     Router::route(pattern).field(..).to(handler)
//!     → compile pattern, append to table
//!     → freeze router behind Arc, load into Composer
//! ```
//!
//! # Design Decisions
//! - Routes compiled at registration, immutable once a router is loaded
//! - Deterministic: same metadata always yields the same ordered matches
//! - All matching routes fire; StopRouting is the only short-circuit
//! - Across routers, first acceptor wins

pub mod actions;
pub mod composer;
pub mod guard;
pub mod handler;
pub mod matcher;
pub mod router;
pub mod table;

pub use actions::{Action, ActionList};
pub use composer::{ComposeOutcome, Composer, Plan, PlanDecision, DEFAULT_APP};
pub use guard::{evaluate, Guard};
pub use handler::{handler_fn, Flow, Handler, HandlerError, HandlerResult};
pub use matcher::{Pattern, RouteMatch};
pub use router::{DispatchOutcome, DispatchReport, Halt, Router, DEFAULT_FIELD};
pub use table::{Route, RouteError, RouteTable};
