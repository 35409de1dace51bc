//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Routing and session code produce:
//!     → logging.rs (structured log events keyed by session_id, router, route)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stderr, pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Session ID flows through every log line of a dispatch
//! - Metrics are cheap (atomic increments) and optional

pub mod logging;
pub mod metrics;
