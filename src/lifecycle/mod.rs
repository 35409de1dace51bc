//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     trigger() → every subscriber wakes → service stops reading events
//!     → live sessions are terminated → pending waits resolve as Terminated
//!
//! Signals (signals.rs):
//!     SIGINT/SIGTERM → Shutdown::trigger
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::shutdown_signal;
