//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks, all errors at once)
//!     → build.rs (RoutingConfig → Routers → Composer)
//!     → swapped into the running service
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → new Composer replaces the old one; in-flight sessions keep theirs
//! ```
//!
//! # Design Decisions
//! - Routers are never mutated after load; a reload builds fresh ones
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod build;
pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{AppConfig, LogFormat, ObservabilityConfig, RouteConfig, RouterConfig, RoutingConfig, ServiceConfig};
pub use validation::{validate_config, ValidationError};
pub use watcher::ConfigWatcher;
