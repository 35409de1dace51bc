//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the router
//! service. All types derive Serde traits for deserialization from TOML.
//!
//! ```toml
//! [service]
//! app_header = "variable_call_app"
//!
//! [[apps]]
//! id = "default"
//!
//! [[apps.routers]]
//! name = "inbound"
//! guards = { Caller-Direction = "inbound" }
//! subscribe = ["PLAYBACK_START", "PLAYBACK_STOP"]
//!
//! [[apps.routers.routes]]
//! pattern = "bridge.*"
//! actions = [{ type = "bridge" }]
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::routing::actions::Action;
use crate::routing::router::{DEFAULT_FIELD, DEFAULT_REJECT_CODE};
use crate::routing::DEFAULT_APP;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RoutingConfig {
    /// Session handling settings.
    pub service: ServiceConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Applications, each an ordered chain of routers.
    pub apps: Vec<AppConfig>,
}

/// Session handling settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// App used when a session does not name a loaded one.
    pub default_app: String,

    /// Metadata key naming the app a session belongs to.
    pub app_header: Option<String>,

    /// Events buffered per session while no handler waits for them.
    pub event_backlog: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            default_app: DEFAULT_APP.to_string(),
            app_header: Some("variable_call_app".to_string()),
            event_backlog: 64,
        }
    }
}

/// One application: routers consulted in order.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Application identifier.
    pub id: String,

    /// Routers in precedence order.
    #[serde(default)]
    pub routers: Vec<RouterConfig>,
}

/// A router definition.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouterConfig {
    /// Router identifier for logging/metrics.
    pub name: String,

    /// Metadata values a session must carry.
    #[serde(default)]
    pub guards: BTreeMap<String, String>,

    /// Reject sessions failing the guard instead of passing them on.
    #[serde(default = "default_reject_on_guard")]
    pub reject_on_guard: bool,

    /// Response code used for guard rejections.
    #[serde(default = "default_reject_code")]
    pub reject_code: u16,

    /// Field routes match against when they do not name one.
    #[serde(default = "default_field")]
    pub default_field: String,

    /// Extra events forwarded to this router's sessions.
    #[serde(default)]
    pub subscribe: Vec<String>,

    /// Routes in registration order.
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

/// A declarative route.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier for logging/metrics.
    pub name: Option<String>,

    /// Pattern searched for in the field value.
    pub pattern: String,

    /// Metadata field; defaults to the router's `default_field`.
    pub field: Option<String>,

    /// Actions run in order when the route matches.
    #[serde(default)]
    pub actions: Vec<Action>,

    /// Skip remaining routes once the actions complete.
    #[serde(default)]
    pub stop: bool,
}

fn default_reject_on_guard() -> bool {
    true
}

fn default_reject_code() -> u16 {
    DEFAULT_REJECT_CODE
}

fn default_field() -> String {
    DEFAULT_FIELD.to_string()
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
