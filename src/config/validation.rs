//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check identifiers are present and unique (apps, routers per app)
//! - Compile every route pattern once so bad regexes surface at load time
//! - Validate value ranges (response codes, backlog size)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RoutingConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use thiserror::Error;

use crate::config::schema::RoutingConfig;
use crate::routing::matcher::Pattern;
use crate::routing::{Action, RouteError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("app #{index} has an empty id")]
    EmptyAppId { index: usize },

    #[error("app '{0}' is defined more than once")]
    DuplicateApp(String),

    #[error("app '{app}' has a router with an empty name")]
    EmptyRouterName { app: String },

    #[error("app '{app}' defines router '{router}' more than once")]
    DuplicateRouter { app: String, router: String },

    #[error("router '{router}': invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        router: String,
        pattern: String,
        reason: String,
    },

    #[error("router '{router}': route '{pattern}' has an empty field")]
    EmptyField { router: String, pattern: String },

    #[error("router '{router}': response code {code} is outside 100..=699")]
    InvalidCode { router: String, code: u16 },

    #[error("router '{router}': empty event name in subscribe")]
    EmptySubscription { router: String },

    #[error("service.event_backlog must be greater than zero")]
    ZeroBacklog,

    #[error("service.default_app must not be empty")]
    EmptyDefaultApp,
}

fn valid_code(code: u16) -> bool {
    (100..=699).contains(&code)
}

/// Check `config` and collect every problem found.
pub fn validate_config(config: &RoutingConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.service.event_backlog == 0 {
        errors.push(ValidationError::ZeroBacklog);
    }
    if config.service.default_app.is_empty() {
        errors.push(ValidationError::EmptyDefaultApp);
    }

    let mut app_ids = HashSet::new();
    for (index, app) in config.apps.iter().enumerate() {
        if app.id.is_empty() {
            errors.push(ValidationError::EmptyAppId { index });
        } else if !app_ids.insert(app.id.as_str()) {
            errors.push(ValidationError::DuplicateApp(app.id.clone()));
        }

        let mut router_names = HashSet::new();
        for router in &app.routers {
            if router.name.is_empty() {
                errors.push(ValidationError::EmptyRouterName { app: app.id.clone() });
            } else if !router_names.insert(router.name.as_str()) {
                errors.push(ValidationError::DuplicateRouter {
                    app: app.id.clone(),
                    router: router.name.clone(),
                });
            }

            if !valid_code(router.reject_code) {
                errors.push(ValidationError::InvalidCode {
                    router: router.name.clone(),
                    code: router.reject_code,
                });
            }
            if router.subscribe.iter().any(String::is_empty) {
                errors.push(ValidationError::EmptySubscription {
                    router: router.name.clone(),
                });
            }

            for route in &router.routes {
                if let Err(RouteError::InvalidPattern { reason, .. }) = Pattern::new(&route.pattern) {
                    errors.push(ValidationError::InvalidPattern {
                        router: router.name.clone(),
                        pattern: route.pattern.clone(),
                        reason,
                    });
                }
                let field = route.field.as_deref().unwrap_or(&router.default_field);
                if field.is_empty() {
                    errors.push(ValidationError::EmptyField {
                        router: router.name.clone(),
                        pattern: route.pattern.clone(),
                    });
                }
                for action in &route.actions {
                    if let Action::Respond { code } = action {
                        if !valid_code(*code) {
                            errors.push(ValidationError::InvalidCode {
                                router: router.name.clone(),
                                code: *code,
                            });
                        }
                    }
                }
            }
        }
    }

    if !config.apps.is_empty() && !app_ids.contains(config.service.default_app.as_str()) {
        tracing::warn!(
            default_app = %config.service.default_app,
            "Default app is not defined; sessions without an app header will go unhandled"
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
