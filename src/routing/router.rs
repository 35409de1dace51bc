//! Guarded router and session dispatch.
//!
//! # Responsibilities
//! - Register handlers against metadata patterns
//! - Gate sessions with a guard before any handler runs
//! - Run matched handlers for a session, in order, honoring StopRouting
//!
//! # Design Decisions
//! - Routers are configured through `&mut` and frozen behind `Arc` before
//!   they receive sessions, so the table and guard cannot change mid-dispatch
//! - Handlers for one session run strictly one after another; each may
//!   suspend without blocking other sessions
//! - StopRouting and handler failures only end the current dispatch call
//! - Guard failure is not an error: it rejects or declines per configuration

use std::collections::BTreeSet;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;

use crate::observability::metrics;
use crate::routing::guard::Guard;
use crate::routing::handler::{handler_fn, FnHandler, Flow, Handler, HandlerError, HandlerResult};
use crate::routing::matcher::RouteMatch;
use crate::routing::table::{Matches, RouteError, RouteTable};
use crate::session::{Metadata, Session};

/// Field routes match against when none is given.
pub const DEFAULT_FIELD: &str = "Caller-Destination-Number";

/// Signaling response sent when a guard rejects a session.
pub const DEFAULT_REJECT_CODE: u16 = 403;

/// Result of one router's dispatch call.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// Guard failed and a rejection was sent; no handlers ran.
    GuardRejected,
    /// Guard failed and the session was passed over untouched.
    GuardDeclined,
    /// Guard passed; matched handlers ran.
    Handled(DispatchReport),
}

impl DispatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchOutcome::GuardRejected => "rejected",
            DispatchOutcome::GuardDeclined => "declined",
            DispatchOutcome::Handled(_) => "handled",
        }
    }
}

/// What happened inside an accepted dispatch.
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Names of the routes whose handlers were invoked, in order.
    pub invoked: Vec<String>,
    pub halt: Halt,
}

/// Why the handler chain ended.
#[derive(Debug, Default)]
pub enum Halt {
    /// Every matched handler ran.
    #[default]
    Completed,
    /// A handler returned StopRouting.
    Stopped { route: String },
    /// A handler failed; later handlers were skipped.
    Failed { route: String, error: HandlerError },
}

/// Ordered, guarded set of routes.
#[derive(Debug)]
pub struct Router {
    name: String,
    table: RouteTable,
    guard: Guard,
    reject_on_guard: bool,
    reject_code: u16,
    default_field: String,
    subscriptions: BTreeSet<String>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new("router")
    }
}

impl Router {
    /// A router with an empty guard that rejects on guard failure.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: RouteTable::new(),
            guard: Guard::new(),
            reject_on_guard: true,
            reject_code: DEFAULT_REJECT_CODE,
            default_field: DEFAULT_FIELD.to_string(),
            subscriptions: BTreeSet::new(),
        }
    }

    pub fn with_guard(name: impl Into<String>, guard: Guard) -> Self {
        let mut router = Self::new(name);
        router.guard = guard;
        router
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn guards(&self) -> &Guard {
        &self.guard
    }

    pub fn guards_mut(&mut self) -> &mut Guard {
        &mut self.guard
    }

    pub fn reject_on_guard(&self) -> bool {
        self.reject_on_guard
    }

    /// When false, sessions failing the guard pass through untouched.
    pub fn set_reject_on_guard(&mut self, reject: bool) -> &mut Self {
        self.reject_on_guard = reject;
        self
    }

    pub fn reject_code(&self) -> u16 {
        self.reject_code
    }

    pub fn set_reject_code(&mut self, code: u16) -> &mut Self {
        self.reject_code = code;
        self
    }

    pub fn default_field(&self) -> &str {
        &self.default_field
    }

    pub fn set_default_field(&mut self, field: impl Into<String>) -> &mut Self {
        self.default_field = field.into();
        self
    }

    /// Ask the session layer to forward these events to this router's sessions.
    pub fn subscribe<I, S>(&mut self, events: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subscriptions.extend(events.into_iter().map(Into::into));
        self
    }

    pub fn subscriptions(&self) -> &BTreeSet<String> {
        &self.subscriptions
    }

    /// Start registering a handler for `pattern`.
    pub fn route(&mut self, pattern: impl Into<String>) -> RouteBuilder<'_> {
        RouteBuilder {
            router: self,
            pattern: pattern.into(),
            field: None,
            name: None,
        }
    }

    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    pub fn iter_matches<'a>(&'a self, metadata: &'a Metadata) -> Matches<'a> {
        self.table.iter_matches(metadata)
    }

    /// Check the guard without side effects.
    pub fn accepts(&self, metadata: &Metadata) -> bool {
        self.guard.evaluate(metadata)
    }

    /// Dispatch `session` through this router.
    pub async fn dispatch(self: &Arc<Self>, session: &Session) -> DispatchOutcome {
        let metadata = session.metadata();

        if !self.guard.evaluate(&metadata) {
            let mismatched: Vec<&str> = self.guard.mismatches(&metadata).collect();
            if !self.reject_on_guard {
                tracing::debug!(
                    session_id = %session.id(),
                    router = %self.name,
                    mismatched = ?mismatched,
                    "Guard not satisfied, declining session"
                );
                return DispatchOutcome::GuardDeclined;
            }

            tracing::info!(
                session_id = %session.id(),
                router = %self.name,
                mismatched = ?mismatched,
                code = self.reject_code,
                "Guard not satisfied, rejecting session"
            );
            if let Err(e) = session.respond(self.reject_code) {
                tracing::warn!(session_id = %session.id(), error = %e, "Failed to send rejection");
            }
            metrics::record_guard_rejection(&self.name);
            return DispatchOutcome::GuardRejected;
        }

        let mut report = DispatchReport::default();
        for (route, matched) in self.table.iter_matches(&metadata) {
            tracing::debug!(
                session_id = %session.id(),
                router = %self.name,
                route = %route.name(),
                value = %matched.value,
                "Invoking route handler"
            );
            report.invoked.push(route.name().to_string());

            let result = invoke(route.handler(), session, self, matched).await;
            match result {
                Ok(Flow::Continue) => {
                    metrics::record_handler(route.name(), "continue");
                }
                Ok(Flow::StopRouting) => {
                    metrics::record_handler(route.name(), "stop");
                    tracing::debug!(
                        session_id = %session.id(),
                        router = %self.name,
                        route = %route.name(),
                        "StopRouting, skipping remaining routes"
                    );
                    report.halt = Halt::Stopped {
                        route: route.name().to_string(),
                    };
                    break;
                }
                Err(error) => {
                    metrics::record_handler(route.name(), "error");
                    tracing::error!(
                        session_id = %session.id(),
                        router = %self.name,
                        route = %route.name(),
                        error = %error,
                        "Route handler failed"
                    );
                    report.halt = Halt::Failed {
                        route: route.name().to_string(),
                        error,
                    };
                    break;
                }
            }
        }

        if report.invoked.is_empty() {
            tracing::debug!(session_id = %session.id(), router = %self.name, "No routes matched");
        }
        DispatchOutcome::Handled(report)
    }
}

/// Run one handler, turning a panic into a handler failure.
async fn invoke(
    handler: &Arc<dyn Handler>,
    session: &Session,
    router: &Arc<Router>,
    matched: RouteMatch,
) -> HandlerResult {
    let call = std::panic::catch_unwind(AssertUnwindSafe(|| {
        handler.call(session.clone(), Arc::clone(router), matched)
    }));
    let future = match call {
        Ok(future) => future,
        Err(panic) => return Err(HandlerError::Panicked(panic_message(panic.as_ref()))),
    };
    AssertUnwindSafe(future)
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(HandlerError::Panicked(panic_message(panic.as_ref()))))
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Registers one route on a router.
pub struct RouteBuilder<'r> {
    router: &'r mut Router,
    pattern: String,
    field: Option<String>,
    name: Option<String>,
}

impl<'r> RouteBuilder<'r> {
    /// Metadata field to match against instead of the router default.
    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Bind `handler`. The handler is handed back so it can be bound again
    /// elsewhere.
    pub fn to<H: Handler + 'static>(self, handler: H) -> Result<Arc<H>, RouteError> {
        let handler = Arc::new(handler);
        self.to_shared(handler.clone())?;
        Ok(handler)
    }

    /// Bind an async closure.
    pub fn to_fn<F, Fut>(self, f: F) -> Result<Arc<FnHandler<F>>, RouteError>
    where
        F: Fn(Session, Arc<Router>, RouteMatch) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.to(handler_fn(f))
    }

    /// Bind a handler that is already shared with other routes.
    pub fn to_shared(self, handler: Arc<dyn Handler>) -> Result<Arc<dyn Handler>, RouteError> {
        let field = self
            .field
            .unwrap_or_else(|| self.router.default_field.clone());
        let route = self
            .router
            .table
            .register(self.name, &self.pattern, &field, handler.clone())?;
        tracing::debug!(
            router = %self.router.name,
            route = %route.name(),
            pattern = %self.pattern,
            field = %field,
            "Route registered"
        );
        Ok(handler)
    }
}
