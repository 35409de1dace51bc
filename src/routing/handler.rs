//! Route handlers and the StopRouting signal.
//!
//! A handler is an async function of `(session, router, match)`. It finishes
//! with a [`Flow`] telling the dispatch loop whether to continue with the next
//! matched route, or with a [`HandlerError`] that aborts the remaining routes
//! for that session.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use thiserror::Error;

use crate::routing::matcher::RouteMatch;
use crate::routing::router::Router;
use crate::session::{Session, SessionError};

/// Control flow returned by a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Flow {
    /// Run the next matched route.
    #[default]
    Continue,
    /// Skip the remaining routes of this dispatch. This is not a failure.
    StopRouting,
}

/// A handler failure. Stops the remaining routes for the session.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("{0}")]
    Failed(String),

    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    pub fn failed(msg: impl Into<String>) -> Self {
        HandlerError::Failed(msg.into())
    }
}

pub type HandlerResult = Result<Flow, HandlerError>;
pub type HandlerFuture = BoxFuture<'static, HandlerResult>;

/// Something that can be bound to a route.
pub trait Handler: Send + Sync {
    fn call(&self, session: Session, router: Arc<Router>, matched: RouteMatch) -> HandlerFuture;
}

/// Adapts an async closure into a [`Handler`].
#[derive(Clone)]
pub struct FnHandler<F> {
    f: F,
}

/// Wrap `f` as a handler. The explicit bounds let closure arguments be
/// inferred at the call site.
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Session, Arc<Router>, RouteMatch) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    FnHandler { f }
}

impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Session, Arc<Router>, RouteMatch) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, session: Session, router: Arc<Router>, matched: RouteMatch) -> HandlerFuture {
        Box::pin((self.f)(session, router, matched))
    }
}

impl<F> std::fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FnHandler")
    }
}

impl std::fmt::Debug for dyn Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Handler")
    }
}
