//! Session service.
//!
//! # Responsibilities
//! - Hold the active routing snapshot and swap it on reload
//! - Track live sessions by id
//! - Spawn one dispatch task per new session
//! - Forward connection-layer events to the owning session
//! - Terminate every session on shutdown
//!
//! # Design Decisions
//! - A session keeps the routing snapshot it was opened under, for dispatch
//!   and for event forwarding; reloads only affect sessions that arrive
//!   afterwards
//! - Events are forwarded only if built-in or subscribed by a router of the
//!   session's app
//! - A session leaves the registry when it hangs up or the connection layer
//!   reports it gone, whichever comes first

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};

use crate::config::RoutingConfig;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::routing::{ComposeOutcome, Composer, RouteError, Router};
use crate::service::ingress::InboundEvent;
use crate::session::{CallControl, Metadata, Session, SessionEvent, SessionId};

/// A registered session and the routing it was opened under.
#[derive(Debug, Clone)]
struct LiveSession {
    session: Session,
    composer: Arc<Composer>,
    subscriptions: Arc<BTreeSet<String>>,
}

/// Connects routing to the connection layer.
pub struct Service {
    composer: ArcSwap<Composer>,
    sessions: DashMap<SessionId, LiveSession>,
    control: Arc<dyn CallControl>,
    backlog: usize,
}

impl Service {
    pub fn new(composer: Composer, control: Arc<dyn CallControl>, backlog: usize) -> Self {
        Self {
            composer: ArcSwap::from_pointee(composer),
            sessions: DashMap::new(),
            control,
            backlog,
        }
    }

    /// Build a service from configuration.
    pub fn from_config(config: &RoutingConfig, control: Arc<dyn CallControl>) -> Result<Self, RouteError> {
        Ok(Self::new(config.build_composer()?, control, config.service.event_backlog))
    }

    /// The composer new sessions are dispatched through.
    pub fn composer(&self) -> Arc<Composer> {
        self.composer.load_full()
    }

    /// Replace the routing snapshot for sessions that arrive from now on.
    pub fn replace_composer(&self, composer: Composer) {
        tracing::info!(
            apps = ?composer.app_ids().collect::<Vec<_>>(),
            subscriptions = ?composer.subscriptions(),
            "Routing snapshot replaced"
        );
        self.composer.store(Arc::new(composer));
    }

    /// Rebuild routing from a reloaded configuration.
    pub fn apply_config(&self, config: &RoutingConfig) -> Result<(), RouteError> {
        let composer = config.build_composer()?;
        if config.service.event_backlog != self.backlog {
            tracing::warn!(
                current = self.backlog,
                configured = config.service.event_backlog,
                "event_backlog changes take effect on restart"
            );
        }
        self.replace_composer(composer);
        Ok(())
    }

    /// Load a single router as `app_id` into the live snapshot.
    pub fn load_app(&self, router: impl Into<Arc<Router>>, app_id: impl Into<String>) {
        self.load_multi_app([router.into()], app_id);
    }

    /// Load routers as `app_id` into the live snapshot, replacing any
    /// previous chain for that id.
    pub fn load_multi_app<I>(&self, routers: I, app_id: impl Into<String>)
    where
        I: IntoIterator<Item = Arc<Router>>,
    {
        let routers: Vec<Arc<Router>> = routers.into_iter().collect();
        let app_id = app_id.into();
        self.composer.rcu(|current| {
            let mut composer = Composer::clone(current);
            composer.load_multi_app(routers.iter().cloned(), app_id.as_str());
            composer
        });
    }

    pub fn session(&self, id: &SessionId) -> Option<Session> {
        self.sessions.get(id).map(|live| live.session.clone())
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Register a new session. Returns `None` if the id is already live.
    pub fn open(&self, id: SessionId, host: String, headers: Metadata) -> Option<Session> {
        use dashmap::mapref::entry::Entry;

        let session = match self.sessions.entry(id.clone()) {
            Entry::Occupied(_) => {
                tracing::warn!(session_id = %id, "Duplicate session id, ignoring");
                return None;
            }
            Entry::Vacant(entry) => {
                let composer = self.composer();
                let subscriptions = Arc::new(composer.subscriptions_for(&headers));
                let session = Session::new(id, host, headers, self.control.clone(), self.backlog);
                entry.insert(LiveSession {
                    session: session.clone(),
                    composer,
                    subscriptions,
                });
                session
            }
        };
        tracing::debug!(session_id = %session.id(), host = %session.host(), "Session opened");
        metrics::record_active_sessions(self.sessions.len());
        Some(session)
    }

    /// Dispatch `session` through the snapshot it was opened under, or the
    /// current one if it is not registered. The returned future is ready to
    /// spawn.
    pub fn dispatch_session(
        self: &Arc<Self>,
        session: Session,
    ) -> impl Future<Output = ComposeOutcome> + Send + 'static {
        let composer = self
            .sessions
            .get(session.id())
            .map(|live| live.composer.clone())
            .unwrap_or_else(|| self.composer());
        let service = self.clone();
        async move {
            let start = Instant::now();
            let outcome = composer.dispatch(&session).await;
            service.finish(&session, &outcome, start);
            outcome
        }
    }

    fn finish(&self, session: &Session, outcome: &ComposeOutcome, start: Instant) {
        match outcome {
            ComposeOutcome::Handled { app_id, router, report } => tracing::info!(
                session_id = %session.id(),
                app_id = %app_id,
                router = %router,
                routes = ?report.invoked,
                halt = ?report.halt,
                "Session dispatched"
            ),
            ComposeOutcome::Rejected { app_id, router } => tracing::info!(
                session_id = %session.id(),
                app_id = %app_id,
                router = %router,
                "Session rejected"
            ),
            ComposeOutcome::Unhandled { app_id } => tracing::info!(
                session_id = %session.id(),
                app_id = %app_id,
                "Session declined by every router"
            ),
        }
        metrics::record_session(outcome.app_id(), outcome.as_str(), start);

        if session.is_hungup() {
            self.remove(session.id());
        }
    }

    /// Forward an event to its session. Returns true if it was delivered.
    pub fn deliver(&self, id: &SessionId, event: SessionEvent) -> bool {
        let Some(live) = self.sessions.get(id).map(|live| live.value().clone()) else {
            tracing::debug!(session_id = %id, event = %event.name, "Event for unknown session");
            return false;
        };
        let session = live.session;

        let subscribed =
            SessionEvent::is_builtin(&event.name) || live.subscriptions.contains(&event.name);
        if !subscribed {
            tracing::trace!(session_id = %id, event = %event.name, "Event not subscribed, dropping");
            return false;
        }

        session.deliver(event);
        if session.is_hungup() {
            self.remove(id);
        }
        true
    }

    /// The connection layer reports the call gone.
    pub fn close(&self, id: &SessionId) {
        if let Some(session) = self.remove(id) {
            session.terminate();
        }
    }

    fn remove(&self, id: &SessionId) -> Option<Session> {
        let removed = self.sessions.remove(id).map(|(_, live)| live.session);
        if removed.is_some() {
            tracing::debug!(session_id = %id, "Session removed");
            metrics::record_active_sessions(self.sessions.len());
        }
        removed
    }

    /// Terminate every live session.
    pub fn terminate_all(&self) {
        let ids: Vec<SessionId> = self.sessions.iter().map(|e| e.key().clone()).collect();
        tracing::info!(sessions = ids.len(), "Terminating live sessions");
        for id in ids {
            self.close(&id);
        }
    }

    /// Apply one inbound event, spawning a dispatch task for new sessions.
    pub fn handle(self: &Arc<Self>, event: InboundEvent) -> Option<JoinHandle<ComposeOutcome>> {
        match event {
            InboundEvent::NewSession { session_id, host, headers } => {
                let session = self.open(session_id, host, headers)?;
                Some(tokio::spawn(self.dispatch_session(session)))
            }
            other => {
                self.apply(other);
                None
            }
        }
    }

    fn apply(&self, event: InboundEvent) {
        match event {
            InboundEvent::Event { session_id, name, headers } => {
                self.deliver(&session_id, SessionEvent { name, headers });
            }
            InboundEvent::Gone { session_id } => self.close(&session_id),
            InboundEvent::NewSession { .. } => {}
        }
    }

    /// Consume connection-layer events until the stream ends or shutdown is
    /// triggered, then terminate live sessions and wait for their tasks.
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<InboundEvent>, shutdown: &Shutdown) {
        let mut shutdown_rx = shutdown.subscribe();
        let mut tasks = JoinSet::new();
        tracing::info!("Session service started");

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Shutdown requested, stopping intake");
                    break;
                }
                event = events.recv() => match event {
                    Some(InboundEvent::NewSession { session_id, host, headers }) => {
                        if let Some(session) = self.open(session_id, host, headers) {
                            tasks.spawn(self.dispatch_session(session));
                        }
                    }
                    Some(other) => self.apply(other),
                    None => {
                        tracing::info!("Event stream closed");
                        break;
                    }
                },
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "Session task failed");
                    }
                }
            }
        }

        self.terminate_all();
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Session task failed");
            }
        }
        tracing::info!("Session service stopped");
    }
}
