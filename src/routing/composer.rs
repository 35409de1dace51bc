//! Multi-router composition.
//!
//! # Responsibilities
//! - Hold the ordered router chain of each application
//! - Pick the application a session belongs to
//! - Scan the chain with first-acceptor-wins precedence
//!
//! # Design Decisions
//! - Precedence is list order; reordering the list changes ownership
//! - A rejecting router ends the scan, a declining one passes the session on
//! - A session no router accepts is left unhandled, never an error
//! - StopRouting is confined to the router that produced it; it never
//!   affects the scan because only one router handles a session anyway

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;

use crate::routing::matcher::RouteMatch;
use crate::routing::router::{DispatchOutcome, DispatchReport, Router};
use crate::session::{Metadata, Session};

/// Application id used when a session does not name one.
pub const DEFAULT_APP: &str = "default";

/// Outcome of composing routers over one session.
#[derive(Debug)]
pub enum ComposeOutcome {
    /// A router accepted the session and ran its matched handlers.
    Handled {
        app_id: String,
        router: String,
        report: DispatchReport,
    },
    /// A router's guard rejected the session.
    Rejected { app_id: String, router: String },
    /// No router accepted the session.
    Unhandled { app_id: String },
}

impl ComposeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComposeOutcome::Handled { .. } => "handled",
            ComposeOutcome::Rejected { .. } => "rejected",
            ComposeOutcome::Unhandled { .. } => "unhandled",
        }
    }

    pub fn app_id(&self) -> &str {
        match self {
            ComposeOutcome::Handled { app_id, .. }
            | ComposeOutcome::Rejected { app_id, .. }
            | ComposeOutcome::Unhandled { app_id } => app_id,
        }
    }
}

/// Side-effect free preview of how a session would be dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub app_id: String,
    /// Routers whose guards were evaluated, in order.
    pub consulted: Vec<String>,
    #[serde(flatten)]
    pub decision: PlanDecision,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum PlanDecision {
    /// Routes listed would run in order, unless a handler stops routing.
    Handled {
        router: String,
        routes: Vec<PlannedRoute>,
    },
    Rejected {
        router: String,
        code: u16,
    },
    Unhandled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedRoute {
    pub index: usize,
    pub name: String,
    pub field: String,
    pub value: String,
    pub groups: Vec<Option<String>>,
}

impl PlannedRoute {
    fn new(name: &str, matched: RouteMatch) -> Self {
        Self {
            index: matched.index,
            name: name.to_string(),
            groups: matched.groups().to_vec(),
            field: matched.field,
            value: matched.value,
        }
    }
}

/// Ordered router chains keyed by application id.
#[derive(Debug, Clone)]
pub struct Composer {
    apps: BTreeMap<String, Vec<Arc<Router>>>,
    default_app: String,
    app_header: Option<String>,
}

impl Default for Composer {
    fn default() -> Self {
        Self::new()
    }
}

impl Composer {
    pub fn new() -> Self {
        Self {
            apps: BTreeMap::new(),
            default_app: DEFAULT_APP.to_string(),
            app_header: None,
        }
    }

    /// Sessions carrying this metadata key are routed to the app it names.
    pub fn with_app_header(mut self, header: impl Into<String>) -> Self {
        self.app_header = Some(header.into());
        self
    }

    pub fn with_default_app(mut self, app_id: impl Into<String>) -> Self {
        self.default_app = app_id.into();
        self
    }

    /// Load a single router as the app `app_id`.
    pub fn load_app(
        &mut self,
        router: impl Into<Arc<Router>>,
        app_id: impl Into<String>,
    ) -> Option<Vec<Arc<Router>>> {
        self.load_multi_app([router.into()], app_id)
    }

    /// Load routers as the app `app_id`, consulted in the given order.
    /// Replaces any previous chain for that id and returns it.
    pub fn load_multi_app<I>(&mut self, routers: I, app_id: impl Into<String>) -> Option<Vec<Arc<Router>>>
    where
        I: IntoIterator<Item = Arc<Router>>,
    {
        let app_id = app_id.into();
        let routers: Vec<Arc<Router>> = routers.into_iter().collect();
        tracing::info!(
            app_id = %app_id,
            routers = ?routers.iter().map(|r| r.name()).collect::<Vec<_>>(),
            "Loaded app"
        );
        self.apps.insert(app_id, routers)
    }

    pub fn unload(&mut self, app_id: &str) -> Option<Vec<Arc<Router>>> {
        self.apps.remove(app_id)
    }

    pub fn routers(&self, app_id: &str) -> Option<&[Arc<Router>]> {
        self.apps.get(app_id).map(Vec::as_slice)
    }

    pub fn app_ids(&self) -> impl Iterator<Item = &str> {
        self.apps.keys().map(String::as_str)
    }

    pub fn default_app(&self) -> &str {
        &self.default_app
    }

    /// Application id for a session: the app header if it names a loaded
    /// app, otherwise the default app.
    pub fn app_for<'a>(&'a self, metadata: &'a Metadata) -> &'a str {
        self.app_header
            .as_deref()
            .and_then(|header| metadata.get(header))
            .filter(|id| self.apps.contains_key(id.as_str()))
            .map(String::as_str)
            .unwrap_or(self.default_app.as_str())
    }

    /// Every event name subscribed by any loaded router.
    pub fn subscriptions(&self) -> BTreeSet<String> {
        self.apps
            .values()
            .flatten()
            .flat_map(|r| r.subscriptions().iter().cloned())
            .collect()
    }

    /// Event names subscribed by the routers of the app `metadata` selects.
    pub fn subscriptions_for(&self, metadata: &Metadata) -> BTreeSet<String> {
        self.apps
            .get(self.app_for(metadata))
            .into_iter()
            .flatten()
            .flat_map(|r| r.subscriptions().iter().cloned())
            .collect()
    }

    /// Scan the session's app chain and dispatch to the first acceptor.
    pub async fn dispatch(&self, session: &Session) -> ComposeOutcome {
        let metadata = session.metadata();
        let app_id = self.app_for(&metadata).to_string();

        let Some(routers) = self.apps.get(&app_id) else {
            tracing::warn!(session_id = %session.id(), app_id = %app_id, "No app loaded for session");
            return ComposeOutcome::Unhandled { app_id };
        };

        for router in routers {
            match router.dispatch(session).await {
                DispatchOutcome::GuardDeclined => continue,
                DispatchOutcome::GuardRejected => {
                    return ComposeOutcome::Rejected {
                        app_id,
                        router: router.name().to_string(),
                    };
                }
                DispatchOutcome::Handled(report) => {
                    return ComposeOutcome::Handled {
                        app_id,
                        router: router.name().to_string(),
                        report,
                    };
                }
            }
        }

        tracing::info!(session_id = %session.id(), app_id = %app_id, "No router accepted session");
        ComposeOutcome::Unhandled { app_id }
    }

    /// Preview dispatch for `metadata` without touching any session.
    pub fn plan(&self, metadata: &Metadata) -> Plan {
        let app_id = self.app_for(metadata).to_string();
        let mut consulted = Vec::new();

        for router in self.apps.get(&app_id).into_iter().flatten() {
            consulted.push(router.name().to_string());
            if router.accepts(metadata) {
                let routes = router
                    .iter_matches(metadata)
                    .map(|(route, matched)| PlannedRoute::new(route.name(), matched))
                    .collect();
                return Plan {
                    app_id,
                    consulted,
                    decision: PlanDecision::Handled {
                        router: router.name().to_string(),
                        routes,
                    },
                };
            }
            if router.reject_on_guard() {
                return Plan {
                    app_id,
                    consulted,
                    decision: PlanDecision::Rejected {
                        router: router.name().to_string(),
                        code: router.reject_code(),
                    },
                };
            }
        }

        Plan {
            app_id,
            consulted,
            decision: PlanDecision::Unhandled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::guard::Guard;
    use crate::routing::handler::Flow;
    use crate::session::{ChannelControl, Command, Outbound, SessionId};
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    fn session(pairs: &[(&str, &str)]) -> (Session, mpsc::UnboundedReceiver<Outbound>) {
        let (control, rx) = ChannelControl::new();
        let metadata = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        (Session::new(SessionId::generate(), "fs1", metadata, Arc::new(control), 16), rx)
    }

    fn marking_router(name: &str, guard: Guard, reject: bool, seen: &Arc<Mutex<Vec<String>>>) -> Arc<Router> {
        let mut router = Router::with_guard(name, guard);
        router.set_reject_on_guard(reject);
        let seen = seen.clone();
        let tag = name.to_string();
        router
            .route(".*")
            .to_fn(move |_s, _r, _m| {
                let seen = seen.clone();
                let tag = tag.clone();
                async move {
                    seen.lock().unwrap().push(tag);
                    Ok(Flow::Continue)
                }
            })
            .unwrap();
        Arc::new(router)
    }

    fn doggy() -> Guard {
        [("Caller-Direction", "doggy")].into_iter().collect()
    }

    #[tokio::test]
    async fn test_first_acceptor_wins() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let r1 = marking_router("r1", Guard::new(), true, &seen);
        let r2 = marking_router("r2", Guard::new(), true, &seen);

        let mut composer = Composer::new();
        composer.load_multi_app([r1, r2], DEFAULT_APP);

        let (sess, _rx) = session(&[("Caller-Direction", "inbound")]);
        let outcome = composer.dispatch(&sess).await;
        assert!(matches!(outcome, ComposeOutcome::Handled { ref router, .. } if router == "r1"));
        assert_eq!(*seen.lock().unwrap(), vec!["r1"]);
    }

    #[tokio::test]
    async fn test_rejecting_router_first_blocks_rest() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let r1 = marking_router("r1", Guard::new(), true, &seen);
        let r2 = marking_router("r2", doggy(), true, &seen);

        let mut composer = Composer::new();
        composer.load_multi_app([r2, r1], DEFAULT_APP);

        let (sess, mut rx) = session(&[("Caller-Direction", "inbound")]);
        let outcome = composer.dispatch(&sess).await;
        assert!(matches!(outcome, ComposeOutcome::Rejected { ref router, .. } if router == "r2"));
        assert_eq!(rx.recv().await.unwrap().command, Command::Respond { code: 403 });
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_declining_router_passes_on() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let r1 = marking_router("r1", Guard::new(), true, &seen);
        let r2 = marking_router("r2", doggy(), false, &seen);

        let mut composer = Composer::new();
        composer.load_multi_app([r2, r1], DEFAULT_APP);

        let (sess, mut rx) = session(&[("Caller-Direction", "inbound")]);
        let outcome = composer.dispatch(&sess).await;
        assert!(matches!(outcome, ComposeOutcome::Handled { ref router, .. } if router == "r1"));
        assert_eq!(*seen.lock().unwrap(), vec!["r1"]);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_all_declined_is_unhandled() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let r = marking_router("r", doggy(), false, &seen);
        let mut composer = Composer::new();
        composer.load_app(r, DEFAULT_APP);

        let (sess, _rx) = session(&[("Caller-Direction", "inbound")]);
        assert!(matches!(composer.dispatch(&sess).await, ComposeOutcome::Unhandled { .. }));
    }

    #[tokio::test]
    async fn test_app_header_selects_app() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut composer = Composer::new().with_app_header("variable_call_app");
        composer.load_app(marking_router("default-router", Guard::new(), true, &seen), DEFAULT_APP);
        composer.load_app(marking_router("ivr-router", Guard::new(), true, &seen), "ivr");

        let (sess, _rx) = session(&[("variable_call_app", "ivr")]);
        let outcome = composer.dispatch(&sess).await;
        assert_eq!(outcome.app_id(), "ivr");

        let (sess, _rx) = session(&[("variable_call_app", "missing")]);
        let outcome = composer.dispatch(&sess).await;
        assert_eq!(outcome.app_id(), DEFAULT_APP);
        assert_eq!(*seen.lock().unwrap(), vec!["ivr-router", "default-router"]);
    }

    #[test]
    fn test_plan_preview() {
        let mut inbound = Router::with_guard("inbound", [("Caller-Direction", "inbound")].into_iter().collect());
        inbound.route("bridge.*").name("bridge").to_fn(|_s, _r, _m| async { Ok(Flow::Continue) }).unwrap();
        inbound.route(".*hangup").name("hangup").to_fn(|_s, _r, _m| async { Ok(Flow::Continue) }).unwrap();
        let mut outbound = Router::with_guard("outbound", [("Caller-Direction", "outbound")].into_iter().collect());
        outbound.set_reject_code(480);

        let mut composer = Composer::new();
        composer.load_multi_app([Arc::new(inbound), Arc::new(outbound)], DEFAULT_APP);

        let md: Metadata = [
            ("Caller-Direction".to_string(), "inbound".to_string()),
            ("Caller-Destination-Number".to_string(), "bridge_hangup".to_string()),
        ]
        .into_iter()
        .collect();
        let plan = composer.plan(&md);
        assert_eq!(plan.consulted, vec!["inbound"]);
        match plan.decision {
            PlanDecision::Handled { router, routes } => {
                assert_eq!(router, "inbound");
                let names: Vec<_> = routes.iter().map(|r| r.name.as_str()).collect();
                assert_eq!(names, vec!["bridge", "hangup"]);
            }
            other => panic!("unexpected decision {:?}", other),
        }

        let md: Metadata = [("Caller-Direction".to_string(), "sideways".to_string())].into_iter().collect();
        let plan = composer.plan(&md);
        assert_eq!(plan.decision, PlanDecision::Rejected { router: "inbound".into(), code: 403 });
    }

    #[test]
    fn test_subscriptions_union() {
        let mut a = Router::new("a");
        a.subscribe(["PLAYBACK_START", "PLAYBACK_STOP"]);
        let mut b = Router::new("b");
        b.subscribe(["DTMF"]);
        let mut composer = Composer::new();
        composer.load_app(a, "one");
        composer.load_app(b, "two");

        let subs: Vec<_> = composer.subscriptions().into_iter().collect();
        assert_eq!(subs, vec!["DTMF", "PLAYBACK_START", "PLAYBACK_STOP"]);
    }

    #[test]
    fn test_subscriptions_for_selected_app() {
        let mut a = Router::new("a");
        a.subscribe(["PLAYBACK_STOP"]);
        let mut b = Router::new("b");
        b.subscribe(["DTMF"]);
        let mut composer = Composer::new().with_app_header("variable_call_app");
        composer.load_app(a, DEFAULT_APP);
        composer.load_app(b, "ivr");

        let md: Metadata = [("variable_call_app".to_string(), "ivr".to_string())].into_iter().collect();
        let subs: Vec<_> = composer.subscriptions_for(&md).into_iter().collect();
        assert_eq!(subs, vec!["DTMF"]);

        let subs: Vec<_> = composer.subscriptions_for(&Metadata::new()).into_iter().collect();
        assert_eq!(subs, vec!["PLAYBACK_STOP"]);
    }
}
