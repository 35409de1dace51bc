//! Turning validated configuration into live routers.
//!
//! Each `[[apps.routers]]` entry becomes one frozen [`Router`]; each route
//! binds an [`ActionList`]. Events awaited by `playback.until` or `wait`
//! actions are subscribed automatically so the session layer forwards them.

use std::sync::Arc;

use crate::config::schema::{RouterConfig, RoutingConfig};
use crate::routing::{Action, ActionList, Composer, Guard, RouteError, Router};

impl RouterConfig {
    /// Compile this definition into a router.
    pub fn build(&self) -> Result<Router, RouteError> {
        let guard: Guard = self.guards.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        let mut router = Router::with_guard(self.name.clone(), guard);
        router
            .set_reject_on_guard(self.reject_on_guard)
            .set_reject_code(self.reject_code)
            .set_default_field(self.default_field.clone())
            .subscribe(self.subscribe.iter().cloned());

        for route in &self.routes {
            let mut actions = route.actions.clone();
            if route.stop {
                actions.push(Action::Stop);
            }
            router.subscribe(actions.iter().filter_map(Action::awaited_event).map(str::to_string));

            let mut builder = router.route(route.pattern.as_str());
            if let Some(field) = &route.field {
                builder = builder.field(field.as_str());
            }
            if let Some(name) = &route.name {
                builder = builder.name(name.as_str());
            }
            builder.to(ActionList(actions))?;
        }
        Ok(router)
    }
}

impl RoutingConfig {
    /// Build a composer holding every configured app.
    pub fn build_composer(&self) -> Result<Composer, RouteError> {
        let mut composer = Composer::new().with_default_app(self.service.default_app.as_str());
        if let Some(header) = &self.service.app_header {
            composer = composer.with_app_header(header.as_str());
        }
        for app in &self.apps {
            let routers = app
                .routers
                .iter()
                .map(|r| r.build().map(Arc::new))
                .collect::<Result<Vec<_>, _>>()?;
            composer.load_multi_app(routers, app.id.as_str());
        }
        Ok(composer)
    }
}
