//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define routing metrics (sessions, rejections, handler outcomes)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `call_router_sessions_total` (counter): sessions by app, outcome
//! - `call_router_session_duration_seconds` (histogram): dispatch task lifetime
//! - `call_router_guard_rejections_total` (counter): rejections by router
//! - `call_router_handler_invocations_total` (counter): handler runs by route, result
//! - `call_router_active_sessions` (gauge): sessions currently tracked
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   exporter every call is a no-op
//! - Labels are bounded by configuration (app, router and route names)

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_session(app_id: &str, outcome: &'static str, start: Instant) {
    counter!(
        "call_router_sessions_total",
        "app" => app_id.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    histogram!("call_router_session_duration_seconds", "app" => app_id.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_guard_rejection(router: &str) {
    counter!("call_router_guard_rejections_total", "router" => router.to_string()).increment(1);
}

pub fn record_handler(route: &str, result: &'static str) {
    counter!(
        "call_router_handler_invocations_total",
        "route" => route.to_string(),
        "result" => result
    )
    .increment(1);
}

pub fn record_active_sessions(count: usize) {
    gauge!("call_router_active_sessions").set(count as f64);
}
