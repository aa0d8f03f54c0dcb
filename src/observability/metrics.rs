//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gateway metrics (requests, latency, live WebSocket sessions)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `authgate_requests_total` (counter): requests by method, status, outcome
//! - `authgate_request_duration_seconds` (histogram): latency distribution
//! - `authgate_websocket_sessions` (gauge): relays currently open
//!
//! # Design Decisions
//! - Low-overhead metric updates (atomic operations)
//! - `outcome` is a small closed set so label cardinality stays bounded

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// What the gateway did with a request, used as the `outcome` label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Relayed,
    Upgraded,
    Redirected,
    NotFound,
    Failed,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Relayed => "relayed",
            Outcome::Upgraded => "upgraded",
            Outcome::Redirected => "redirected",
            Outcome::NotFound => "not_found",
            Outcome::Failed => "failed",
        }
    }
}

/// Start the Prometheus HTTP listener. Failures are logged, not fatal.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to start metrics endpoint"),
    }
}

/// Count one catch-all request and observe its latency.
pub fn record_request(method: &str, status: u16, outcome: Outcome, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
        ("outcome", outcome.as_str().to_string()),
    ];
    metrics::counter!("authgate_requests_total", &labels).increment(1);
    metrics::histogram!("authgate_request_duration_seconds", "outcome" => outcome.as_str())
        .record(start.elapsed().as_secs_f64());
}

pub fn websocket_opened() {
    metrics::gauge!("authgate_websocket_sessions").increment(1.0);
}

pub fn websocket_closed() {
    metrics::gauge!("authgate_websocket_sessions").decrement(1.0);
}
