//! Metrics collection and exposition.
//!
//! # Metrics
//! - `edge_requests_total` (counter): requests by listener, route, status
//! - `edge_upstream_failures_total` (counter): failed attempts by pool, endpoint, kind
//! - `edge_endpoint_available` (gauge): 1 = in rotation, 0 = marked failed
//!
//! Without an installed recorder every call here is a no-op.

use std::net::SocketAddr;

use metrics::{counter, describe_counter, describe_gauge, gauge, Unit};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

pub const EDGE_REQUESTS_TOTAL: &str = "edge_requests_total";
pub const EDGE_UPSTREAM_FAILURES_TOTAL: &str = "edge_upstream_failures_total";
pub const EDGE_ENDPOINT_AVAILABLE: &str = "edge_endpoint_available";

/// Install the Prometheus recorder and its scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    describe_metrics();
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

fn describe_metrics() {
    describe_counter!(
        EDGE_REQUESTS_TOTAL,
        Unit::Count,
        "Requests answered by the edge proxy."
    );
    describe_counter!(
        EDGE_UPSTREAM_FAILURES_TOTAL,
        Unit::Count,
        "Upstream attempts that produced no response."
    );
    describe_gauge!(
        EDGE_ENDPOINT_AVAILABLE,
        "Whether an upstream endpoint is in rotation (1) or marked failed (0)."
    );
}

/// Count an answered request.
pub fn record_request(listener: &str, route: &str, status: u16) {
    counter!(
        EDGE_REQUESTS_TOTAL,
        "listener" => listener.to_string(),
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Count a failed upstream attempt.
pub fn record_upstream_failure(pool: &str, endpoint: &str, connect: bool) {
    let kind = if connect { "connect" } else { "request" };
    counter!(
        EDGE_UPSTREAM_FAILURES_TOTAL,
        "pool" => pool.to_string(),
        "endpoint" => endpoint.to_string(),
        "kind" => kind
    )
    .increment(1);
}

pub fn record_endpoint_available(pool: &str, endpoint: &str, available: bool) {
    gauge!(
        EDGE_ENDPOINT_AVAILABLE,
        "pool" => pool.to_string(),
        "endpoint" => endpoint.to_string()
    )
    .set(if available { 1.0 } else { 0.0 });
}
