//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_connections_total` (counter): accepted connections by listener
//! - `proxy_active_connections` (gauge): current connection count
//! - `proxy_requests_total` (counter): proxied requests by backend and affinity
//! - `proxy_request_errors_total` (counter): aborted connections by error kind
//! - `proxy_relayed_bytes_total` (counter): response body bytes sent to clients
//!
//! Recording is a no-op until [`init_metrics`] installs the exporter.

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_connection(listener: &'static str) {
    counter!("proxy_connections_total", "listener" => listener).increment(1);
}

pub fn set_active_connections(active: u64) {
    gauge!("proxy_active_connections").set(active as f64);
}

/// Record one completed exchange.
pub fn record_request(backend: &str, sticky: bool, response_bytes: u64) {
    let affinity = if sticky { "sticky" } else { "assigned" };
    counter!(
        "proxy_requests_total",
        "backend" => backend.to_string(),
        "affinity" => affinity
    )
    .increment(1);
    counter!("proxy_relayed_bytes_total").increment(response_bytes);
}

pub fn record_error(kind: &'static str) {
    counter!("proxy_request_errors_total", "kind" => kind).increment(1);
}
