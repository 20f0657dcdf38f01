//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_requests_total` (counter): requests by method, status
//! - `relay_request_duration_seconds` (histogram): time to response head
//! - `relay_upstream_errors_total` (counter): relay failures by kind
//! - `relay_response_streams_total` (counter): body streams by outcome
//! - `relay_response_bytes_total` (counter): body bytes handed to callers
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    metrics::counter!(
        "relay_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("relay_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_upstream_error(kind: &'static str) {
    metrics::counter!("relay_upstream_errors_total", "kind" => kind).increment(1);
}

pub fn record_stream_outcome(outcome: &'static str, bytes: u64) {
    metrics::counter!("relay_response_streams_total", "outcome" => outcome).increment(1);
    metrics::counter!("relay_response_bytes_total").increment(bytes);
}
