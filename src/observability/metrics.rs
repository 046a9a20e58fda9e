//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gateway metrics (requests, latency, hedging, backend calls)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by endpoint, method, status
//! - `gateway_request_duration_seconds` (histogram): latency by endpoint
//! - `gateway_hedged_calls_total` (counter): hedged requests by result
//! - `gateway_backend_requests_total` (counter): backend calls by status
//!
//! # Design Decisions
//! - Labels are bounded: endpoint patterns, never raw paths

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

/// Record one handled request.
pub fn record_request(endpoint: &str, method: &str, status: u16, start: Instant) {
    counter!(
        "gateway_requests_total",
        "endpoint" => endpoint.to_string(),
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("gateway_request_duration_seconds", "endpoint" => endpoint.to_string())
        .record(start.elapsed().as_secs_f64());
}

/// Record how a hedged request ended: `success`, `failure` or `cancelled`.
pub fn record_hedged_call(result: &'static str) {
    counter!("gateway_hedged_calls_total", "result" => result).increment(1);
}

/// Record one backend response status.
pub fn record_backend_request(status: u16) {
    counter!("gateway_backend_requests_total", "status" => status.to_string()).increment(1);
}
