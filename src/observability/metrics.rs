//! Metrics collection and exposition.
//!
//! # Metrics
//! - `remote_mux_requests_total` (counter): requests by method, status
//! - `remote_mux_request_duration_seconds` (histogram): latency distribution
//! - `remote_mux_remote_calls_total` (counter): RPC calls by function, status
//! - `remote_mux_remote_call_duration_seconds` (histogram): RPC latency
//! - `remote_mux_sse_subscribers` (gauge): open event streams
//! - `remote_mux_sse_events_total` (counter): notifications broadcast
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - The Prometheus exporter is optional and owns its own listener

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(err) => tracing::error!(address = %addr, error = %err, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "remote_mux_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("remote_mux_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_remote_call(function: &str, status: u16, start: Instant) {
    counter!(
        "remote_mux_remote_calls_total",
        "function" => function.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("remote_mux_remote_call_duration_seconds", "function" => function.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_sse_subscribers(count: usize) {
    gauge!("remote_mux_sse_subscribers").set(count as f64);
}

pub fn record_sse_event() {
    counter!("remote_mux_sse_events_total").increment(1);
}
