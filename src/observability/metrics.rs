//! Metrics collection and exposition.
//!
//! # Metrics
//! - `stamp_proxy_requests_total` (counter): relayed requests by listener port, status
//! - `stamp_proxy_request_duration_seconds` (histogram): latency distribution
//! - `stamp_proxy_responses_stamped_total` (counter): stamped responses by listener port
//! - `stamp_proxy_audit_dropped_total` (counter): audit records dropped under backpressure
//! - `stamp_proxy_active_connections` (gauge): open connections by listener port
//!
//! Recording is a no-op until [`init_metrics`] installs the Prometheus exporter.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::stamp::ListenerPort;

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a completed request relayed through `port`.
pub fn record_request(port: ListenerPort, status: u16, start: Instant) {
    let port = port.to_string();
    counter!(
        "stamp_proxy_requests_total",
        "listener_port" => port.clone(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("stamp_proxy_request_duration_seconds", "listener_port" => port)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_stamp(port: ListenerPort) {
    counter!("stamp_proxy_responses_stamped_total", "listener_port" => port.to_string())
        .increment(1);
}

pub fn record_audit_dropped() {
    counter!("stamp_proxy_audit_dropped_total").increment(1);
}

pub fn set_active_connections(port: ListenerPort, count: u64) {
    gauge!("stamp_proxy_active_connections", "listener_port" => port.to_string()).set(count as f64);
}
