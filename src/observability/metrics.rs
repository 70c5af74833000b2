//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_cycles_total` (counter): finished cycles by outcome
//! - `proxy_cycle_duration_seconds` (histogram): accept-to-close latency
//! - `proxy_active_connections` (gauge): cycles currently in flight
//! - `proxy_blacklist_entries` (gauge): size of the blacklist in force
//!
//! Updates go through the `metrics` facade and are no-ops until
//! [`init_metrics`] installs the Prometheus recorder.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a finished cycle. `outcome` is a verdict or error label.
pub fn record_cycle(outcome: &'static str, started: Instant) {
    metrics::counter!("proxy_cycles_total", "outcome" => outcome).increment(1);
    metrics::histogram!("proxy_cycle_duration_seconds").record(started.elapsed().as_secs_f64());
}

pub fn record_active_connections(count: u64) {
    metrics::gauge!("proxy_active_connections").set(count as f64);
}

pub fn record_blacklist_size(entries: usize) {
    metrics::gauge!("proxy_blacklist_entries").set(entries as f64);
}
