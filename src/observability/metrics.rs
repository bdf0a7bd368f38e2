//! Metrics collection and exposition.
//!
//! # Metrics
//! - `rpc_fetch_total` (counter): completed fetches by chain, agreement
//! - `rpc_fetch_failures_total` (counter): fetches where every worker failed
//! - `rpc_fetch_duration_seconds` (histogram): fetch latency by chain
//! - `pool_slot_restarts_total` (counter): slot restarts by pool
//! - `pool_stale_retries_total` (counter): superseded pool constructions retried
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; nothing is recorded
//!   until a recorder is installed
//! - The Prometheus exporter runs its own HTTP listener

use std::net::SocketAddr;
use std::time::Instant;

use ::metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Installs the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_fetch(chain: &str, agreement: &'static str, start: Instant) {
    counter!("rpc_fetch_total", "chain" => chain.to_string(), "agreement" => agreement).increment(1);
    histogram!("rpc_fetch_duration_seconds", "chain" => chain.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_fetch_failure(chain: &str, start: Instant) {
    counter!("rpc_fetch_failures_total", "chain" => chain.to_string()).increment(1);
    histogram!("rpc_fetch_duration_seconds", "chain" => chain.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_slot_restart(pool: &str) {
    counter!("pool_slot_restarts_total", "pool" => pool.to_string()).increment(1);
}

pub fn record_stale_retry() {
    counter!("pool_stale_retries_total").increment(1);
}
