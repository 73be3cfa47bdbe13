//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by kind (`connect`/`forward`)
//!   and outcome
//! - `gateway_request_duration_seconds` (histogram): time to outcome by kind
//! - `gateway_candidate_failures_total` (counter): failed dials or round trips
//!   by candidate kind
//! - `gateway_reloads_total` (counter): reload ticks by result
//! - `gateway_active_tunnels` (gauge): tunnels currently relaying
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade and is a no-op until a
//!   recorder is installed, so tests never need one
//! - The Prometheus exporter is optional and listens on its own address

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder};

const REQUEST_DURATION: &str = "gateway_request_duration_seconds";

const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

/// Installs the global recorder and starts the scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(Matcher::Full(REQUEST_DURATION.to_string()), LATENCY_BUCKETS)?
        .install()?;

    tracing::info!(address = %addr, "Metrics endpoint started");
    Ok(())
}

/// Records the outcome of one proxied request.
pub fn record_request(kind: &'static str, outcome: &'static str, start: Instant) {
    counter!("gateway_requests_total", "kind" => kind, "outcome" => outcome).increment(1);
    histogram!(REQUEST_DURATION, "kind" => kind).record(start.elapsed().as_secs_f64());
}

pub fn record_candidate_failure(kind: &'static str) {
    counter!("gateway_candidate_failures_total", "kind" => kind).increment(1);
}

pub fn record_reload(result: &'static str) {
    counter!("gateway_reloads_total", "result" => result).increment(1);
}

pub fn tunnel_opened() {
    gauge!("gateway_active_tunnels").increment(1.0);
}

pub fn tunnel_closed() {
    gauge!("gateway_active_tunnels").decrement(1.0);
}
