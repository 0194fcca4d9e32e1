//! Metrics collection and exposition.
//!
//! # Metrics
//! - `guard_requests_total` (counter): responses by status code
//! - `guard_rejections_total` (counter): pipeline rejections by stage
//! - `guard_request_duration_seconds` (histogram): end-to-end latency
//!
//! # Design Decisions
//! - Low-overhead metric updates; no recorder installed means no-ops
//! - Prometheus exporter only when `observability.metrics_enabled`

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

pub fn record_request(status: u16, start: Instant) {
    counter!("guard_requests_total", "status" => status.to_string()).increment(1);
    histogram!("guard_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_rejection(stage: &'static str) {
    counter!("guard_rejections_total", "stage" => stage).increment(1);
}
