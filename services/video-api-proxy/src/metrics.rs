//! Prometheus metrics exposition
//!
//! Gateway metrics:
//!
//! - `gateway_requests_total` (counter): labels `status`, `endpoint` (the
//!   served endpoint, `other` for requests that were not served)
//! - `gateway_request_duration_seconds` (histogram): label `status`
//! - `gateway_dispatch_errors_total` (counter): label `kind`
//!
//! The key-pool crate emits `credential_exhaustions_total`,
//! `credential_pool_resets_total` and `upstream_attempts_total` through the
//! same global recorder.

use anyhow::Context;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

const DURATION_METRIC: &str = "gateway_request_duration_seconds";

/// 5ms to 60s, spanning the configurable per-attempt timeout range.
const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

fn builder() -> anyhow::Result<PrometheusBuilder> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(DURATION_METRIC.to_string()), DURATION_BUCKETS)
        .context("failed to set histogram buckets")
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// Request duration renders as a histogram (with `_bucket` lines for
/// `histogram_quantile()` queries) rather than the default summary.
pub fn install_recorder() -> anyhow::Result<PrometheusHandle> {
    builder()?
        .install_recorder()
        .context("failed to install Prometheus recorder")
}

/// Record a completed gateway request.
pub fn record_request(status: u16, endpoint: &str, duration_secs: f64) {
    let status_str = status.to_string();
    metrics::counter!(
        "gateway_requests_total",
        "status" => status_str.clone(),
        "endpoint" => endpoint.to_string()
    )
    .increment(1);
    metrics::histogram!(DURATION_METRIC, "status" => status_str).record(duration_secs);
}

/// Record a failed dispatch by error kind.
pub fn record_dispatch_error(kind: &'static str) {
    metrics::counter!("gateway_dispatch_errors_total", "kind" => kind).increment(1);
}
