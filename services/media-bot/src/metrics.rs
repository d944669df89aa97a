//! Prometheus metrics exposition
//!
//! The library crates record through the `metrics` facade; this module
//! installs the exporter and adds the ingress counter:
//!
//! - `media_bot_messages_total` (counter): label `outcome`
//!   (`accepted`, `no_urls`, `unavailable`)
//! - `media_request_duration_seconds` (histogram, recorded by the pipeline)

use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

use crate::error::{Error, Result};

/// Per-URL processing spans page loads, retries and uploads, so buckets run
/// from 100ms to 10 minutes.
const DURATION_BUCKETS: &[f64] = &[
    0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0,
];

fn builder() -> Result<PrometheusBuilder> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("media_request_duration_seconds".to_string()),
            DURATION_BUCKETS,
        )
        .map_err(|e| Error::Metrics(e.to_string()))
}

/// Install the global Prometheus recorder and return a handle for `/metrics`.
pub fn install_recorder() -> Result<PrometheusHandle> {
    builder()?
        .install_recorder()
        .map_err(|e| Error::Metrics(e.to_string()))
}

/// Record one inbound message with its ingress outcome.
pub fn record_message(outcome: &'static str) {
    metrics::counter!("media_bot_messages_total", "outcome" => outcome).increment(1);
}
