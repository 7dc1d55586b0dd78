//! Metrics definitions for the Connectivity Broker.
//!
//! All metrics follow Prometheus naming conventions:
//! - `cb_` prefix for Connectivity Broker
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `operation`: bounded by code (whitelist_insert_or_get, session_delete, ...)
//! - `status`: 2 values (success, error)
//! - `kind`: 3 event variants

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize the Prometheus metrics recorder and return the handle for
/// serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns an error if the recorder fails to install (e.g., already
/// installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("cb_db_query".to_string()),
            &[
                0.001, 0.002, 0.005, 0.010, 0.020, 0.050, 0.100, 0.250, 0.500, 1.000,
            ],
        )
        .map_err(|e| format!("Failed to set DB query buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("cb_firewall_sync".to_string()),
            &[0.010, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000],
        )
        .map_err(|e| format!("Failed to set firewall sync buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

/// Record a database query.
///
/// Metrics: `cb_db_queries_total`, `cb_db_query_duration_seconds`
pub fn record_db_query(operation: &'static str, status: &'static str, duration: Duration) {
    counter!("cb_db_queries_total",
        "operation" => operation,
        "status" => status
    )
    .increment(1);

    histogram!("cb_db_query_duration_seconds",
        "operation" => operation
    )
    .record(duration.as_secs_f64());
}

/// Record one firewall sync worker run that reached the upstream.
///
/// Metrics: `cb_firewall_sync_runs_total`, `cb_firewall_sync_duration_seconds`
pub fn record_firewall_sync(status: &'static str, rule_count: usize, duration: Duration) {
    counter!("cb_firewall_sync_runs_total", "status" => status).increment(1);

    histogram!("cb_firewall_sync_duration_seconds", "status" => status)
        .record(duration.as_secs_f64());

    if status == "success" {
        counter!("cb_firewall_sync_rules_total").increment(rule_count as u64);
    }
}

/// Record a published signaling event.
///
/// Metric: `cb_events_published_total`
pub fn record_event_published(kind: &'static str) {
    counter!("cb_events_published_total", "kind" => kind).increment(1);
}

/// Record sessions removed by the expiry sweep.
///
/// Metric: `cb_sessions_expired_total`
pub fn record_sessions_expired(count: u64) {
    counter!("cb_sessions_expired_total").increment(count);
}
