//! Prometheus metrics for admission operations.
//!
//! Recording goes through the `metrics` facade, so it is a no-op until a
//! recorder is installed. The server binary installs the Prometheus recorder
//! with [`install_recorder`] and serves [`PrometheusHandle::render`] at
//! `/metrics`.
//!
//! # Example
//!
//! ```rust,no_run
//! use admission_runtime::metrics::install_recorder;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let handle = install_recorder()?;
//! println!("{}", handle.render());
//! # Ok(())
//! # }
//! ```

use admission_core::BatchTarget;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use thiserror::Error;

/// Requests persisted by `create_request`, labelled by initial `status`
pub const REQUESTS_CREATED: &str = "admission_requests_created_total";
/// Requests moved to CANCELED
pub const REQUESTS_CANCELED: &str = "admission_requests_canceled_total";
/// Batch resolutions committed, labelled by `target`
pub const BATCH_RESOLVED: &str = "admission_batch_resolved_total";
/// Requests confirmed by batch resolution
pub const REQUESTS_CONFIRMED: &str = "admission_requests_confirmed_total";
/// Requests rejected by batch resolution, cascade included
pub const REQUESTS_REJECTED: &str = "admission_requests_rejected_total";
/// Requests rejected because the event filled up
pub const CASCADE_REJECTIONS: &str = "admission_cascade_rejections_total";
/// Store conflicts observed, labelled by `operation`
pub const CONFLICTS: &str = "admission_conflicts_total";
/// Operations refused by a business rule
pub const RULE_VIOLATIONS: &str = "admission_rule_violations_total";
/// Wall time of `resolve_batch`, retries included
pub const BATCH_DURATION: &str = "admission_batch_duration_seconds";

/// Errors from metrics setup.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Install the global Prometheus recorder and describe every admission metric.
///
/// # Errors
///
/// Returns [`MetricsError::Install`] if a recorder is already installed.
pub fn install_recorder() -> Result<PrometheusHandle, MetricsError> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5],
        )
        .map_err(|e| MetricsError::Build(e.to_string()))?
        .install_recorder()
        .map_err(|e| MetricsError::Install(e.to_string()))?;

    describe_metrics();
    tracing::info!("Prometheus recorder installed");
    Ok(handle)
}

fn describe_metrics() {
    describe_counter!(REQUESTS_CREATED, "Participation requests created");
    describe_counter!(REQUESTS_CANCELED, "Participation requests canceled");
    describe_counter!(BATCH_RESOLVED, "Batch resolutions committed");
    describe_counter!(REQUESTS_CONFIRMED, "Requests confirmed by batch resolution");
    describe_counter!(
        REQUESTS_REJECTED,
        "Requests rejected by batch resolution, cascade included"
    );
    describe_counter!(
        CASCADE_REJECTIONS,
        "Pending requests rejected because their event filled up"
    );
    describe_counter!(CONFLICTS, "Concurrent modifications detected by the store");
    describe_counter!(RULE_VIOLATIONS, "Operations refused by a business rule");
    describe_histogram!(BATCH_DURATION, "Time taken to resolve a batch");
}

/// Admission metrics recorder.
pub struct AdmissionMetrics;

impl AdmissionMetrics {
    /// Record a created request.
    pub fn record_created(status: &'static str) {
        counter!(REQUESTS_CREATED, "status" => status).increment(1);
    }

    /// Record a cancellation that changed a row.
    pub fn record_canceled() {
        counter!(REQUESTS_CANCELED).increment(1);
    }

    /// Record a committed batch.
    pub fn record_batch(target: BatchTarget, confirmed: usize, rejected: usize, cascade: usize) {
        counter!(BATCH_RESOLVED, "target" => target.as_str()).increment(1);
        counter!(REQUESTS_CONFIRMED).increment(confirmed as u64);
        counter!(REQUESTS_REJECTED).increment(rejected as u64);
        counter!(CASCADE_REJECTIONS).increment(cascade as u64);
    }

    /// Record the duration of a batch resolution.
    pub fn record_batch_duration(duration: Duration) {
        histogram!(BATCH_DURATION).record(duration.as_secs_f64());
    }

    /// Record a store conflict.
    pub fn record_conflict(operation: &'static str) {
        counter!(CONFLICTS, "operation" => operation).increment(1);
    }

    /// Record a business rule refusal.
    pub fn record_rule_violation() {
        counter!(RULE_VIOLATIONS).increment(1);
    }
}
