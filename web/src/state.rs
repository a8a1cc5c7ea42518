//! Application state shared across handlers.

use crate::handlers::health::ReadinessCheck;
use admission_runtime::AdmissionController;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Application state shared across all HTTP handlers.
///
/// Cloned for each request; every field is a cheap handle.
#[derive(Clone)]
pub struct AppState {
    /// Admission operations
    pub controller: AdmissionController,

    /// Dependency check behind `GET /ready`
    pub readiness: Arc<dyn ReadinessCheck>,

    /// Prometheus renderer behind `GET /metrics`, if a recorder is installed
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Create a new application state without a metrics renderer.
    #[must_use]
    pub fn new(controller: AdmissionController, readiness: Arc<dyn ReadinessCheck>) -> Self {
        Self {
            controller,
            readiness,
            metrics: None,
        }
    }

    /// Serve `handle` at `GET /metrics`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}
