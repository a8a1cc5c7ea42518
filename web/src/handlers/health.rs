//! Health check endpoints.
//!
//! These endpoints are used by load balancers and monitoring systems
//! to verify service health.

use crate::error::AppError;
use crate::state::AppState;
use admission_core::StoreResult;
use admission_postgres::PostgresRequestStore;
use async_trait::async_trait;
use axum::{extract::State, http::StatusCode};

/// Something that must answer before the service takes traffic.
#[async_trait]
pub trait ReadinessCheck: Send + Sync {
    /// Succeeds when the dependency is reachable.
    async fn check(&self) -> StoreResult<()>;
}

#[async_trait]
impl ReadinessCheck for PostgresRequestStore {
    async fn check(&self) -> StoreResult<()> {
        self.ping().await
    }
}

/// Liveness check.
///
/// ```text
/// GET /health
/// 200 ok
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Readiness check: 200 when the database answers, 503 otherwise.
///
/// ```text
/// GET /ready
/// ```
///
/// # Errors
///
/// Returns `SERVICE_UNAVAILABLE` when the readiness check fails.
pub async fn readiness_check(
    State(state): State<AppState>,
) -> Result<(StatusCode, &'static str), AppError> {
    state.readiness.check().await.map_err(|e| {
        tracing::warn!(error = %e, "Readiness check failed");
        AppError::unavailable("Database is not reachable")
    })?;
    Ok((StatusCode::OK, "ready"))
}

/// Prometheus text exposition.
///
/// ```text
/// GET /metrics
/// ```
///
/// # Errors
///
/// Returns `NOT_FOUND` when no recorder was installed.
#[allow(clippy::unused_async)]
pub async fn metrics(State(state): State<AppState>) -> Result<String, AppError> {
    state
        .metrics
        .as_ref()
        .map(metrics_exporter_prometheus::PrometheusHandle::render)
        .ok_or_else(|| AppError::not_found("Metrics are not enabled"))
}
