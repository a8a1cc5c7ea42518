//! Router configuration.

use crate::handlers::health::{health_check, metrics, readiness_check};
use crate::handlers::requests;
use crate::middleware::correlation_id_layer;
use crate::state::AppState;
use axum::{
    Router,
    routing::{get, patch},
};
use tower_http::trace::TraceLayer;

/// Build the complete Axum router.
///
/// Every route runs inside the correlation ID span, with request and
/// response traces from `tower-http`.
pub fn build_router(state: AppState) -> Router {
    let request_routes = Router::new()
        .route(
            "/users/:user_id/requests",
            get(requests::list_own_requests).post(requests::create_request),
        )
        .route(
            "/users/:user_id/requests/:request_id/cancel",
            patch(requests::cancel_request),
        )
        .route(
            "/users/:user_id/events/:event_id/requests",
            get(requests::list_event_requests).patch(requests::resolve_requests),
        );

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics))
        .merge(request_routes)
        .layer(TraceLayer::new_for_http())
        .layer(correlation_id_layer())
        .with_state(state)
}
