//! Participation request endpoints.
//!
//! The acting user travels in the path:
//! - POST  /users/:user_id/requests?eventId=:event_id - Request to join an event
//! - GET   /users/:user_id/requests - Requests submitted by the user
//! - PATCH /users/:user_id/requests/:request_id/cancel - Cancel an own request
//! - GET   /users/:user_id/events/:event_id/requests - Requests for an owned event
//! - PATCH /users/:user_id/events/:event_id/requests - Resolve pending requests

use crate::error::AppError;
use crate::state::AppState;
use admission_core::{
    BatchOutcome, BatchTarget, EventId, ParticipationRequest, RequestId, RequestStatus, UserId,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for creating a request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequestQuery {
    /// Event to join
    pub event_id: i64,
}

/// Body of a batch resolution.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveBatchRequest {
    /// Pending requests to resolve
    #[serde(default)]
    pub request_ids: Vec<i64>,
    /// `CONFIRMED` or `REJECTED`
    pub status: String,
}

/// Requests whose status a batch resolution changed.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveBatchResponse {
    /// Requests now CONFIRMED
    pub confirmed_requests: Vec<ParticipationRequest>,
    /// Requests now REJECTED, cascade rejections included
    pub rejected_requests: Vec<ParticipationRequest>,
}

impl From<BatchOutcome> for ResolveBatchResponse {
    fn from(outcome: BatchOutcome) -> Self {
        Self {
            confirmed_requests: outcome.confirmed,
            rejected_requests: outcome.rejected,
        }
    }
}

impl ResolveBatchRequest {
    fn target(&self) -> Result<BatchTarget, AppError> {
        RequestStatus::parse(&self.status)
            .and_then(|status| BatchTarget::try_from(status).ok())
            .ok_or_else(|| {
                AppError::bad_request(format!(
                    "Status must be CONFIRMED or REJECTED, got {:?}",
                    self.status
                ))
            })
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Request to join an event.
///
/// Responds 201 with the stored request, CONFIRMED or PENDING.
///
/// ```bash
/// curl -X POST 'http://localhost:8080/users/2/requests?eventId=7'
/// ```
///
/// # Errors
///
/// 404 for an unknown user or event, 409 for a rule violation.
pub async fn create_request(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(query): Query<CreateRequestQuery>,
) -> Result<(StatusCode, Json<ParticipationRequest>), AppError> {
    let request = state
        .controller
        .create_request(UserId::new(user_id), EventId::new(query.event_id))
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

/// Requests submitted by the user, newest first.
///
/// # Errors
///
/// 404 for an unknown user.
pub async fn list_own_requests(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<Vec<ParticipationRequest>>, AppError> {
    let requests = state
        .controller
        .list_requests_for_requester(UserId::new(user_id))
        .await?;
    Ok(Json(requests))
}

/// Cancel one of the user's requests.
///
/// # Errors
///
/// 404 for an unknown user, or a request that does not exist or is not
/// the user's.
pub async fn cancel_request(
    State(state): State<AppState>,
    Path((user_id, request_id)): Path<(i64, i64)>,
) -> Result<Json<ParticipationRequest>, AppError> {
    let request = state
        .controller
        .cancel_request(UserId::new(user_id), RequestId::new(request_id))
        .await?;
    Ok(Json(request))
}

/// Requests for an event the user owns, newest first.
///
/// # Errors
///
/// 404 for an unknown user, or an event that does not exist or is not owned
/// by the user.
pub async fn list_event_requests(
    State(state): State<AppState>,
    Path((user_id, event_id)): Path<(i64, i64)>,
) -> Result<Json<Vec<ParticipationRequest>>, AppError> {
    let requests = state
        .controller
        .list_requests_for_event_owner(UserId::new(user_id), EventId::new(event_id))
        .await?;
    Ok(Json(requests))
}

/// Confirm or reject pending requests of an owned event.
///
/// ```bash
/// curl -X PATCH http://localhost:8080/users/1/events/7/requests \
///   -H "Content-Type: application/json" \
///   -d '{"requestIds": [3, 4], "status": "CONFIRMED"}'
/// ```
///
/// # Errors
///
/// 400 for a status other than CONFIRMED or REJECTED, 404 for unknown ids,
/// 409 when a request is not pending or the event is not moderated.
pub async fn resolve_requests(
    State(state): State<AppState>,
    Path((user_id, event_id)): Path<(i64, i64)>,
    Json(body): Json<ResolveBatchRequest>,
) -> Result<Json<ResolveBatchResponse>, AppError> {
    let target = body.target()?;
    let ids: Vec<RequestId> = body.request_ids.iter().copied().map(RequestId::new).collect();

    let outcome = state
        .controller
        .resolve_batch(UserId::new(user_id), EventId::new(event_id), &ids, target)
        .await?;
    Ok(Json(outcome.into()))
}
