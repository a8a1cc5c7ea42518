//! The admission controller.
//!
//! Every mutating operation follows the same shape:
//!
//! 1. Check that the acting user exists.
//! 2. Open the event's [`EventScope`], then load the event descriptor and the
//!    request rows under it. Nothing read after the lock can be changed by a
//!    concurrent admission on the same event.
//! 3. Ask [`admission_core::admission`] what should change.
//! 4. Apply the changes and commit, or drop the scope to roll back.
//!
//! The whole sequence runs inside [`retry_with_predicate`], which re-executes
//! it only when the store reports a conflict.

use crate::metrics::AdmissionMetrics;
use crate::retry::{RetryPolicy, retry_with_predicate};
use admission_core::admission::{
    check_moderation, decide_cancellation, decide_creation, dedup_ids, plan_batch, validate_batch,
};
use admission_core::environment::Clock;
use admission_core::{
    AdmissionError, BatchOutcome, BatchTarget, ErrorKind, EventDescriptor, EventDirectory,
    EventId, EventScope, NewRequest, ParticipationRequest, RequestId, RequestStatus, RequestStore,
    Result, RuleViolation, UserDirectory, UserId,
};
use std::sync::Arc;
use std::time::Instant;

/// Collaborators the controller depends on.
#[derive(Clone)]
pub struct AdmissionEnvironment {
    /// Source of request creation timestamps
    pub clock: Arc<dyn Clock>,
    /// Event metadata
    pub events: Arc<dyn EventDirectory>,
    /// User existence
    pub users: Arc<dyn UserDirectory>,
    /// Participation requests
    pub requests: Arc<dyn RequestStore>,
}

impl AdmissionEnvironment {
    /// Creates a new admission environment
    pub fn new(
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventDirectory>,
        users: Arc<dyn UserDirectory>,
        requests: Arc<dyn RequestStore>,
    ) -> Self {
        Self {
            clock,
            events,
            users,
            requests,
        }
    }
}

/// Admission control for capacity-limited events.
///
/// Cheap to clone; clones share the environment.
#[derive(Clone)]
pub struct AdmissionController {
    env: AdmissionEnvironment,
    retry: RetryPolicy,
}

impl AdmissionController {
    /// Create a controller with the default conflict retry policy
    #[must_use]
    pub fn new(env: AdmissionEnvironment) -> Self {
        Self {
            env,
            retry: RetryPolicy::default(),
        }
    }

    /// Replace the conflict retry policy
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The conflict retry policy in use
    #[must_use]
    pub const fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Submit a request by `requester_id` to join `event_id`.
    ///
    /// The request starts CONFIRMED when the event skips moderation or has no
    /// limit, PENDING otherwise.
    ///
    /// # Errors
    ///
    /// - [`AdmissionError::UserNotFound`] / [`AdmissionError::EventNotFound`]
    /// - [`AdmissionError::Rule`] for an unpublished or own event, a duplicate
    ///   request, or a full event
    /// - [`AdmissionError::Conflict`] if the retry budget ran out
    #[tracing::instrument(skip(self), fields(%requester_id, %event_id))]
    pub async fn create_request(
        &self,
        requester_id: UserId,
        event_id: EventId,
    ) -> Result<ParticipationRequest> {
        let result = retry_with_predicate(
            &self.retry,
            || self.try_create(requester_id, event_id),
            |err| conflict_seen("create_request", err),
        )
        .await;
        observe(&result);

        let request = result?;
        AdmissionMetrics::record_created(request.status.as_str());
        tracing::info!(request_id = %request.id, status = %request.status, "Request created");
        Ok(request)
    }

    /// Cancel `request_id` on behalf of `requester_id`.
    ///
    /// Any status moves to CANCELED. Canceling a CANCELED request returns it
    /// unchanged. A freed slot is not handed to a pending request.
    ///
    /// # Errors
    ///
    /// - [`AdmissionError::UserNotFound`]
    /// - [`AdmissionError::RequestNotFound`] if the request does not exist or
    ///   belongs to someone else
    /// - [`AdmissionError::Conflict`] if the retry budget ran out
    #[tracing::instrument(skip(self), fields(%requester_id, %request_id))]
    pub async fn cancel_request(
        &self,
        requester_id: UserId,
        request_id: RequestId,
    ) -> Result<ParticipationRequest> {
        let result = retry_with_predicate(
            &self.retry,
            || self.try_cancel(requester_id, request_id),
            |err| conflict_seen("cancel_request", err),
        )
        .await;
        observe(&result);
        result
    }

    /// Every request submitted by `requester_id`, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::UserNotFound`] for an unknown user.
    #[tracing::instrument(skip(self), fields(%requester_id))]
    pub async fn list_requests_for_requester(
        &self,
        requester_id: UserId,
    ) -> Result<Vec<ParticipationRequest>> {
        self.require_user(requester_id).await?;
        Ok(self.env.requests.list_by_requester(requester_id).await?)
    }

    /// Every request for `event_id`, newest first. Only the owner may look.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::UserNotFound`] for an unknown user and
    /// [`AdmissionError::EventNotFound`] if the event does not exist or is not
    /// owned by `owner_id`.
    #[tracing::instrument(skip(self), fields(%owner_id, %event_id))]
    pub async fn list_requests_for_event_owner(
        &self,
        owner_id: UserId,
        event_id: EventId,
    ) -> Result<Vec<ParticipationRequest>> {
        self.require_user(owner_id).await?;
        let event = self.require_event(event_id).await?;
        if !event.is_owned_by(owner_id) {
            return Err(AdmissionError::EventNotFound(event_id));
        }
        Ok(self.env.requests.list_by_event(event_id).await?)
    }

    /// Resolve pending `request_ids` of `event_id` to `target`.
    ///
    /// For [`BatchTarget::Confirmed`] the requests are granted in admission
    /// order while capacity lasts and the rest are rejected; if the event ends
    /// up full, every other pending request of the event is rejected as well.
    /// Input order and duplicate IDs have no effect.
    ///
    /// # Errors
    ///
    /// - [`AdmissionError::UserNotFound`] / [`AdmissionError::EventNotFound`]
    ///   (also when `owner_id` does not own the event)
    /// - [`AdmissionError::RequestNotFound`] for an unknown ID
    /// - [`AdmissionError::Rule`] if the event is not moderated, or an ID is
    ///   not PENDING or belongs to another event; nothing is written
    /// - [`AdmissionError::Conflict`] if the retry budget ran out
    #[tracing::instrument(skip(self, request_ids), fields(%owner_id, %event_id, ids = request_ids.len(), target = target.as_str()))]
    pub async fn resolve_batch(
        &self,
        owner_id: UserId,
        event_id: EventId,
        request_ids: &[RequestId],
        target: BatchTarget,
    ) -> Result<BatchOutcome> {
        let started = Instant::now();
        let ids = dedup_ids(request_ids);

        let result = retry_with_predicate(
            &self.retry,
            || self.try_resolve(owner_id, event_id, &ids, target),
            |err| conflict_seen("resolve_batch", err),
        )
        .await;
        observe(&result);
        AdmissionMetrics::record_batch_duration(started.elapsed());

        let (outcome, cascade) = result?;
        AdmissionMetrics::record_batch(
            target,
            outcome.confirmed.len(),
            outcome.rejected.len(),
            cascade,
        );
        tracing::info!(
            confirmed = outcome.confirmed.len(),
            rejected = outcome.rejected.len(),
            cascade,
            "Batch resolved"
        );
        Ok(outcome)
    }

    async fn try_create(
        &self,
        requester_id: UserId,
        event_id: EventId,
    ) -> Result<ParticipationRequest> {
        self.require_user(requester_id).await?;

        let mut scope = self.open_scope(event_id).await?;
        let event = self.require_event(scope.event_id()).await?;
        let store_err = |e| AdmissionError::from_store(event_id, e, None);

        let existing = scope
            .find_for_requester(requester_id)
            .await
            .map_err(store_err)?;
        let confirmed = scope.count_confirmed().await.map_err(store_err)?;
        let status = decide_creation(&event, requester_id, existing.as_ref(), confirmed)?;
        tracing::debug!(confirmed, %status, "Creation admitted");

        let request = scope
            .insert(NewRequest {
                event_id: event.id,
                requester_id,
                status,
                created_at: self.env.clock.now(),
            })
            .await
            .map_err(|e| {
                AdmissionError::from_store(
                    event_id,
                    e,
                    Some(RuleViolation::DuplicateRequest {
                        event_id,
                        requester_id,
                    }),
                )
            })?;

        scope.commit().await.map_err(store_err)?;
        Ok(request)
    }

    async fn try_cancel(
        &self,
        requester_id: UserId,
        request_id: RequestId,
    ) -> Result<ParticipationRequest> {
        self.require_user(requester_id).await?;
        let snapshot = self
            .env
            .requests
            .get(request_id)
            .await?
            .ok_or(AdmissionError::RequestNotFound(request_id))?;
        // Ownership never changes, so it can be checked before locking
        if snapshot.requester_id != requester_id {
            return Err(AdmissionError::RequestNotFound(request_id));
        }

        let event_id = snapshot.event_id;
        let mut scope = self.open_scope(event_id).await?;
        let store_err = |e| AdmissionError::from_store(event_id, e, None);

        let current = scope
            .find_by_ids(&[request_id])
            .await
            .map_err(store_err)?
            .into_iter()
            .next()
            .ok_or(AdmissionError::RequestNotFound(request_id))?;

        let Some(change) = decide_cancellation(&current, requester_id)? else {
            tracing::debug!("Request already canceled");
            return Ok(current);
        };

        let canceled = scope
            .apply_status_changes(&[change])
            .await
            .map_err(store_err)?
            .into_iter()
            .next()
            .ok_or_else(|| AdmissionError::Conflict {
                event_id,
                reason: format!("request {request_id} vanished during cancellation"),
            })?;
        scope.commit().await.map_err(store_err)?;

        AdmissionMetrics::record_canceled();
        tracing::info!(from = %change.from, "Request canceled");
        Ok(canceled)
    }

    /// Returns the outcome and the number of cascade rejections in it.
    async fn try_resolve(
        &self,
        owner_id: UserId,
        event_id: EventId,
        ids: &[RequestId],
        target: BatchTarget,
    ) -> Result<(BatchOutcome, usize)> {
        self.require_user(owner_id).await?;

        let mut scope = self.open_scope(event_id).await?;
        let event = self.require_event(scope.event_id()).await?;
        check_moderation(&event, owner_id)?;
        let store_err = |e| AdmissionError::from_store(event_id, e, None);

        let found = scope.find_by_ids(ids).await.map_err(store_err)?;
        let targeted = validate_batch(event_id, ids, found)?;
        let confirmed = scope.count_confirmed().await.map_err(store_err)?;
        let queue = match target {
            BatchTarget::Confirmed => scope.find_pending().await.map_err(store_err)?,
            BatchTarget::Rejected => Vec::new(),
        };

        let plan = plan_batch(&event, target, confirmed, &targeted, &queue)?;
        if plan.is_empty() {
            return Ok((BatchOutcome::default(), 0));
        }

        let updated = scope
            .apply_status_changes(&plan.changes())
            .await
            .map_err(store_err)?;
        scope.commit().await.map_err(store_err)?;

        let (granted, refused): (Vec<_>, Vec<_>) = updated
            .into_iter()
            .partition(|r| r.status == RequestStatus::Confirmed);
        Ok((
            BatchOutcome {
                confirmed: granted,
                rejected: refused,
            },
            plan.cascade.len(),
        ))
    }

    async fn open_scope(&self, event_id: EventId) -> Result<Box<dyn EventScope>> {
        self.env
            .requests
            .lock_event(event_id)
            .await
            .map_err(|e| AdmissionError::from_store(event_id, e, None))
    }

    async fn require_user(&self, user_id: UserId) -> Result<()> {
        if self.env.users.user_exists(user_id).await? {
            Ok(())
        } else {
            Err(AdmissionError::UserNotFound(user_id))
        }
    }

    async fn require_event(&self, event_id: EventId) -> Result<EventDescriptor> {
        self.env
            .events
            .get_event(event_id)
            .await?
            .ok_or(AdmissionError::EventNotFound(event_id))
    }
}

fn conflict_seen(operation: &'static str, err: &AdmissionError) -> bool {
    let retryable = err.is_retryable();
    if retryable {
        AdmissionMetrics::record_conflict(operation);
    }
    retryable
}

fn observe<T>(result: &Result<T>) {
    if let Err(err) = result {
        if err.kind() == ErrorKind::BusinessRule {
            AdmissionMetrics::record_rule_violation();
        }
        tracing::debug!(error = %err, kind = ?err.kind(), "Operation refused");
    }
}
