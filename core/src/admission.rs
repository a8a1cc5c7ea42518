//! Admission decisions.
//!
//! Pure functions over already-loaded data. The controller in
//! `admission-runtime` gathers inputs inside an event scope, calls into this
//! module, and hands the resulting [`StatusChange`]s to the store. Nothing here
//! performs I/O, so every rule can be tested at memory speed.
//!
//! # Batch confirmation
//!
//! ```text
//! available = limit - confirmed
//!
//! targeted (sorted by created_at, id):  r1  r2  r3  r4
//!                                        │   │   │   │
//!                       available = 2 ── ✓   ✓   ✗   ✗     overflow → REJECTED
//!
//! available == 0 afterwards → every other PENDING request of the event → REJECTED
//! ```

use crate::error::{AdmissionError, Result, RuleViolation};
use crate::types::{
    BatchTarget, EventDescriptor, EventId, ParticipationRequest, RequestId, RequestStatus,
    StatusChange, UserId,
};
use std::collections::HashSet;

/// Decide whether `requester_id` may submit a request, and with which status.
///
/// Checks, in order: publication, self-participation, an existing request
/// (in any status), and capacity when the event has a limit.
///
/// Returns CONFIRMED when the event skips moderation or has no limit,
/// PENDING otherwise.
///
/// # Errors
///
/// Returns the first [`RuleViolation`] that applies.
pub fn decide_creation(
    event: &EventDescriptor,
    requester_id: UserId,
    existing: Option<&ParticipationRequest>,
    confirmed: u32,
) -> Result<RequestStatus> {
    if !event.is_published() {
        return Err(RuleViolation::EventNotPublished {
            event_id: event.id,
            state: event.state,
        }
        .into());
    }

    if event.is_owned_by(requester_id) {
        return Err(RuleViolation::SelfParticipation {
            event_id: event.id,
            requester_id,
        }
        .into());
    }

    if existing.is_some() {
        return Err(RuleViolation::DuplicateRequest {
            event_id: event.id,
            requester_id,
        }
        .into());
    }

    if event.participant_limit.remaining(confirmed) == Some(0) {
        return Err(RuleViolation::ParticipantLimitReached {
            event_id: event.id,
            limit: event.participant_limit.value(),
        }
        .into());
    }

    if event.requires_moderation && !event.participant_limit.is_unlimited() {
        Ok(RequestStatus::Pending)
    } else {
        Ok(RequestStatus::Confirmed)
    }
}

/// Decide the effect of `requester_id` canceling `request`.
///
/// Returns `None` when the request is already CANCELED (idempotent no-op).
///
/// # Errors
///
/// Returns [`AdmissionError::RequestNotFound`] if the request belongs to
/// someone else, so existence is not leaked.
pub fn decide_cancellation(
    request: &ParticipationRequest,
    requester_id: UserId,
) -> Result<Option<StatusChange>> {
    if request.requester_id != requester_id {
        return Err(AdmissionError::RequestNotFound(request.id));
    }

    if request.status == RequestStatus::Canceled {
        return Ok(None);
    }

    Ok(Some(StatusChange::transition(request, RequestStatus::Canceled)?))
}

/// Check that `owner_id` may resolve requests for `event`.
///
/// # Errors
///
/// Returns [`AdmissionError::EventNotFound`] if the caller does not own the
/// event, or [`RuleViolation::ModerationNotRequired`] if the event has no
/// queue to moderate.
pub fn check_moderation(event: &EventDescriptor, owner_id: UserId) -> Result<()> {
    if !event.is_owned_by(owner_id) {
        return Err(AdmissionError::EventNotFound(event.id));
    }

    if !event.is_moderated() {
        return Err(RuleViolation::ModerationNotRequired { event_id: event.id }.into());
    }

    Ok(())
}

/// Collapse repeated IDs, keeping first occurrences.
#[must_use]
pub fn dedup_ids(ids: &[RequestId]) -> Vec<RequestId> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

/// Validate a batch against freshly loaded rows.
///
/// Every ID must exist, belong to `event_id` and be PENDING. Returns the
/// targeted requests in admission order.
///
/// # Errors
///
/// Fails on the first offending ID; no partial result is produced.
pub fn validate_batch(
    event_id: EventId,
    ids: &[RequestId],
    found: Vec<ParticipationRequest>,
) -> Result<Vec<ParticipationRequest>> {
    for id in ids {
        let Some(request) = found.iter().find(|r| r.id == *id) else {
            return Err(AdmissionError::RequestNotFound(*id));
        };

        if request.event_id != event_id {
            return Err(RuleViolation::RequestOutsideEvent {
                request_id: *id,
                event_id,
            }
            .into());
        }

        if request.status.is_terminal() {
            return Err(RuleViolation::RequestNotPending {
                request_id: *id,
                status: request.status,
            }
            .into());
        }
    }

    let wanted: HashSet<RequestId> = ids.iter().copied().collect();
    let mut targeted: Vec<ParticipationRequest> = found
        .into_iter()
        .filter(|r| wanted.contains(&r.id))
        .collect();
    targeted.sort_by(ParticipationRequest::admission_order);
    targeted.dedup_by_key(|r| r.id);

    Ok(targeted)
}

/// Status changes produced by one batch resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchPlan {
    /// Targeted requests that get a slot
    pub confirm: Vec<StatusChange>,
    /// Targeted requests that are rejected (explicitly or by overflow)
    pub reject: Vec<StatusChange>,
    /// Untargeted PENDING requests rejected because the event is full
    pub cascade: Vec<StatusChange>,
    /// Free slots left after the plan is applied (`None` = unlimited)
    pub available_after: Option<u32>,
}

impl BatchPlan {
    /// All changes in application order: confirmations, rejections, cascade.
    #[must_use]
    pub fn changes(&self) -> Vec<StatusChange> {
        self.confirm
            .iter()
            .chain(self.reject.iter())
            .chain(self.cascade.iter())
            .copied()
            .collect()
    }

    /// Returns true if the plan changes nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.confirm.is_empty() && self.reject.is_empty() && self.cascade.is_empty()
    }
}

/// Resolve validated, PENDING `targeted` requests against capacity.
///
/// `targeted` must be in admission order (see [`validate_batch`]); `queue` is
/// every PENDING request of the event in admission order, targeted ones
/// included. For [`BatchTarget::Confirmed`], requests are confirmed in
/// admission order while slots remain, the overflow is rejected, and when the
/// event ends up exactly full the rest of `queue` is rejected too.
///
/// # Errors
///
/// Returns [`RuleViolation::InvalidTransition`] if a targeted request is no
/// longer PENDING.
pub fn plan_batch(
    event: &EventDescriptor,
    target: BatchTarget,
    confirmed: u32,
    targeted: &[ParticipationRequest],
    queue: &[ParticipationRequest],
) -> Result<BatchPlan> {
    let reject = |r: &ParticipationRequest| StatusChange::transition(r, RequestStatus::Rejected);

    let mut available = event.participant_limit.remaining(confirmed);

    if target == BatchTarget::Rejected {
        return Ok(BatchPlan {
            reject: targeted
                .iter()
                .map(reject)
                .collect::<std::result::Result<Vec<_>, _>>()?,
            available_after: available,
            ..BatchPlan::default()
        });
    }

    let mut plan = BatchPlan::default();
    for request in targeted {
        match available {
            Some(0) => plan.reject.push(reject(request)?),
            Some(ref mut slots) => {
                *slots -= 1;
                plan.confirm
                    .push(StatusChange::transition(request, RequestStatus::Confirmed)?);
            }
            None => plan
                .confirm
                .push(StatusChange::transition(request, RequestStatus::Confirmed)?),
        }
    }

    if available == Some(0) {
        let touched: HashSet<RequestId> = targeted.iter().map(|r| r.id).collect();
        plan.cascade = queue
            .iter()
            .filter(|r| !r.status.is_terminal() && !touched.contains(&r.id))
            .map(reject)
            .collect::<std::result::Result<Vec<_>, _>>()?;
    }

    plan.available_after = available;
    tracing::debug!(
        event_id = %event.id,
        confirm = plan.confirm.len(),
        reject = plan.reject.len(),
        cascade = plan.cascade.len(),
        "Batch planned"
    );
    Ok(plan)
}
