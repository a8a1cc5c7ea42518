//! End-to-end admission scenarios against the in-memory collaborators.

#![allow(clippy::unwrap_used)] // Test code

use admission_core::{
    AdmissionError, BatchTarget, EventId, ParticipationRequest, RequestId, RequestStatus,
    RuleViolation, UserId,
};
use admission_runtime::{AdmissionController, AdmissionEnvironment};
use admission_testing::fixtures::EventBuilder;
use admission_testing::{InMemoryDirectory, InMemoryRequestStore, init_test_tracing, stepping_clock};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

const OWNER: i64 = 1;
const EVENT: EventId = EventId::new(100);

struct Harness {
    directory: InMemoryDirectory,
    store: InMemoryRequestStore,
    controller: AdmissionController,
}

impl Harness {
    fn new(builder: EventBuilder) -> Self {
        init_test_tracing();
        let directory = InMemoryDirectory::new();
        directory.add_event(builder.build());
        directory.add_users(2..=30);

        let store = InMemoryRequestStore::new();
        let shared = Arc::new(directory.clone());
        let controller = AdmissionController::new(AdmissionEnvironment::new(
            Arc::new(stepping_clock()),
            shared.clone(),
            shared,
            Arc::new(store.clone()),
        ));

        Self {
            directory,
            store,
            controller,
        }
    }

    /// Moderated event with the given limit, owned by `OWNER`
    fn moderated(limit: u32) -> Self {
        Self::new(EventBuilder::new(EVENT.value(), OWNER).limit(limit).moderated())
    }

    fn pending_at(&self, requester: i64, secs: i64) -> ParticipationRequest {
        self.store.seed(
            EVENT,
            UserId::new(requester),
            RequestStatus::Pending,
            at(secs),
        )
    }

    fn confirmed_at(&self, requester: i64, secs: i64) -> ParticipationRequest {
        self.store.seed(
            EVENT,
            UserId::new(requester),
            RequestStatus::Confirmed,
            at(secs),
        )
    }

    fn status_of(&self, id: RequestId) -> RequestStatus {
        self.store
            .snapshot()
            .into_iter()
            .find(|r| r.id == id)
            .map(|r| r.status)
            .unwrap()
    }

    async fn resolve(
        &self,
        ids: &[RequestId],
        target: BatchTarget,
    ) -> Result<admission_core::BatchOutcome, AdmissionError> {
        self.controller
            .resolve_batch(UserId::new(OWNER), EVENT, ids, target)
            .await
    }
}

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_735_689_600, 0).unwrap() + Duration::seconds(secs)
}

fn ids(requests: &[ParticipationRequest]) -> Vec<RequestId> {
    requests.iter().map(|r| r.id).collect()
}

// ============================================================================
// Creation
// ============================================================================

#[tokio::test]
async fn moderated_event_with_limit_creates_pending() {
    let h = Harness::moderated(2);

    let request = h
        .controller
        .create_request(UserId::new(2), EVENT)
        .await
        .unwrap();

    assert_eq!(request.status, RequestStatus::Pending);
    assert_eq!(request.event_id, EVENT);
    assert_eq!(request.requester_id, UserId::new(2));
}

#[tokio::test]
async fn unmoderated_event_confirms_immediately() {
    let h = Harness::new(EventBuilder::new(EVENT.value(), OWNER).limit(2));

    let request = h
        .controller
        .create_request(UserId::new(2), EVENT)
        .await
        .unwrap();

    assert_eq!(request.status, RequestStatus::Confirmed);
}

#[tokio::test]
async fn unlimited_event_confirms_even_when_moderated() {
    let h = Harness::new(EventBuilder::new(EVENT.value(), OWNER).moderated());

    for requester in 2..12 {
        let request = h
            .controller
            .create_request(UserId::new(requester), EVENT)
            .await
            .unwrap();
        assert_eq!(request.status, RequestStatus::Confirmed);
    }
}

#[tokio::test]
async fn full_event_refuses_creation_and_persists_nothing() {
    let h = Harness::moderated(2);
    h.confirmed_at(2, 1);
    h.confirmed_at(3, 2);

    let err = h
        .controller
        .create_request(UserId::new(4), EVENT)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        AdmissionError::Rule(RuleViolation::ParticipantLimitReached {
            event_id: EVENT,
            limit: 2,
        })
    );
    assert_eq!(h.store.snapshot().len(), 2);
}

#[tokio::test]
async fn unmoderated_event_stops_confirming_at_limit() {
    let h = Harness::new(EventBuilder::new(EVENT.value(), OWNER).limit(1));

    h.controller
        .create_request(UserId::new(2), EVENT)
        .await
        .unwrap();
    let err = h
        .controller
        .create_request(UserId::new(3), EVENT)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AdmissionError::Rule(RuleViolation::ParticipantLimitReached { .. })
    ));
}

#[tokio::test]
async fn duplicate_request_is_refused_in_any_status() {
    let h = Harness::moderated(2);
    let first = h
        .controller
        .create_request(UserId::new(2), EVENT)
        .await
        .unwrap();
    h.controller
        .cancel_request(UserId::new(2), first.id)
        .await
        .unwrap();

    let err = h
        .controller
        .create_request(UserId::new(2), EVENT)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        AdmissionError::Rule(RuleViolation::DuplicateRequest {
            event_id: EVENT,
            requester_id: UserId::new(2),
        })
    );
}

#[tokio::test]
async fn owner_cannot_join_own_event() {
    let h = Harness::moderated(2);

    let err = h
        .controller
        .create_request(UserId::new(OWNER), EVENT)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AdmissionError::Rule(RuleViolation::SelfParticipation { .. })
    ));
}

#[tokio::test]
async fn unpublished_event_refuses_requests() {
    let h = Harness::moderated(2);
    h.directory
        .set_state(EVENT, admission_core::EventState::Canceled);

    let err = h
        .controller
        .create_request(UserId::new(2), EVENT)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AdmissionError::Rule(RuleViolation::EventNotPublished { .. })
    ));
    assert!(h.store.snapshot().is_empty());
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn cancellation_is_idempotent() {
    let h = Harness::moderated(2);
    let request = h
        .controller
        .create_request(UserId::new(2), EVENT)
        .await
        .unwrap();

    let first = h
        .controller
        .cancel_request(UserId::new(2), request.id)
        .await
        .unwrap();
    let commits = h.store.commit_count();
    let second = h
        .controller
        .cancel_request(UserId::new(2), request.id)
        .await
        .unwrap();

    assert_eq!(first.status, RequestStatus::Canceled);
    assert_eq!(first, second);
    assert_eq!(h.store.commit_count(), commits); // No write the second time
}

#[tokio::test]
async fn canceling_confirmed_frees_a_slot_without_promotion() {
    let h = Harness::moderated(1);
    let confirmed = h.confirmed_at(2, 1);
    let waiting = h.pending_at(3, 2);

    let canceled = h
        .controller
        .cancel_request(UserId::new(2), confirmed.id)
        .await
        .unwrap();

    assert_eq!(canceled.status, RequestStatus::Canceled);
    assert_eq!(h.status_of(waiting.id), RequestStatus::Pending);

    // The freed slot is available to the owner's next batch
    let outcome = h
        .resolve(&[waiting.id], BatchTarget::Confirmed)
        .await
        .unwrap();
    assert_eq!(ids(&outcome.confirmed), vec![waiting.id]);
}

#[tokio::test]
async fn cancel_unknown_request_is_not_found() {
    let h = Harness::moderated(2);

    let err = h
        .controller
        .cancel_request(UserId::new(2), RequestId::new(404))
        .await
        .unwrap_err();

    assert_eq!(err, AdmissionError::RequestNotFound(RequestId::new(404)));
}

// ============================================================================
// Batch resolution
// ============================================================================

#[tokio::test]
async fn creation_order_wins_over_input_order_and_cascade_drains_queue() {
    let h = Harness::moderated(2);
    let r1 = h.pending_at(2, 1);
    let r2 = h.pending_at(3, 2);
    let r3 = h.pending_at(4, 3);
    let r4 = h.pending_at(5, 4);

    let outcome = h
        .resolve(&[r3.id, r1.id, r2.id], BatchTarget::Confirmed)
        .await
        .unwrap();

    assert_eq!(ids(&outcome.confirmed), vec![r1.id, r2.id]);
    assert_eq!(ids(&outcome.rejected), vec![r3.id, r4.id]);
    assert!(outcome.confirmed.iter().all(|r| r.status == RequestStatus::Confirmed));
    assert!(outcome.rejected.iter().all(|r| r.status == RequestStatus::Rejected));
    assert_eq!(h.store.count(EVENT, RequestStatus::Pending), 0);
}

#[tokio::test]
async fn equal_timestamps_fall_back_to_lowest_id() {
    let h = Harness::moderated(1);
    let a = h.pending_at(2, 5);
    let b = h.pending_at(3, 5);

    let outcome = h
        .resolve(&[b.id, a.id], BatchTarget::Confirmed)
        .await
        .unwrap();

    assert_eq!(ids(&outcome.confirmed), vec![a.id]);
    assert_eq!(ids(&outcome.rejected), vec![b.id]);
}

#[tokio::test]
async fn partial_fill_leaves_untargeted_requests_pending() {
    let h = Harness::moderated(3);
    let r1 = h.pending_at(2, 1);
    let r2 = h.pending_at(3, 2);

    let outcome = h.resolve(&[r1.id], BatchTarget::Confirmed).await.unwrap();

    assert_eq!(ids(&outcome.confirmed), vec![r1.id]);
    assert!(outcome.rejected.is_empty());
    assert_eq!(h.status_of(r2.id), RequestStatus::Pending);
}

#[tokio::test]
async fn reject_target_touches_only_listed_requests() {
    let h = Harness::moderated(1);
    let r1 = h.pending_at(2, 1);
    let r2 = h.pending_at(3, 2);

    let outcome = h.resolve(&[r2.id], BatchTarget::Rejected).await.unwrap();

    assert!(outcome.confirmed.is_empty());
    assert_eq!(ids(&outcome.rejected), vec![r2.id]);
    assert_eq!(h.status_of(r1.id), RequestStatus::Pending);
}

#[tokio::test]
async fn non_pending_target_aborts_whole_batch() {
    let h = Harness::moderated(5);
    let r1 = h.pending_at(2, 1);
    let done = h.confirmed_at(3, 2);

    let err = h
        .resolve(&[r1.id, done.id], BatchTarget::Confirmed)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        AdmissionError::Rule(RuleViolation::RequestNotPending {
            request_id: done.id,
            status: RequestStatus::Confirmed,
        })
    );
    assert_eq!(h.status_of(r1.id), RequestStatus::Pending);
}

#[tokio::test]
async fn request_of_another_event_aborts_whole_batch() {
    let h = Harness::moderated(5);
    h.directory
        .add_event(EventBuilder::new(200, OWNER).limit(5).moderated().build());
    let r1 = h.pending_at(2, 1);
    let foreign = h
        .store
        .seed(EventId::new(200), UserId::new(3), RequestStatus::Pending, at(2));

    let err = h
        .resolve(&[r1.id, foreign.id], BatchTarget::Rejected)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AdmissionError::Rule(RuleViolation::RequestOutsideEvent { .. })
    ));
    assert_eq!(h.status_of(r1.id), RequestStatus::Pending);
    assert_eq!(h.status_of(foreign.id), RequestStatus::Pending);
}

#[tokio::test]
async fn unknown_id_aborts_whole_batch() {
    let h = Harness::moderated(5);
    let r1 = h.pending_at(2, 1);

    let err = h
        .resolve(&[r1.id, RequestId::new(999)], BatchTarget::Confirmed)
        .await
        .unwrap_err();

    assert_eq!(err, AdmissionError::RequestNotFound(RequestId::new(999)));
    assert_eq!(h.status_of(r1.id), RequestStatus::Pending);
}

#[tokio::test]
async fn unmoderated_event_has_nothing_to_resolve() {
    let h = Harness::new(EventBuilder::new(EVENT.value(), OWNER).limit(3));

    let err = h.resolve(&[], BatchTarget::Confirmed).await.unwrap_err();

    assert_eq!(
        err,
        AdmissionError::Rule(RuleViolation::ModerationNotRequired { event_id: EVENT })
    );
}

#[tokio::test]
async fn non_owner_cannot_resolve() {
    let h = Harness::moderated(3);
    let r1 = h.pending_at(2, 1);

    let err = h
        .controller
        .resolve_batch(UserId::new(9), EVENT, &[r1.id], BatchTarget::Confirmed)
        .await
        .unwrap_err();

    assert_eq!(err, AdmissionError::EventNotFound(EVENT));
}

#[tokio::test]
async fn batch_on_full_event_rejects_everything() {
    let h = Harness::moderated(1);
    h.confirmed_at(2, 1);
    let r1 = h.pending_at(3, 2);
    let r2 = h.pending_at(4, 3);

    let outcome = h.resolve(&[r1.id], BatchTarget::Confirmed).await.unwrap();

    assert!(outcome.confirmed.is_empty());
    assert_eq!(ids(&outcome.rejected), vec![r1.id, r2.id]);
}

#[tokio::test]
async fn duplicate_ids_are_collapsed() {
    let h = Harness::moderated(3);
    let r1 = h.pending_at(2, 1);

    let outcome = h
        .resolve(&[r1.id, r1.id, r1.id], BatchTarget::Confirmed)
        .await
        .unwrap();

    assert_eq!(ids(&outcome.confirmed), vec![r1.id]);
    assert!(outcome.rejected.is_empty());
}

// ============================================================================
// Listing
// ============================================================================

#[tokio::test]
async fn listings_are_newest_first() {
    let h = Harness::moderated(5);
    h.directory
        .add_event(EventBuilder::new(200, OWNER).limit(5).moderated().build());

    let a = h
        .controller
        .create_request(UserId::new(2), EVENT)
        .await
        .unwrap();
    let b = h
        .controller
        .create_request(UserId::new(2), EventId::new(200))
        .await
        .unwrap();
    let c = h
        .controller
        .create_request(UserId::new(3), EVENT)
        .await
        .unwrap();

    let mine = h
        .controller
        .list_requests_for_requester(UserId::new(2))
        .await
        .unwrap();
    assert_eq!(ids(&mine), vec![b.id, a.id]);

    let event = h
        .controller
        .list_requests_for_event_owner(UserId::new(OWNER), EVENT)
        .await
        .unwrap();
    assert_eq!(ids(&event), vec![c.id, a.id]);
}

#[tokio::test]
async fn listing_for_unknown_user_is_not_found() {
    let h = Harness::moderated(5);

    let err = h
        .controller
        .list_requests_for_requester(UserId::new(999))
        .await
        .unwrap_err();

    assert_eq!(err, AdmissionError::UserNotFound(UserId::new(999)));
}
