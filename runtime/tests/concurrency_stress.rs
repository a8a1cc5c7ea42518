//! Concurrency stress tests for last-slot scenarios.
//!
//! Many tasks race creation, cancellation and batch resolution on one event;
//! the confirmed count must never exceed the limit.
//!
//! Run with: `cargo test --test concurrency_stress -- --nocapture`

#![allow(clippy::unwrap_used)] // Test code

use admission_core::environment::SystemClock;
use admission_core::{AdmissionError, BatchTarget, EventId, RequestStatus, RuleViolation, UserId};
use admission_runtime::{AdmissionController, AdmissionEnvironment, RetryPolicy};
use admission_testing::fixtures::EventBuilder;
use admission_testing::{InMemoryDirectory, InMemoryRequestStore};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;

const OWNER: i64 = 1;
const EVENT: EventId = EventId::new(7);

fn setup(builder: EventBuilder, users: i64) -> (InMemoryRequestStore, AdmissionController) {
    let directory = InMemoryDirectory::new();
    directory.add_event(builder.build());
    directory.add_users(2..=users + 1);

    let store = InMemoryRequestStore::new();
    let shared = Arc::new(directory);
    let controller = AdmissionController::new(AdmissionEnvironment::new(
        Arc::new(SystemClock::new()),
        shared.clone(),
        shared,
        Arc::new(store.clone()),
    ))
    .with_retry_policy(
        RetryPolicy::builder()
            .max_retries(5)
            .initial_delay(Duration::from_millis(1))
            .max_delay(Duration::from_millis(20))
            .build(),
    );

    (store, controller)
}

/// 100 concurrent joins for 1 slot on an unmoderated event.
///
/// Exactly one request is confirmed, the other 99 are refused as full.
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_last_slot_with_100_concurrent_joins() {
    let (store, controller) = setup(EventBuilder::new(EVENT.value(), OWNER).limit(1), 100);

    let tasks = (2..=101).map(|requester| {
        let controller = controller.clone();
        tokio::spawn(async move {
            controller
                .create_request(UserId::new(requester), EVENT)
                .await
        })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    let admitted = results.iter().filter(|r| r.is_ok()).count();
    let refused = results
        .iter()
        .filter(|r| {
            matches!(
                r,
                Err(AdmissionError::Rule(
                    RuleViolation::ParticipantLimitReached { .. }
                ))
            )
        })
        .count();

    assert_eq!(admitted, 1);
    assert_eq!(refused, 99);
    assert_eq!(store.count(EVENT, RequestStatus::Confirmed), 1);
    assert_eq!(store.snapshot().len(), 1);
}

/// Concurrent batches over overlapping pending sets never overcommit.
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_batches_respect_limit() {
    let (store, controller) = setup(
        EventBuilder::new(EVENT.value(), OWNER).limit(5).moderated(),
        40,
    );

    let mut pending = Vec::new();
    for requester in 2..=41 {
        pending.push(
            controller
                .create_request(UserId::new(requester), EVENT)
                .await
                .unwrap()
                .id,
        );
    }

    let tasks = pending.chunks(4).map(|chunk| {
        let controller = controller.clone();
        let chunk = chunk.to_vec();
        tokio::spawn(async move {
            controller
                .resolve_batch(UserId::new(OWNER), EVENT, &chunk, BatchTarget::Confirmed)
                .await
        })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    let confirmed: usize = results
        .iter()
        .filter_map(|r| r.as_ref().ok())
        .map(|o| o.confirmed.len())
        .sum();

    // Batches that ran after the cascade see REJECTED rows and are refused
    for result in &results {
        if let Err(err) = result {
            assert!(matches!(
                err,
                AdmissionError::Rule(RuleViolation::RequestNotPending { .. })
            ));
        }
    }
    assert_eq!(confirmed, 5);
    assert_eq!(store.count(EVENT, RequestStatus::Confirmed), 5);
    assert_eq!(store.count(EVENT, RequestStatus::Pending), 0);
}

/// Joins, cancellations and batches interleaved on one event.
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_mixed_workload_keeps_capacity_invariant() {
    let (store, controller) = setup(
        EventBuilder::new(EVENT.value(), OWNER).limit(3).moderated(),
        60,
    );

    let joins = (2..=61).map(|requester| {
        let controller = controller.clone();
        tokio::spawn(async move {
            let Ok(request) = controller
                .create_request(UserId::new(requester), EVENT)
                .await
            else {
                return;
            };
            if requester % 3 == 0 {
                let _ = controller
                    .cancel_request(UserId::new(requester), request.id)
                    .await;
            } else {
                let _ = controller
                    .resolve_batch(
                        UserId::new(OWNER),
                        EVENT,
                        &[request.id],
                        BatchTarget::Confirmed,
                    )
                    .await;
            }
        })
    });
    for task in join_all(joins).await {
        task.unwrap();
    }

    assert!(store.count(EVENT, RequestStatus::Confirmed) <= 3);
}
