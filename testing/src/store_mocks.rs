//! In-memory request store.
//!
//! Mirrors the Postgres store closely enough for controller tests:
//!
//! - one `tokio` mutex per event plays the role of the event row lock
//! - scope writes are staged and only reach the shared map on commit
//! - commit re-checks every expected `from` status
//! - a unique (event, requester) index rejects duplicate inserts

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on a poisoned lock

use admission_core::{
    EventId, EventScope, NewRequest, ParticipationRequest, RequestId, RequestStatus, RequestStore,
    StatusChange, StoreError, StoreResult, UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

#[derive(Debug, Default)]
struct Inner {
    next_id: i64,
    requests: BTreeMap<RequestId, ParticipationRequest>,
}

impl Inner {
    fn allocate_id(&mut self) -> RequestId {
        self.next_id += 1;
        RequestId::new(self.next_id)
    }
}

/// In-memory [`RequestStore`] for tests.
///
/// Cloning shares state. IDs are allocated from a counter starting at 1 and,
/// like a database sequence, are not reused after a rollback.
#[derive(Clone, Debug, Default)]
pub struct InMemoryRequestStore {
    inner: Arc<Mutex<Inner>>,
    event_locks: Arc<Mutex<HashMap<EventId, Arc<tokio::sync::Mutex<()>>>>>,
    pending_conflicts: Arc<AtomicUsize>,
    commits: Arc<AtomicUsize>,
}

impl InMemoryRequestStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` commits fail with [`StoreError::Conflict`]
    pub fn inject_conflicts(&self, count: usize) {
        self.pending_conflicts.store(count, Ordering::SeqCst);
    }

    /// Number of successful commits so far
    #[must_use]
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Insert a request directly, bypassing every rule.
    ///
    /// Useful for arranging states the public operations cannot reach in one
    /// step (a specific `created_at`, a pre-existing CONFIRMED row).
    pub fn seed(
        &self,
        event_id: EventId,
        requester_id: UserId,
        status: RequestStatus,
        created_at: DateTime<Utc>,
    ) -> ParticipationRequest {
        let mut inner = self.inner.lock().unwrap();
        let request = ParticipationRequest {
            id: inner.allocate_id(),
            event_id,
            requester_id,
            status,
            created_at,
        };
        inner.requests.insert(request.id, request.clone());
        request
    }

    /// Every committed request, ordered by ID
    #[must_use]
    pub fn snapshot(&self) -> Vec<ParticipationRequest> {
        self.inner.lock().unwrap().requests.values().cloned().collect()
    }

    /// Committed requests of `event_id` holding `status`
    #[must_use]
    pub fn count(&self, event_id: EventId, status: RequestStatus) -> usize {
        self.inner
            .lock()
            .unwrap()
            .requests
            .values()
            .filter(|r| r.event_id == event_id && r.status == status)
            .count()
    }

    fn event_lock(&self, event_id: EventId) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(
            self.event_locks
                .lock()
                .unwrap()
                .entry(event_id)
                .or_default(),
        )
    }

    fn take_injected_conflict(&self) -> bool {
        self.pending_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl RequestStore for InMemoryRequestStore {
    async fn lock_event(&self, event_id: EventId) -> StoreResult<Box<dyn EventScope>> {
        let guard = self.event_lock(event_id).lock_owned().await;
        Ok(Box::new(InMemoryScope {
            event_id,
            store: self.clone(),
            _guard: guard,
            staged: BTreeMap::new(),
            expected: Vec::new(),
        }))
    }

    async fn get(&self, request_id: RequestId) -> StoreResult<Option<ParticipationRequest>> {
        Ok(self.inner.lock().unwrap().requests.get(&request_id).cloned())
    }

    async fn list_by_requester(
        &self,
        requester_id: UserId,
    ) -> StoreResult<Vec<ParticipationRequest>> {
        let mut requests: Vec<_> = self
            .inner
            .lock()
            .unwrap()
            .requests
            .values()
            .filter(|r| r.requester_id == requester_id)
            .cloned()
            .collect();
        requests.sort_by(ParticipationRequest::newest_first);
        Ok(requests)
    }

    async fn list_by_event(&self, event_id: EventId) -> StoreResult<Vec<ParticipationRequest>> {
        let mut requests: Vec<_> = self
            .inner
            .lock()
            .unwrap()
            .requests
            .values()
            .filter(|r| r.event_id == event_id)
            .cloned()
            .collect();
        requests.sort_by(ParticipationRequest::newest_first);
        Ok(requests)
    }
}

/// Scope over one event: holds the event mutex, stages writes.
struct InMemoryScope {
    event_id: EventId,
    store: InMemoryRequestStore,
    _guard: OwnedMutexGuard<()>,
    /// Inserted or updated rows, keyed by ID
    staged: BTreeMap<RequestId, ParticipationRequest>,
    /// Status changes to re-verify against committed rows on commit
    expected: Vec<StatusChange>,
}

impl InMemoryScope {
    /// Committed rows overlaid with this scope's staged rows
    fn visible(&self) -> BTreeMap<RequestId, ParticipationRequest> {
        let mut rows = self.store.inner.lock().unwrap().requests.clone();
        rows.extend(self.staged.iter().map(|(id, r)| (*id, r.clone())));
        rows
    }
}

#[async_trait]
impl EventScope for InMemoryScope {
    fn event_id(&self) -> EventId {
        self.event_id
    }

    async fn count_confirmed(&mut self) -> StoreResult<u32> {
        let count = self
            .visible()
            .values()
            .filter(|r| r.event_id == self.event_id && r.status == RequestStatus::Confirmed)
            .count();
        u32::try_from(count).map_err(|e| StoreError::Database(e.to_string()))
    }

    async fn find_for_requester(
        &mut self,
        requester_id: UserId,
    ) -> StoreResult<Option<ParticipationRequest>> {
        Ok(self
            .visible()
            .into_values()
            .find(|r| r.event_id == self.event_id && r.requester_id == requester_id))
    }

    async fn find_by_ids(&mut self, ids: &[RequestId]) -> StoreResult<Vec<ParticipationRequest>> {
        let rows = self.visible();
        Ok(ids.iter().filter_map(|id| rows.get(id).cloned()).collect())
    }

    async fn find_pending(&mut self) -> StoreResult<Vec<ParticipationRequest>> {
        let mut pending: Vec<_> = self
            .visible()
            .into_values()
            .filter(|r| r.event_id == self.event_id && r.status == RequestStatus::Pending)
            .collect();
        pending.sort_by(ParticipationRequest::admission_order);
        Ok(pending)
    }

    async fn insert(&mut self, request: NewRequest) -> StoreResult<ParticipationRequest> {
        let duplicate = self.visible().values().any(|r| {
            r.event_id == request.event_id && r.requester_id == request.requester_id
        });
        if duplicate {
            return Err(StoreError::UniqueViolation(format!(
                "participation_requests_event_requester_key ({}, {})",
                request.event_id, request.requester_id
            )));
        }

        let id = self.store.inner.lock().unwrap().allocate_id();
        let row = ParticipationRequest {
            id,
            event_id: request.event_id,
            requester_id: request.requester_id,
            status: request.status,
            created_at: request.created_at,
        };
        self.staged.insert(id, row.clone());
        Ok(row)
    }

    async fn apply_status_changes(
        &mut self,
        changes: &[StatusChange],
    ) -> StoreResult<Vec<ParticipationRequest>> {
        let rows = self.visible();
        let mut updated = Vec::with_capacity(changes.len());
        for change in changes {
            match rows.get(&change.request_id) {
                Some(row) if row.status == change.from => {
                    updated.push(row.with_status(change.to));
                }
                Some(row) => {
                    return Err(StoreError::Conflict(format!(
                        "request {} is {}, expected {}",
                        change.request_id, row.status, change.from
                    )));
                }
                None => {
                    return Err(StoreError::Conflict(format!(
                        "request {} disappeared",
                        change.request_id
                    )));
                }
            }
        }

        for row in &updated {
            self.staged.insert(row.id, row.clone());
        }
        self.expected.extend_from_slice(changes);
        Ok(updated)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let Self {
            event_id,
            store,
            _guard,
            staged,
            expected,
        } = *self;

        if store.take_injected_conflict() {
            return Err(StoreError::Conflict(format!(
                "injected conflict on event {event_id}"
            )));
        }

        let mut inner = store.inner.lock().unwrap();

        // Only the first change per row was observed against committed state;
        // rows inserted by this scope have no committed version
        let mut checked = HashSet::new();
        for change in expected.iter().filter(|c| checked.insert(c.request_id)) {
            let Some(committed) = inner.requests.get(&change.request_id) else {
                continue;
            };
            if committed.status != change.from {
                return Err(StoreError::Conflict(format!(
                    "request {} changed to {} before commit",
                    change.request_id, committed.status
                )));
            }
        }

        inner.requests.extend(staged);
        drop(inner);
        store.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
