//! Collaborator traits consumed by the admission controller.
//!
//! The controller never walks an object graph; it asks narrow questions of
//! injected collaborators:
//!
//! - [`EventDirectory`]: read-only event metadata from the event service
//! - [`UserDirectory`]: whether a user exists
//! - [`RequestStore`]: durable participation requests
//!
//! # Event scopes
//!
//! Creation and batch resolution both read the confirmed count and then write
//! statuses. [`RequestStore::lock_event`] returns an [`EventScope`] that holds
//! the event's admission lock (a row lock inside a transaction, or an
//! event-scoped mutex) until it is committed or dropped:
//!
//! ```text
//! lock_event(e) ──> count_confirmed / find_* ──> insert / apply_status_changes ──> commit
//!       │                                                                          │
//!       └──────────────── drop without commit: rollback + unlock ◄─────────────────┘
//! ```
//!
//! Two scopes on the same event never overlap, so the
//! read-availability-then-write sequence is atomic with respect to every
//! other writer on that event.
//!
//! # Implementations
//!
//! - `PostgresRequestStore` (in `admission-postgres`): `SELECT ... FOR UPDATE` on the event row
//! - `InMemoryRequestStore` (in `admission-testing`): per-event `tokio` mutex, staged writes

use crate::error::StoreError;
use crate::types::{
    EventDescriptor, EventId, NewRequest, ParticipationRequest, RequestId, StatusChange, UserId,
};
use async_trait::async_trait;

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Read-only access to event metadata.
#[async_trait]
pub trait EventDirectory: Send + Sync {
    /// Look up an event.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the lookup fails.
    async fn get_event(&self, event_id: EventId) -> StoreResult<Option<EventDescriptor>>;
}

/// Read-only access to user existence.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Returns true if the user exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the lookup fails.
    async fn user_exists(&self, user_id: UserId) -> StoreResult<bool>;
}

/// Durable storage for participation requests.
#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Open the admission scope of one event.
    ///
    /// Waits until no other scope on `event_id` is open. Callers load the
    /// event descriptor after this returns.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the event row is missing, or
    /// [`StoreError::Database`] if the scope cannot be opened.
    async fn lock_event(&self, event_id: EventId) -> StoreResult<Box<dyn EventScope>>;

    /// Point lookup by request ID (committed state, no lock).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the lookup fails.
    async fn get(&self, request_id: RequestId) -> StoreResult<Option<ParticipationRequest>>;

    /// All requests submitted by `requester_id`, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    async fn list_by_requester(&self, requester_id: UserId)
    -> StoreResult<Vec<ParticipationRequest>>;

    /// All requests for `event_id`, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    async fn list_by_event(&self, event_id: EventId) -> StoreResult<Vec<ParticipationRequest>>;
}

/// Unit of work holding one event's admission lock.
///
/// Reads observe the scope's own staged writes. Dropping the scope without
/// calling [`EventScope::commit`] discards every staged write.
#[async_trait]
pub trait EventScope: Send {
    /// Event this scope locks
    fn event_id(&self) -> EventId;

    /// Number of CONFIRMED requests for the event.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    async fn count_confirmed(&mut self) -> StoreResult<u32>;

    /// The request `requester_id` holds for this event, in any status.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    async fn find_for_requester(
        &mut self,
        requester_id: UserId,
    ) -> StoreResult<Option<ParticipationRequest>>;

    /// Requests with the given IDs, on any event. Unknown IDs are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    async fn find_by_ids(&mut self, ids: &[RequestId]) -> StoreResult<Vec<ParticipationRequest>>;

    /// Every PENDING request for this event, in admission order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    async fn find_pending(&mut self) -> StoreResult<Vec<ParticipationRequest>>;

    /// Persist a new request and return it with its assigned ID.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UniqueViolation`] if the requester already has a
    /// request for this event.
    async fn insert(&mut self, request: NewRequest) -> StoreResult<ParticipationRequest>;

    /// Apply every change or none.
    ///
    /// Returns the updated requests in the order of `changes`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if any request is missing or no longer
    /// holds its expected `from` status.
    async fn apply_status_changes(
        &mut self,
        changes: &[StatusChange],
    ) -> StoreResult<Vec<ParticipationRequest>>;

    /// Make staged writes durable and release the lock.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if the commit lost a race, or
    /// [`StoreError::Database`] if it fails.
    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
