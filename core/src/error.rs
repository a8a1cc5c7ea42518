//! Error types for admission control.
//!
//! Two layers:
//!
//! - [`StoreError`] is what persistence collaborators return.
//! - [`AdmissionError`] is what the admission operations return. It separates
//!   "does not exist" from "business rule refused it" from "lost a race",
//!   because callers treat the three differently (404, 409, retry).

use crate::types::{EventId, EventState, RequestId, RequestStatus, UserId};
use thiserror::Error;

/// Result type alias using the admission error type.
pub type Result<T> = std::result::Result<T, AdmissionError>;

/// Errors reported by request stores and directories.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A row the operation depends on has disappeared.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Insert collided with an existing (event, requester) pair.
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    /// A row changed underneath the caller (optimistic check failed).
    #[error("Concurrent modification: {0}")]
    Conflict(String),

    /// Connection, query or decoding failure.
    #[error("Database error: {0}")]
    Database(String),
}

/// Business rules that can refuse an otherwise well-formed operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleViolation {
    /// The requester already holds a request for this event.
    #[error("User {requester_id} already has a request for event {event_id}")]
    DuplicateRequest {
        /// Event
        event_id: EventId,
        /// Requester
        requester_id: UserId,
    },

    /// Owners cannot request to join their own event.
    #[error("User {requester_id} owns event {event_id} and cannot request to join it")]
    SelfParticipation {
        /// Event
        event_id: EventId,
        /// Requester (and owner)
        requester_id: UserId,
    },

    /// Requests are only accepted for published events.
    #[error("Event {event_id} is {state}, requests are accepted only for published events")]
    EventNotPublished {
        /// Event
        event_id: EventId,
        /// Current state
        state: EventState,
    },

    /// The event already has as many confirmed participants as it allows.
    #[error("Participant limit of {limit} reached for event {event_id}")]
    ParticipantLimitReached {
        /// Event
        event_id: EventId,
        /// Configured limit
        limit: u32,
    },

    /// Batch resolution needs a moderated event with a finite limit.
    #[error("Event {event_id} does not require moderation of participation requests")]
    ModerationNotRequired {
        /// Event
        event_id: EventId,
    },

    /// A batch targets a request that is no longer PENDING.
    #[error("Request {request_id} is {status}, only PENDING requests can be resolved")]
    RequestNotPending {
        /// Request
        request_id: RequestId,
        /// Current status
        status: RequestStatus,
    },

    /// A batch targets a request that belongs to a different event.
    #[error("Request {request_id} does not belong to event {event_id}")]
    RequestOutsideEvent {
        /// Request
        request_id: RequestId,
        /// Event the batch was issued for
        event_id: EventId,
    },

    /// The state machine does not allow this move.
    #[error("Request {request_id} cannot move from {from} to {to}")]
    InvalidTransition {
        /// Request
        request_id: RequestId,
        /// Current status
        from: RequestStatus,
        /// Requested status
        to: RequestStatus,
    },
}

/// Broad category of an [`AdmissionError`], used for status mapping and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Something the caller referenced does not exist (or is not theirs)
    NotFound,
    /// A business rule refused the operation
    BusinessRule,
    /// A concurrent writer invalidated the snapshot; safe to retry
    Conflict,
    /// Infrastructure failure
    Internal,
}

/// Errors returned by admission operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    /// Event not found
    #[error("Event not found: {0}")]
    EventNotFound(EventId),

    /// Request not found, or not visible to the caller
    #[error("Request not found: {0}")]
    RequestNotFound(RequestId),

    /// User not found
    #[error("User not found: {0}")]
    UserNotFound(UserId),

    /// Business rule violation
    #[error("Business rule violated: {0}")]
    Rule(#[from] RuleViolation),

    /// Concurrent modification of the event's requests
    #[error("Concurrent modification on event {event_id}: {reason}")]
    Conflict {
        /// Event whose requests were contended
        event_id: EventId,
        /// What the store reported
        reason: String,
    },

    /// Storage failure
    #[error("Storage error: {0}")]
    Storage(String),
}

impl AdmissionError {
    /// Broad category of this error
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::EventNotFound(_) | Self::RequestNotFound(_) | Self::UserNotFound(_) => {
                ErrorKind::NotFound
            }
            Self::Rule(_) => ErrorKind::BusinessRule,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Storage(_) => ErrorKind::Internal,
        }
    }

    /// Only conflicts are worth re-running from scratch.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Translate a store failure observed while working on `event_id`.
    ///
    /// `duplicate` supplies the rule violation a unique-constraint hit stands
    /// for, if the operation was an insert.
    #[must_use]
    pub fn from_store(
        event_id: EventId,
        error: StoreError,
        duplicate: Option<RuleViolation>,
    ) -> Self {
        match (error, duplicate) {
            (StoreError::UniqueViolation(_), Some(rule)) => Self::Rule(rule),
            (StoreError::Conflict(reason), _) => Self::Conflict { event_id, reason },
            (StoreError::NotFound(_), _) => Self::EventNotFound(event_id),
            (other, _) => Self::Storage(other.to_string()),
        }
    }
}

impl From<StoreError> for AdmissionError {
    fn from(error: StoreError) -> Self {
        Self::Storage(error.to_string())
    }
}
