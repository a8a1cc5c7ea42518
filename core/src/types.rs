//! Domain types for event admission.
//!
//! Value objects for the two records this core reasons about: the read-only
//! [`EventDescriptor`] supplied by the event service, and the
//! [`ParticipationRequest`] owned by the request store.

use crate::error::RuleViolation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for an event
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(i64);

impl EventId {
    /// Creates an `EventId` from its raw value
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the raw value
    #[must_use]
    pub const fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a user (requester or event owner)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(i64);

impl UserId {
    /// Creates a `UserId` from its raw value
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the raw value
    #[must_use]
    pub const fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a participation request.
///
/// Allocated by the request store in increasing order, which makes it usable
/// as the secondary key of the admission order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(i64);

impl RequestId {
    /// Creates a `RequestId` from its raw value
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the raw value
    #[must_use]
    pub const fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Event Descriptor
// ============================================================================

/// Maximum number of confirmed participants for an event.
///
/// Zero means the event has no limit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParticipantLimit(pub u32);

impl ParticipantLimit {
    /// An event without a headcount limit
    pub const UNLIMITED: Self = Self(0);

    /// Creates a new `ParticipantLimit`
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Returns the limit value (0 = unlimited)
    #[must_use]
    pub const fn value(&self) -> u32 {
        self.0
    }

    /// Returns true if the event accepts any number of participants
    #[must_use]
    pub const fn is_unlimited(&self) -> bool {
        self.0 == 0
    }

    /// Slots still free given the current confirmed count.
    ///
    /// Returns `None` for unlimited events. Saturates at zero when the
    /// confirmed count already exceeds the limit (e.g. the limit was lowered).
    #[must_use]
    pub const fn remaining(&self, confirmed: u32) -> Option<u32> {
        if self.is_unlimited() {
            None
        } else {
            Some(self.0.saturating_sub(confirmed))
        }
    }
}

impl fmt::Display for ParticipantLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unlimited() {
            write!(f, "unlimited")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Publication state of an event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventState {
    /// Drafted, awaiting publication
    Pending,
    /// Open for participation requests
    Published,
    /// Withdrawn by its owner or an administrator
    Canceled,
}

impl EventState {
    /// Convert state to its database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Published => "PUBLISHED",
            Self::Canceled => "CANCELED",
        }
    }

    /// Parse state from its database string.
    ///
    /// Returns `None` if the string doesn't match a known state.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "PUBLISHED" => Some(Self::Published),
            "CANCELED" => Some(Self::Canceled),
            _ => None,
        }
    }
}

impl fmt::Display for EventState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The slice of an event that admission control needs.
///
/// Supplied by the event service and never mutated here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDescriptor {
    /// Event ID
    pub id: EventId,
    /// User who owns (initiated) the event
    pub owner_id: UserId,
    /// Headcount limit (0 = unlimited)
    pub participant_limit: ParticipantLimit,
    /// Whether new requests wait for the owner's decision
    pub requires_moderation: bool,
    /// Publication state
    pub state: EventState,
}

impl EventDescriptor {
    /// Returns true if participation requests may be submitted
    #[must_use]
    pub fn is_published(&self) -> bool {
        self.state == EventState::Published
    }

    /// Returns true if `user_id` owns this event
    #[must_use]
    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.owner_id == user_id
    }

    /// Returns true if the owner has a queue to moderate.
    ///
    /// Only moderated events with a finite limit ever hold PENDING requests.
    #[must_use]
    pub const fn is_moderated(&self) -> bool {
        self.requires_moderation && !self.participant_limit.is_unlimited()
    }
}

// ============================================================================
// Participation Request
// ============================================================================

/// Status of a participation request.
///
/// ```text
///            ┌──> CONFIRMED ──┐
/// PENDING ───┼──> REJECTED    ├──> CANCELED
///            └──> CANCELED    │
///                             │
/// (any) ──────────────────────┘   requester cancellation
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    /// Waiting for the event owner
    Pending,
    /// Holds one of the event's slots
    Confirmed,
    /// Denied by the owner, by overflow or by cascade
    Rejected,
    /// Withdrawn by the requester
    Canceled,
}

impl RequestStatus {
    /// Convert status to its database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Confirmed => "CONFIRMED",
            Self::Rejected => "REJECTED",
            Self::Canceled => "CANCELED",
        }
    }

    /// Parse status from its database string.
    ///
    /// Returns `None` if the string doesn't match a known status.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "CONFIRMED" => Some(Self::Confirmed),
            "REJECTED" => Some(Self::Rejected),
            "CANCELED" => Some(Self::Canceled),
            _ => None,
        }
    }

    /// PENDING is the only status an owner decision can move away from.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Whether `self -> target` is a legal transition.
    ///
    /// Cancellation is accepted from every status (and is a no-op from
    /// CANCELED); every other move must start at PENDING.
    #[must_use]
    pub const fn can_transition_to(&self, target: Self) -> bool {
        match (self, target) {
            (_, Self::Canceled) => true,
            (Self::Pending, Self::Confirmed | Self::Rejected) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user's request to take part in an event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipationRequest {
    /// Request ID
    pub id: RequestId,
    /// Event the requester wants to join
    pub event_id: EventId,
    /// User who submitted the request
    pub requester_id: UserId,
    /// Current status
    pub status: RequestStatus,
    /// Creation timestamp, primary key of the admission order
    pub created_at: DateTime<Utc>,
}

impl ParticipationRequest {
    /// Compare two requests by admission order: `created_at` ascending,
    /// then `id` ascending.
    #[must_use]
    pub fn admission_order(&self, other: &Self) -> Ordering {
        self.created_at
            .cmp(&other.created_at)
            .then_with(|| self.id.cmp(&other.id))
    }

    /// Compare two requests newest-first (reverse admission order).
    #[must_use]
    pub fn newest_first(&self, other: &Self) -> Ordering {
        other.admission_order(self)
    }

    /// Returns a copy of this request carrying `status`
    #[must_use]
    pub fn with_status(&self, status: RequestStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }
}

/// A request that has not been persisted yet (the store assigns the ID).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewRequest {
    /// Event the requester wants to join
    pub event_id: EventId,
    /// User submitting the request
    pub requester_id: UserId,
    /// Status decided at creation time (PENDING or CONFIRMED)
    pub status: RequestStatus,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// One row-level status update handed to the store.
///
/// `from` is the status the caller observed; the store must refuse the whole
/// batch with a conflict if any row has moved on since.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusChange {
    /// Request to update
    pub request_id: RequestId,
    /// Status the request is expected to hold right now
    pub from: RequestStatus,
    /// Status to write
    pub to: RequestStatus,
}

impl StatusChange {
    /// Creates a new `StatusChange`
    #[must_use]
    pub const fn new(request_id: RequestId, from: RequestStatus, to: RequestStatus) -> Self {
        Self {
            request_id,
            from,
            to,
        }
    }

    /// Moves `request` from its current status to `to`.
    ///
    /// # Errors
    ///
    /// Returns [`RuleViolation::InvalidTransition`] if the state machine does
    /// not allow the move.
    pub fn transition(
        request: &ParticipationRequest,
        to: RequestStatus,
    ) -> Result<Self, RuleViolation> {
        if request.status.can_transition_to(to) {
            Ok(Self::new(request.id, request.status, to))
        } else {
            Err(RuleViolation::InvalidTransition {
                request_id: request.id,
                from: request.status,
                to,
            })
        }
    }
}

// ============================================================================
// Batch Resolution
// ============================================================================

/// Disposition requested by the owner for a batch of pending requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchTarget {
    /// Confirm as many as fit, reject the rest
    Confirmed,
    /// Reject every listed request
    Rejected,
}

impl BatchTarget {
    /// The request status this target writes on success
    #[must_use]
    pub const fn status(&self) -> RequestStatus {
        match self {
            Self::Confirmed => RequestStatus::Confirmed,
            Self::Rejected => RequestStatus::Rejected,
        }
    }

    /// Label used in logs and metrics
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        self.status().as_str()
    }
}

impl TryFrom<RequestStatus> for BatchTarget {
    type Error = RequestStatus;

    fn try_from(status: RequestStatus) -> Result<Self, Self::Error> {
        match status {
            RequestStatus::Confirmed => Ok(Self::Confirmed),
            RequestStatus::Rejected => Ok(Self::Rejected),
            other => Err(other),
        }
    }
}

/// Requests that changed status during one batch resolution.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    /// Requests that ended CONFIRMED
    pub confirmed: Vec<ParticipationRequest>,
    /// Requests that ended REJECTED, cascade rejections last
    pub rejected: Vec<ParticipationRequest>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn request(id: i64, secs: i64) -> ParticipationRequest {
        ParticipationRequest {
            id: RequestId::new(id),
            event_id: EventId::new(1),
            requester_id: UserId::new(id + 100),
            status: RequestStatus::Pending,
            created_at: Utc.timestamp_opt(secs, 0).single().unwrap_or_default(),
        }
    }

    #[test]
    fn test_admission_order_uses_id_on_equal_timestamps() {
        let a = request(7, 10);
        let b = request(3, 10);
        let c = request(1, 20);

        let mut all = vec![c.clone(), a.clone(), b.clone()];
        all.sort_by(ParticipationRequest::admission_order);

        assert_eq!(all, vec![b, a, c]);
    }

    #[test]
    fn test_newest_first_is_reverse_order() {
        let mut all = vec![request(1, 1), request(2, 2), request(3, 2)];
        all.sort_by(ParticipationRequest::newest_first);

        let ids: Vec<i64> = all.iter().map(|r| r.id.value()).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[test]
    fn test_status_transitions() {
        use RequestStatus::{Canceled, Confirmed, Pending, Rejected};

        assert!(Pending.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(Rejected));
        assert!(Pending.can_transition_to(Canceled));
        assert!(Confirmed.can_transition_to(Canceled));
        assert!(Canceled.can_transition_to(Canceled));

        assert!(!Confirmed.can_transition_to(Rejected));
        assert!(!Rejected.can_transition_to(Confirmed));
        assert!(!Canceled.can_transition_to(Pending));
        assert!(!Rejected.can_transition_to(Pending));
    }

    #[test]
    fn test_transition_carries_current_status() {
        let pending = request(4, 10);

        let change = StatusChange::transition(&pending, RequestStatus::Confirmed).unwrap();

        assert_eq!(
            change,
            StatusChange::new(RequestId::new(4), RequestStatus::Pending, RequestStatus::Confirmed)
        );
    }

    #[test]
    fn test_transition_refuses_leaving_terminal_status() {
        let mut confirmed = request(4, 10);
        confirmed.status = RequestStatus::Confirmed;

        let err = StatusChange::transition(&confirmed, RequestStatus::Rejected).unwrap_err();

        assert_eq!(
            err,
            RuleViolation::InvalidTransition {
                request_id: RequestId::new(4),
                from: RequestStatus::Confirmed,
                to: RequestStatus::Rejected,
            }
        );
        assert!(StatusChange::transition(&confirmed, RequestStatus::Canceled).is_ok());
    }

    #[test]
    fn test_status_string_round_trip() {
        for status in [
            RequestStatus::Pending,
            RequestStatus::Confirmed,
            RequestStatus::Rejected,
            RequestStatus::Canceled,
        ] {
            assert_eq!(RequestStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RequestStatus::parse("confirmed"), None);
    }

    #[test]
    fn test_remaining_saturates() {
        assert_eq!(ParticipantLimit::new(2).remaining(1), Some(1));
        assert_eq!(ParticipantLimit::new(2).remaining(5), Some(0));
        assert_eq!(ParticipantLimit::UNLIMITED.remaining(1000), None);
    }

    #[test]
    fn test_moderated_requires_finite_limit() {
        let mut event = EventDescriptor {
            id: EventId::new(1),
            owner_id: UserId::new(1),
            participant_limit: ParticipantLimit::new(3),
            requires_moderation: true,
            state: EventState::Published,
        };
        assert!(event.is_moderated());

        event.participant_limit = ParticipantLimit::UNLIMITED;
        assert!(!event.is_moderated());
    }

    #[test]
    fn test_wire_format_is_camel_case() {
        let json = serde_json::to_value(request(5, 0)).unwrap_or_default();
        assert_eq!(json["requesterId"], 105);
        assert_eq!(json["status"], "PENDING");
        assert!(json.get("createdAt").is_some());
    }

    #[test]
    fn test_batch_target_from_status() {
        assert_eq!(
            BatchTarget::try_from(RequestStatus::Confirmed),
            Ok(BatchTarget::Confirmed)
        );
        assert_eq!(
            BatchTarget::try_from(RequestStatus::Pending),
            Err(RequestStatus::Pending)
        );
    }
}
