//! Row types and their conversion into domain types.

use admission_core::{
    EventDescriptor, EventId, EventState, ParticipantLimit, ParticipationRequest, RequestId,
    RequestStatus, StoreError, UserId,
};
use chrono::{DateTime, Utc};

/// Column list matching [`RequestRow`]
pub(crate) const REQUEST_COLUMNS: &str = "id, event_id, requester_id, status, created_at";

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct RequestRow {
    id: i64,
    event_id: i64,
    requester_id: i64,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<RequestRow> for ParticipationRequest {
    type Error = StoreError;

    fn try_from(row: RequestRow) -> Result<Self, Self::Error> {
        let status = RequestStatus::parse(&row.status).ok_or_else(|| {
            StoreError::Database(format!(
                "Invalid status '{}' on request {}",
                row.status, row.id
            ))
        })?;

        Ok(Self {
            id: RequestId::new(row.id),
            event_id: EventId::new(row.event_id),
            requester_id: UserId::new(row.requester_id),
            status,
            created_at: row.created_at,
        })
    }
}

/// Convert a batch of rows, failing on the first malformed one.
pub(crate) fn into_requests(rows: Vec<RequestRow>) -> Result<Vec<ParticipationRequest>, StoreError> {
    rows.into_iter().map(ParticipationRequest::try_from).collect()
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct EventRow {
    id: i64,
    owner_id: i64,
    participant_limit: i32,
    requires_moderation: bool,
    state: String,
}

impl TryFrom<EventRow> for EventDescriptor {
    type Error = StoreError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let state = EventState::parse(&row.state).ok_or_else(|| {
            StoreError::Database(format!("Invalid state '{}' on event {}", row.state, row.id))
        })?;
        let limit = u32::try_from(row.participant_limit).map_err(|_| {
            StoreError::Database(format!(
                "Negative participant limit {} on event {}",
                row.participant_limit, row.id
            ))
        })?;

        Ok(Self {
            id: EventId::new(row.id),
            owner_id: UserId::new(row.owner_id),
            participant_limit: ParticipantLimit::new(limit),
            requires_moderation: row.requires_moderation,
            state,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;

    #[test]
    fn test_request_row_conversion() {
        let row = RequestRow {
            id: 3,
            event_id: 1,
            requester_id: 2,
            status: "PENDING".to_string(),
            created_at: Utc::now(),
        };
        let request = ParticipationRequest::try_from(row).unwrap();
        assert_eq!(request.status, RequestStatus::Pending);
        assert_eq!(request.id, RequestId::new(3));
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let row = RequestRow {
            id: 3,
            event_id: 1,
            requester_id: 2,
            status: "WAITLISTED".to_string(),
            created_at: Utc::now(),
        };
        assert!(matches!(
            ParticipationRequest::try_from(row),
            Err(StoreError::Database(_))
        ));
    }

    #[test]
    fn test_event_row_conversion() {
        let row = EventRow {
            id: 1,
            owner_id: 9,
            participant_limit: 0,
            requires_moderation: true,
            state: "PUBLISHED".to_string(),
        };
        let event = EventDescriptor::try_from(row).unwrap();
        assert!(event.participant_limit.is_unlimited());
        assert!(event.is_published());

        let row = EventRow {
            id: 1,
            owner_id: 9,
            participant_limit: -1,
            requires_moderation: true,
            state: "PUBLISHED".to_string(),
        };
        assert!(EventDescriptor::try_from(row).is_err());
    }
}
