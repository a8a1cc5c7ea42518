//! Builders for test data.

use admission_core::{EventDescriptor, EventId, EventState, ParticipantLimit, UserId};

/// Builder for [`EventDescriptor`] with test-friendly defaults:
/// published, unlimited, no moderation.
///
/// # Example
///
/// ```
/// use admission_testing::fixtures::EventBuilder;
///
/// let event = EventBuilder::new(1, 10).limit(2).moderated().build();
/// assert!(event.is_moderated());
/// ```
#[derive(Debug, Clone)]
pub struct EventBuilder {
    event: EventDescriptor,
}

impl EventBuilder {
    /// Start building event `id` owned by user `owner`
    #[must_use]
    pub const fn new(id: i64, owner: i64) -> Self {
        Self {
            event: EventDescriptor {
                id: EventId::new(id),
                owner_id: UserId::new(owner),
                participant_limit: ParticipantLimit::UNLIMITED,
                requires_moderation: false,
                state: EventState::Published,
            },
        }
    }

    /// Set the participant limit (0 = unlimited)
    #[must_use]
    pub const fn limit(mut self, limit: u32) -> Self {
        self.event.participant_limit = ParticipantLimit::new(limit);
        self
    }

    /// Require owner moderation of new requests
    #[must_use]
    pub const fn moderated(mut self) -> Self {
        self.event.requires_moderation = true;
        self
    }

    /// Set the publication state
    #[must_use]
    pub const fn state(mut self, state: EventState) -> Self {
        self.event.state = state;
        self
    }

    /// Finish
    #[must_use]
    pub fn build(self) -> EventDescriptor {
        self.event
    }
}
