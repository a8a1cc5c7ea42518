//! Read-only lookups in the `events` and `users` tables.

use crate::rows::EventRow;
use crate::store_error;
use admission_core::{
    EventDescriptor, EventDirectory, EventId, StoreResult, UserDirectory, UserId,
};
use async_trait::async_trait;
use sqlx::PgPool;

/// Event and user directory backed by `PostgreSQL`.
#[derive(Clone, Debug)]
pub struct PostgresDirectory {
    pool: PgPool,
}

impl PostgresDirectory {
    /// Create a directory over `pool`
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventDirectory for PostgresDirectory {
    async fn get_event(&self, event_id: EventId) -> StoreResult<Option<EventDescriptor>> {
        let row: Option<EventRow> = sqlx::query_as(
            r"
            SELECT id, owner_id, participant_limit, requires_moderation, state
            FROM events
            WHERE id = $1
            ",
        )
        .bind(event_id.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_error("Failed to load event", &e))?;

        row.map(EventDescriptor::try_from).transpose()
    }
}

#[async_trait]
impl UserDirectory for PostgresDirectory {
    async fn user_exists(&self, user_id: UserId) -> StoreResult<bool> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
            .bind(user_id.value())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| store_error("Failed to look up user", &e))
    }
}
