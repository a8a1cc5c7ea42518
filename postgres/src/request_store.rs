//! Participation request store.
//!
//! An event scope is a transaction that starts by locking the event row:
//!
//! ```text
//! BEGIN
//! SELECT id FROM events WHERE id = $1 FOR UPDATE      -- blocks other scopes on this event
//! SELECT ... FROM participation_requests ...          -- consistent with the lock
//! INSERT / UPDATE ... WHERE id = $1 AND status = $2   -- compare-and-set per row
//! COMMIT                                              -- or ROLLBACK on drop
//! ```
//!
//! Every writer of a request row (creation, cancellation, batch resolution)
//! goes through the event lock first, so the confirmed count read inside a
//! scope cannot move until the scope ends. The row lock also holds back
//! `UPDATE events`, so an event descriptor read after [`RequestStore::lock_event`]
//! stays current until the scope ends.

use crate::rows::{REQUEST_COLUMNS, RequestRow, into_requests};
use crate::store_error;
use admission_core::{
    EventId, EventScope, NewRequest, ParticipationRequest, RequestId, RequestStatus,
    RequestStore, StatusChange, StoreError, StoreResult, UserId,
};
use async_trait::async_trait;
use sqlx::{Acquire, PgPool, Postgres, Transaction};

/// `PostgreSQL`-backed [`RequestStore`].
#[derive(Clone, Debug)]
pub struct PostgresRequestStore {
    pool: PgPool,
}

impl PostgresRequestStore {
    /// Create a store over `pool`
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying connection pool
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run the embedded database migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a migration fails.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Migration failed: {e}")))?;
        tracing::info!("Database migrations applied");
        Ok(())
    }

    /// Check that the database answers.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the round trip fails.
    pub async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| store_error("Database ping failed", &e))?;
        Ok(())
    }

    async fn list_where(&self, column: &str, value: i64) -> StoreResult<Vec<ParticipationRequest>> {
        let sql = format!(
            "SELECT {REQUEST_COLUMNS} FROM participation_requests \
             WHERE {column} = $1 ORDER BY created_at DESC, id DESC"
        );
        let rows: Vec<RequestRow> = sqlx::query_as(&sql)
            .bind(value)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| store_error("Failed to list requests", &e))?;
        into_requests(rows)
    }
}

#[async_trait]
impl RequestStore for PostgresRequestStore {
    async fn lock_event(&self, event_id: EventId) -> StoreResult<Box<dyn EventScope>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| store_error("Failed to start transaction", &e))?;

        let locked: Option<i64> = sqlx::query_scalar("SELECT id FROM events WHERE id = $1 FOR UPDATE")
            .bind(event_id.value())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| store_error("Failed to lock event", &e))?;

        if locked.is_none() {
            return Err(StoreError::NotFound(format!("event {event_id}")));
        }

        tracing::trace!(%event_id, "Event locked");
        Ok(Box::new(PgEventScope { event_id, tx }))
    }

    async fn get(&self, request_id: RequestId) -> StoreResult<Option<ParticipationRequest>> {
        let sql = format!("SELECT {REQUEST_COLUMNS} FROM participation_requests WHERE id = $1");
        let row: Option<RequestRow> = sqlx::query_as(&sql)
            .bind(request_id.value())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| store_error("Failed to load request", &e))?;
        row.map(ParticipationRequest::try_from).transpose()
    }

    async fn list_by_requester(
        &self,
        requester_id: UserId,
    ) -> StoreResult<Vec<ParticipationRequest>> {
        self.list_where("requester_id", requester_id.value()).await
    }

    async fn list_by_event(&self, event_id: EventId) -> StoreResult<Vec<ParticipationRequest>> {
        self.list_where("event_id", event_id.value()).await
    }
}

/// Transaction holding the row lock of one event.
struct PgEventScope {
    event_id: EventId,
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl EventScope for PgEventScope {
    fn event_id(&self) -> EventId {
        self.event_id
    }

    async fn count_confirmed(&mut self) -> StoreResult<u32> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM participation_requests WHERE event_id = $1 AND status = $2",
        )
        .bind(self.event_id.value())
        .bind(RequestStatus::Confirmed.as_str())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| store_error("Failed to count confirmed requests", &e))?;

        u32::try_from(count).map_err(|e| StoreError::Database(e.to_string()))
    }

    async fn find_for_requester(
        &mut self,
        requester_id: UserId,
    ) -> StoreResult<Option<ParticipationRequest>> {
        let sql = format!(
            "SELECT {REQUEST_COLUMNS} FROM participation_requests \
             WHERE event_id = $1 AND requester_id = $2"
        );
        let row: Option<RequestRow> = sqlx::query_as(&sql)
            .bind(self.event_id.value())
            .bind(requester_id.value())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| store_error("Failed to look up existing request", &e))?;
        row.map(ParticipationRequest::try_from).transpose()
    }

    async fn find_by_ids(&mut self, ids: &[RequestId]) -> StoreResult<Vec<ParticipationRequest>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let raw: Vec<i64> = ids.iter().map(RequestId::value).collect();
        let sql = format!("SELECT {REQUEST_COLUMNS} FROM participation_requests WHERE id = ANY($1)");
        let rows: Vec<RequestRow> = sqlx::query_as(&sql)
            .bind(raw)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| store_error("Failed to load requests", &e))?;
        into_requests(rows)
    }

    async fn find_pending(&mut self) -> StoreResult<Vec<ParticipationRequest>> {
        let sql = format!(
            "SELECT {REQUEST_COLUMNS} FROM participation_requests \
             WHERE event_id = $1 AND status = $2 ORDER BY created_at, id"
        );
        let rows: Vec<RequestRow> = sqlx::query_as(&sql)
            .bind(self.event_id.value())
            .bind(RequestStatus::Pending.as_str())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| store_error("Failed to load pending requests", &e))?;
        into_requests(rows)
    }

    async fn insert(&mut self, request: NewRequest) -> StoreResult<ParticipationRequest> {
        // A failed INSERT aborts the transaction; the savepoint keeps the
        // scope usable for the caller's error path
        let mut savepoint = Acquire::begin(&mut self.tx)
            .await
            .map_err(|e| store_error("Failed to open savepoint", &e))?;

        let sql = format!(
            "INSERT INTO participation_requests (event_id, requester_id, status, created_at) \
             VALUES ($1, $2, $3, $4) RETURNING {REQUEST_COLUMNS}"
        );
        let row: RequestRow = sqlx::query_as(&sql)
            .bind(request.event_id.value())
            .bind(request.requester_id.value())
            .bind(request.status.as_str())
            .bind(request.created_at)
            .fetch_one(&mut *savepoint)
            .await
            .map_err(|e| store_error("Failed to insert request", &e))?;

        savepoint
            .commit()
            .await
            .map_err(|e| store_error("Failed to release savepoint", &e))?;
        ParticipationRequest::try_from(row)
    }

    async fn apply_status_changes(
        &mut self,
        changes: &[StatusChange],
    ) -> StoreResult<Vec<ParticipationRequest>> {
        let mut savepoint = Acquire::begin(&mut self.tx)
            .await
            .map_err(|e| store_error("Failed to open savepoint", &e))?;

        let sql = format!(
            "UPDATE participation_requests SET status = $3 \
             WHERE id = $1 AND status = $2 RETURNING {REQUEST_COLUMNS}"
        );
        let mut updated = Vec::with_capacity(changes.len());
        for change in changes {
            let row: Option<RequestRow> = sqlx::query_as(&sql)
                .bind(change.request_id.value())
                .bind(change.from.as_str())
                .bind(change.to.as_str())
                .fetch_optional(&mut *savepoint)
                .await
                .map_err(|e| store_error("Failed to update request status", &e))?;

            // Dropping the savepoint rolls back the changes applied so far
            let Some(row) = row else {
                return Err(StoreError::Conflict(format!(
                    "request {} is no longer {}",
                    change.request_id, change.from
                )));
            };
            updated.push(ParticipationRequest::try_from(row)?);
        }

        savepoint
            .commit()
            .await
            .map_err(|e| store_error("Failed to release savepoint", &e))?;
        Ok(updated)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let event_id = self.event_id;
        self.tx
            .commit()
            .await
            .map_err(|e| store_error("Failed to commit", &e))?;
        tracing::trace!(%event_id, "Event scope committed");
        Ok(())
    }
}
