//! `PostgreSQL` persistence for event admission.
//!
//! - [`PostgresRequestStore`]: participation requests, with event scopes
//!   implemented as a transaction holding `SELECT ... FOR UPDATE` on the
//!   event row
//! - [`PostgresDirectory`]: read-only lookups in the `events` and `users`
//!   tables owned by the surrounding services
//!
//! # Example
//!
//! ```no_run
//! use admission_postgres::{PostgresDirectory, PostgresRequestStore};
//! use sqlx::PgPool;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = PgPool::connect("postgres://localhost/admission").await?;
//! let requests = PostgresRequestStore::new(pool.clone());
//! requests.migrate().await?;
//! let directory = PostgresDirectory::new(pool);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod directory;
mod request_store;
mod rows;

pub use directory::PostgresDirectory;
pub use request_store::PostgresRequestStore;

use admission_core::StoreError;

/// Map a sqlx error to a [`StoreError`], keeping the constraint and
/// concurrency cases distinguishable.
pub(crate) fn store_error(context: &str, error: &sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = error {
        if db_err.is_unique_violation() {
            return StoreError::UniqueViolation(db_err.message().to_string());
        }
        // serialization_failure, deadlock_detected
        if matches!(db_err.code().as_deref(), Some("40001" | "40P01")) {
            return StoreError::Conflict(format!("{context}: {}", db_err.message()));
        }
    }
    StoreError::Database(format!("{context}: {error}"))
}
