//! # Admission Core
//!
//! Data model, collaborator traits and pure decision logic for admitting
//! participants to capacity-limited events.
//!
//! ## Core Concepts
//!
//! - **Event descriptor**: capacity, moderation flag, publication state and
//!   owner of an event, supplied by the event service
//! - **Participation request**: one user's request to join one event, with a
//!   status in {PENDING, CONFIRMED, REJECTED, CANCELED}
//! - **Admission order**: `created_at` ascending, then `id` ascending
//! - **Event scope**: the per-event lock under which the confirmed count is
//!   read and statuses are written
//!
//! ## Architecture Principles
//!
//! - Functional core: [`admission`] decides, it never does I/O
//! - Imperative shell: the runtime crate loads data through the [`store`]
//!   traits and applies the decisions
//! - Dependency injection: collaborators and the [`environment::Clock`] are
//!   passed in as trait objects
//!
//! ## Example
//!
//! ```
//! use admission_core::admission::decide_creation;
//! use admission_core::{EventDescriptor, EventId, EventState, ParticipantLimit, RequestStatus, UserId};
//!
//! let event = EventDescriptor {
//!     id: EventId::new(1),
//!     owner_id: UserId::new(10),
//!     participant_limit: ParticipantLimit::new(2),
//!     requires_moderation: true,
//!     state: EventState::Published,
//! };
//!
//! let status = decide_creation(&event, UserId::new(11), None, 0);
//! assert_eq!(status, Ok(RequestStatus::Pending));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod admission;
pub mod error;
pub mod store;
pub mod types;

pub use error::{AdmissionError, ErrorKind, Result, RuleViolation, StoreError};
pub use store::{EventDirectory, EventScope, RequestStore, StoreResult, UserDirectory};
pub use types::*;

/// Environment module - Dependency injection traits
///
/// All external dependencies are abstracted behind traits and injected
/// via the controller's environment.
pub mod environment {
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicI64, Ordering};

    /// Clock trait - abstracts time operations for testability
    ///
    /// Request creation timestamps come from here, so the clock decides the
    /// admission order of requests created in the same instant.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// // Test - fixed time for deterministic tests
    /// struct FixedClock { time: DateTime<Utc> }
    /// impl Clock for FixedClock {
    ///     fn now(&self) -> DateTime<Utc> {
    ///         self.time
    ///     }
    /// }
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    ///
    /// Readings never go backwards: if the wall clock steps back (NTP, VM
    /// migration) the last reading is repeated until it catches up. Readings
    /// are truncated to microseconds, the precision `timestamptz` stores.
    /// Only readings from the same instance are ordered.
    #[derive(Debug, Default)]
    pub struct SystemClock {
        last_micros: AtomicI64,
    }

    impl SystemClock {
        /// Create a clock with no previous reading
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        fn clamp(&self, micros: i64) -> i64 {
            let previous = self.last_micros.fetch_max(micros, Ordering::SeqCst);
            previous.max(micros)
        }
    }

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            let now = Utc::now();
            DateTime::from_timestamp_micros(self.clamp(now.timestamp_micros())).unwrap_or(now)
        }
    }

}
