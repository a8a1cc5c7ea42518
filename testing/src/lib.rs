//! # Admission Testing
//!
//! Testing utilities and helpers for event admission.
//!
//! This crate provides:
//! - Deterministic clocks ([`FixedClock`], [`SteppingClock`])
//! - In-memory collaborators ([`InMemoryDirectory`], [`InMemoryRequestStore`])
//! - Fixture builders for events ([`fixtures::EventBuilder`])
//!
//! ## Example
//!
//! ```ignore
//! use admission_testing::{InMemoryDirectory, InMemoryRequestStore, SteppingClock};
//!
//! #[tokio::test]
//! async fn test_join_event() {
//!     let directory = InMemoryDirectory::new();
//!     directory.add_event(EventBuilder::new(1, 10).limit(2).moderated().build());
//!     directory.add_users([10, 11]);
//!
//!     let controller = AdmissionController::new(env(directory, InMemoryRequestStore::new()));
//!     let request = controller.create_request(UserId::new(11), EventId::new(1)).await?;
//!     assert_eq!(request.status, RequestStatus::Pending);
//! }
//! ```

use admission_core::environment::Clock;
use chrono::{DateTime, Duration, Utc};

mod directory_mocks;
pub mod fixtures;
mod store_mocks;

pub use directory_mocks::InMemoryDirectory;
pub use store_mocks::InMemoryRequestStore;

/// Mock implementations for testing.
pub mod mocks {
    use super::{Clock, DateTime, Duration, Utc};
    use std::sync::Mutex;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, so every request created through it
    /// ties on `created_at` and admission order falls back to the ID.
    ///
    /// # Example
    ///
    /// ```
    /// use admission_testing::mocks::FixedClock;
    /// use admission_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that advances by a fixed step on every reading.
    ///
    /// Gives each created request a distinct, increasing `created_at`.
    #[derive(Debug)]
    pub struct SteppingClock {
        next: Mutex<DateTime<Utc>>,
        step: Duration,
    }

    impl SteppingClock {
        /// Start at `start`, advancing by `step` per reading
        #[must_use]
        pub const fn new(start: DateTime<Utc>, step: Duration) -> Self {
            Self {
                next: Mutex::new(start),
                step,
            }
        }

        /// Peek at the time the next reading will return
        #[must_use]
        pub fn peek(&self) -> DateTime<Utc> {
            match self.next.lock() {
                Ok(guard) => *guard,
                Err(poisoned) => *poisoned.into_inner(),
            }
        }
    }

    impl Clock for SteppingClock {
        fn now(&self) -> DateTime<Utc> {
            let mut next = match self.next.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let now = *next;
            *next = now + self.step;
            now
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(epoch())
    }

    /// Create a stepping clock starting at 2025-01-01 00:00:00 UTC, one second per reading
    #[must_use]
    pub fn stepping_clock() -> SteppingClock {
        SteppingClock::new(epoch(), Duration::seconds(1))
    }

    fn epoch() -> DateTime<Utc> {
        DateTime::from_timestamp(1_735_689_600, 0).unwrap_or_default()
    }
}

/// Install a `tracing` subscriber that writes to the test output.
///
/// Safe to call from every test; only the first call installs.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use mocks::{FixedClock, SteppingClock, stepping_clock, test_clock};
