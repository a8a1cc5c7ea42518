//! # Admission Runtime
//!
//! Runs the admission decisions from `admission-core` against real
//! collaborators.
//!
//! ## Core Components
//!
//! - **Controller**: [`AdmissionController`] exposes the five admission
//!   operations and owns the event-scope lifecycle
//! - **Retry**: [`retry::RetryPolicy`] re-runs an operation from scratch when
//!   a concurrent writer invalidated its snapshot
//! - **Metrics**: counters and histograms for every state change
//!
//! ## Example
//!
//! ```ignore
//! use admission_runtime::{AdmissionController, AdmissionEnvironment};
//!
//! let controller = AdmissionController::new(AdmissionEnvironment::new(
//!     clock, events, users, requests,
//! ));
//!
//! let request = controller.create_request(requester_id, event_id).await?;
//! let outcome = controller
//!     .resolve_batch(owner_id, event_id, &[request.id], BatchTarget::Confirmed)
//!     .await?;
//! ```

/// Admission operations
pub mod controller;

/// Prometheus metrics for observability
pub mod metrics;

/// Retry logic with exponential backoff
pub mod retry;

pub use controller::{AdmissionController, AdmissionEnvironment};
pub use retry::RetryPolicy;
