//! HTTP handlers.
//!
//! - [`requests`]: the participation request lifecycle
//! - [`health`]: liveness, readiness and metrics

pub mod health;
pub mod requests;
