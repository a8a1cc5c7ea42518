//! HTTP surface for event admission control.
//!
//! A thin axum layer over [`admission_runtime::AdmissionController`]:
//! handlers parse the path, query and body, call one controller operation
//! and map [`admission_core::AdmissionError`] onto a status code.
//!
//! # Modules
//!
//! - [`config`]: environment configuration
//! - [`error`]: [`error::AppError`] and the error-to-status mapping
//! - [`handlers`]: request lifecycle and health endpoints
//! - [`middleware`]: correlation ID propagation
//! - [`routes`]: the assembled router
//! - [`state`]: shared handler state
//!
//! # Example
//!
//! ```ignore
//! let state = AppState::new(controller, Arc::new(store)).with_metrics(handle);
//! let app = build_router(state);
//! axum::serve(listener, app).await?;
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::AppError;
pub use routes::build_router;
pub use state::AppState;
