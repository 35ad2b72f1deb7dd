//! Axum HTTP API over the shorts pipeline.
//!
//! This crate provides:
//! - Stage trigger endpoints (download, process, authenticate, upload)
//! - Multipart file intake
//! - Job polling and server-sent progress events
//! - Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
