//! Axum HTTP API server.
//!
//! This crate provides:
//! - The restoration, video, and translation endpoints
//! - Per-IP rate limiting and per-caller restoration quota
//! - Security headers and request-id propagation
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
