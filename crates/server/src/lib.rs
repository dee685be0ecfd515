//! HTTP server for stash, an ephemeral file-sharing service.
//!
//! This crate provides:
//! - Multipart uploads that store a blob and commit its entry
//! - Downloads by slug with cache validators and byte ranges
//! - Static assets served ahead of stored entries
//! - Health and Prometheus endpoints

pub mod content_type;
pub mod error;
pub mod file_server;
pub mod fs;
pub mod handlers;
pub mod metrics;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use metrics::Metrics;
pub use routes::create_router;
pub use state::AppState;
