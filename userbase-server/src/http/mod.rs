//! HTTP server layer
//!
//! Axum server with:
//! - Connection middleware feeding a healthy pool to every data route
//! - Request tracing
//! - Graceful shutdown with a bounded grace period
//! - JSON error responses

pub mod error;
pub mod extractors;
pub mod middleware;
pub mod routes;
pub mod server;

pub use error::ApiError;
pub use server::{build_router, run_server, serve_until, shutdown_signal, AppState, ServerConfig, ServerError};
