//! Repository implementations for database access
//!
//! Repositories borrow the pool handed out by the connection manager and
//! never hold on to it past the request.

pub mod users;

pub use users::{User, UserRepo};

/// Database error type
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("not found: {resource} '{id}'")]
    NotFound { resource: &'static str, id: String },
}
