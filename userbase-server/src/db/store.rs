//! Store abstraction - the seam between the connection manager and the database
//!
//! The manager never talks to sqlx directly. It opens, pings and closes
//! handles through [`Store`], so tests can drive the reconnect protocol with
//! an in-memory stub.

use std::time::Duration;

use async_trait::async_trait;

/// Pool limits applied once per successful connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Upper bound on open connections
    pub max_open: u32,
    /// Connections kept warm while idle
    pub max_idle: u32,
    /// Connections older than this are recycled
    pub max_lifetime: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_open: 10,
            max_idle: 5,
            max_lifetime: Duration::from_secs(30 * 60),
        }
    }
}

/// Failure of a single open or ping.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("store unreachable: {0}")]
    Unreachable(String),
}

/// A backend that can produce, probe and dispose of connection handles.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Opaque handle shared by every request; cloning must be cheap.
    type Handle: Clone + Send + Sync + 'static;

    /// Open a fresh handle with the given pool limits.
    async fn open(&self, pool: &PoolConfig) -> Result<Self::Handle, StoreError>;

    /// One round-trip to the backend.
    async fn ping(&self, handle: &Self::Handle) -> Result<(), StoreError>;

    /// Release the handle. Default drops it.
    async fn close(&self, handle: Self::Handle) {
        drop(handle);
    }
}
