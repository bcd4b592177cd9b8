//! Database layer - connection lifecycle, migrations and repositories
//!
//! # Design Principles
//!
//! - One shared pool handle, owned by [`ConnectionManager`]
//! - Handles are probed before use and rebuilt when the probe fails
//! - Rebuilds are serialized; concurrent callers share one reconnect
//! - Repositories take the handle per request, never a global

pub mod connector;
pub mod health;
pub mod manager;
pub mod migrations;
pub mod pool;
pub mod repos;
pub mod store;

pub use connector::{ConnectError, Connector, RetryPolicy};
pub use health::HealthProbe;
pub use manager::{ConnectionManager, ConnectionUnavailable, FailurePolicy};
pub use pool::PgStore;
pub use repos::*;
pub use store::{PoolConfig, Store, StoreError};

/// The manager as wired in production.
pub type PgConnectionManager = ConnectionManager<PgStore>;
