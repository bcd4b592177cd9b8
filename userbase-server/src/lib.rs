//! userbase-server: user CRUD over a self-healing database connection
//!
//! The interesting part lives in [`db`]: a connection manager that probes the
//! shared pool on every request and rebuilds it, once, when it goes bad. The
//! cache client is initialized exactly once in [`cache`]. Everything in
//! [`http`] and [`services`] is thin wiring on top.

pub mod cache;
pub mod db;
pub mod http;
pub mod services;

pub use cache::{CacheClient, CacheInitializer, RedisDialer};
pub use db::{ConnectionManager, Connector, FailurePolicy, PgStore, PoolConfig, RetryPolicy};
pub use http::{run_server, AppState, ServerConfig};
