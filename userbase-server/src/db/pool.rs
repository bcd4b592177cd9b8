//! PostgreSQL connection pool management
//!
//! Uses sqlx PgPool with explicit connection limits. The pool is the handle
//! the connection manager hands to every request.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Connection, PgPool};

use super::store::{PoolConfig, Store, StoreError};

/// How long `open` waits for the first connection before giving up.
const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// Create a PostgreSQL connection pool with a fixed connection cap.
///
/// Used for short-lived work (migrations) that should not go through the
/// connection manager.
///
/// # Errors
///
/// Returns an error if the connection fails.
pub async fn create_pool_with_options(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(DEFAULT_ACQUIRE_TIMEOUT)
        .connect(database_url)
        .await
}

/// sqlx-backed [`Store`] producing `PgPool` handles.
#[derive(Debug, Clone)]
pub struct PgStore {
    database_url: String,
    acquire_timeout: Duration,
}

impl PgStore {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
        }
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    fn options(&self, pool: &PoolConfig) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(pool.max_open)
            .min_connections(pool.max_idle.min(pool.max_open))
            .max_lifetime(pool.max_lifetime)
            .acquire_timeout(self.acquire_timeout)
    }
}

#[async_trait]
impl Store for PgStore {
    type Handle = PgPool;

    async fn open(&self, pool: &PoolConfig) -> Result<PgPool, StoreError> {
        let handle = self.options(pool).connect(&self.database_url).await?;
        Ok(handle)
    }

    async fn ping(&self, handle: &PgPool) -> Result<(), StoreError> {
        if handle.is_closed() {
            return Err(StoreError::Unreachable("pool is closed".into()));
        }
        // Every connection is checked out by a request; waiting for one would
        // read a busy pool as a dead one
        if is_saturated(
            handle.size(),
            handle.num_idle(),
            handle.options().get_max_connections(),
        ) {
            return Ok(());
        }
        let mut conn = handle.acquire().await?;
        conn.ping().await?;
        Ok(())
    }

    async fn close(&self, handle: PgPool) {
        handle.close().await;
    }
}

fn is_saturated(size: u32, idle: usize, max_connections: u32) -> bool {
    idle == 0 && size >= max_connections
}

#[cfg(test)]
mod tests {
    use super::*;

    // Integration tests require a real database
    // Run with: DATABASE_URL=postgres://... cargo test -p userbase-server -- --ignored

    #[test]
    fn min_connections_never_exceed_max() {
        let store = PgStore::new("postgres://localhost/userbase");
        let options = store.options(&PoolConfig {
            max_open: 2,
            max_idle: 5,
            max_lifetime: Duration::from_secs(60),
        });
        assert_eq!(options.get_max_connections(), 2);
        assert_eq!(options.get_min_connections(), 2);
        assert_eq!(options.get_max_lifetime(), Some(Duration::from_secs(60)));
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn open_and_ping() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let store = PgStore::new(url);
        let pool = store
            .open(&PoolConfig::default())
            .await
            .expect("pool creation failed");

        store.ping(&pool).await.expect("ping failed");

        let result: (i32,) = sqlx::query_as("SELECT 1")
            .fetch_one(&pool)
            .await
            .expect("query failed");
        assert_eq!(result.0, 1);

        store.close(pool).await;
    }

    #[test]
    fn saturation_needs_a_full_pool_with_nothing_idle() {
        assert!(is_saturated(10, 0, 10));
        assert!(!is_saturated(10, 1, 10));
        assert!(!is_saturated(4, 0, 10));
        assert!(!is_saturated(0, 0, 10));
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn ping_succeeds_while_every_connection_is_busy() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let store = PgStore::new(url).with_acquire_timeout(Duration::from_millis(500));
        let config = PoolConfig {
            max_open: 2,
            max_idle: 0,
            max_lifetime: Duration::from_secs(60),
        };
        let pool = store.open(&config).await.expect("open failed");

        let _first = pool.acquire().await.expect("acquire failed");
        let _second = pool.acquire().await.expect("acquire failed");

        store.ping(&pool).await.expect("busy pool reported as lost");
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn ping_fails_after_close() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let store = PgStore::new(url);
        let pool = store.open(&PoolConfig::default()).await.expect("open failed");

        pool.close().await;
        assert!(store.ping(&pool).await.is_err());
    }
}
