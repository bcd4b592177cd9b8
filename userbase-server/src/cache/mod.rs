//! Process-wide cache client with exactly-once initialization
//!
//! The first call to [`CacheInitializer::init`] dials the cache and verifies
//! it; every later or concurrent call observes that same outcome. There is no
//! retry loop: a failed first dial stays failed for the life of the process.

pub mod redis;

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::OnceCell;

pub use self::redis::{CacheClient, RedisDialer};

/// Default bound on the initial dial and ping.
pub const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_secs(5);

/// First-attempt failure. Cloned to every caller of `init`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InitError {
    #[error("failed to open cache client: {0}")]
    Open(String),

    #[error("cache ping failed: {0}")]
    Ping(String),

    #[error("cache did not answer within {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    #[error("cache client is not initialized")]
    NotInitialized,

    #[error("cache initialization failed: {0}")]
    InitFailed(InitError),

    #[error("cache backend error: {0}")]
    Backend(String),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Opens and verifies a cache client.
#[async_trait]
pub trait CacheDialer: Send + Sync + 'static {
    type Client: Clone + Send + Sync + 'static;

    async fn dial(&self, address: &str) -> Result<Self::Client, InitError>;
}

/// Holds the one cache client the process uses.
pub struct CacheInitializer<D: CacheDialer = RedisDialer> {
    dialer: D,
    client: OnceCell<Result<D::Client, InitError>>,
}

impl<D: CacheDialer> CacheInitializer<D> {
    pub fn new(dialer: D) -> Self {
        Self {
            dialer,
            client: OnceCell::new(),
        }
    }

    pub fn dialer(&self) -> &D {
        &self.dialer
    }

    /// Dial once. Later calls, concurrent or not, return the first result.
    pub async fn init(&self, address: &str, timeout: Duration) -> Result<(), InitError> {
        let outcome = self
            .client
            .get_or_init(|| async {
                let dialed = match tokio::time::timeout(timeout, self.dialer.dial(address)).await {
                    Ok(result) => result,
                    Err(_) => Err(InitError::Timeout(timeout)),
                };
                match &dialed {
                    Ok(_) => tracing::info!("connected to cache"),
                    Err(e) => tracing::error!(error = %e, "cache initialization failed"),
                }
                dialed
            })
            .await;

        outcome.as_ref().map(|_| ()).map_err(Clone::clone)
    }

    /// The client, or a fast failure when `init` never succeeded.
    pub fn get(&self) -> CacheResult<D::Client> {
        match self.client.get() {
            Some(Ok(client)) => Ok(client.clone()),
            Some(Err(e)) => Err(CacheError::InitFailed(e.clone())),
            None => Err(CacheError::NotInitialized),
        }
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.client.get(), Some(Ok(_)))
    }
}
