//! Bounded-retry connection establishment
//!
//! Each attempt opens a handle and pings it. The first attempt that passes
//! both wins; between failed attempts the connector sleeps a fixed delay.

use std::time::Duration;

use super::health::HealthProbe;
use super::store::{PoolConfig, Store, StoreError};

/// Fixed-delay retry schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

#[derive(Debug, thiserror::Error)]
#[error("retry policy needs at least one attempt")]
pub struct ZeroAttempts;

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Result<Self, ZeroAttempts> {
        if max_attempts == 0 {
            return Err(ZeroAttempts);
        }
        Ok(Self {
            max_attempts,
            delay,
        })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            delay: Duration::from_secs(5),
        }
    }
}

/// Every attempt failed.
#[derive(Debug, thiserror::Error)]
#[error("failed to connect after {attempts} attempts: {cause}")]
pub struct ConnectError {
    pub attempts: u32,
    #[source]
    pub cause: StoreError,
}

/// Produces one healthy handle from a [`Store`], or fails after the policy is spent.
pub struct Connector<S: Store> {
    store: S,
    policy: RetryPolicy,
    pool: PoolConfig,
    probe: HealthProbe,
}

impl<S: Store> Connector<S> {
    pub fn new(store: S, policy: RetryPolicy, pool: PoolConfig) -> Self {
        Self {
            store,
            policy,
            pool,
            probe: HealthProbe::default(),
        }
    }

    pub fn with_probe(mut self, probe: HealthProbe) -> Self {
        self.probe = probe;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn probe(&self) -> &HealthProbe {
        &self.probe
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn connect(&self) -> Result<S::Handle, ConnectError> {
        let max_attempts = self.policy.max_attempts;
        let mut attempt = 1;

        loop {
            let cause = match self.attempt().await {
                Ok(handle) => {
                    tracing::info!(attempt, "connected to database");
                    return Ok(handle);
                }
                Err(e) => e,
            };

            if attempt >= max_attempts {
                tracing::error!(attempts = attempt, error = %cause, "giving up on database connection");
                return Err(ConnectError {
                    attempts: attempt,
                    cause,
                });
            }

            tracing::warn!(
                attempt,
                max_attempts,
                error = %cause,
                retry_in = ?self.policy.delay,
                "database connection attempt failed"
            );
            tokio::time::sleep(self.policy.delay).await;
            attempt += 1;
        }
    }

    async fn attempt(&self) -> Result<S::Handle, StoreError> {
        let handle = self.store.open(&self.pool).await?;
        if let Err(e) = self.probe.check(&self.store, &handle).await {
            self.store.close(handle).await;
            return Err(e);
        }
        Ok(handle)
    }
}
