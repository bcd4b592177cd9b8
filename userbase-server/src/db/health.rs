//! Liveness probe for an established handle

use std::time::Duration;

use super::store::{Store, StoreError};

/// Default bound on a single probe round-trip.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Answers "is this handle usable right now".
#[derive(Debug, Clone, Copy)]
pub struct HealthProbe {
    timeout: Duration,
}

impl Default for HealthProbe {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT)
    }
}

impl HealthProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Ping with a bounded wait, keeping the failure cause.
    pub async fn check<S: Store>(&self, store: &S, handle: &S::Handle) -> Result<(), StoreError> {
        match tokio::time::timeout(self.timeout, store.ping(handle)).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.timeout)),
        }
    }

    /// Any error, timeouts included, reads as unhealthy.
    pub async fn is_healthy<S: Store>(&self, store: &S, handle: &S::Handle) -> bool {
        match self.check(store, handle).await {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(error = %e, "health probe failed");
                false
            }
        }
    }
}
