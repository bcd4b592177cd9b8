//! Shared connection handle with transparent recovery
//!
//! Every request asks the manager for a handle. The common case is a read
//! lock, a snapshot and a ping. When the ping fails the caller takes the write
//! lock and rebuilds through the [`Connector`]; callers queued behind it see
//! the generation move and go back to the fast path instead of rebuilding
//! again. A failed rebuild is recorded the same way, so the queue shares its
//! error instead of retrying one caller at a time.

use std::sync::Arc;

use tokio::sync::RwLock;

use super::connector::{ConnectError, Connector};
use super::store::Store;

/// What to do when a runtime rebuild exhausts its retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Log and terminate the process. Nothing can be served without a store.
    #[default]
    Exit,
    /// Hand the error to the triggering request; the next call retries.
    Unavailable,
}

/// The rebuild failed and the policy allows the caller to see it.
#[derive(Debug, Clone, thiserror::Error)]
#[error("database connection unavailable: {0}")]
pub struct ConnectionUnavailable(pub Arc<ConnectError>);

impl From<ConnectError> for ConnectionUnavailable {
    fn from(err: ConnectError) -> Self {
        Self(Arc::new(err))
    }
}

struct Slot<H> {
    handle: Option<H>,
    /// Bumped on every installed handle.
    generation: u64,
    /// Bumped on every failed rebuild.
    failures: u64,
    last_failure: Option<ConnectionUnavailable>,
}

impl<H: Clone> Slot<H> {
    fn snapshot(&self) -> (Option<H>, u64, u64) {
        (self.handle.clone(), self.generation, self.failures)
    }
}

/// Owns the one handle the whole process shares.
pub struct ConnectionManager<S: Store> {
    connector: Connector<S>,
    slot: RwLock<Slot<S::Handle>>,
    on_failure: FailurePolicy,
}

impl<S: Store> ConnectionManager<S> {
    pub fn new(connector: Connector<S>, on_failure: FailurePolicy) -> Self {
        Self {
            connector,
            slot: RwLock::new(Slot {
                handle: None,
                generation: 0,
                failures: 0,
                last_failure: None,
            }),
            on_failure,
        }
    }

    pub fn connector(&self) -> &Connector<S> {
        &self.connector
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.on_failure
    }

    /// Establish the first handle. Must succeed before the listener starts.
    pub async fn init(&self) -> Result<(), ConnectError> {
        let mut slot = self.slot.write().await;
        let handle = self.connector.connect().await?;
        slot.handle = Some(handle);
        slot.generation += 1;
        tracing::info!(generation = slot.generation, "connection manager initialized");
        Ok(())
    }

    /// Return a handle that passed its probe, rebuilding it if needed.
    pub async fn get_connection(&self) -> Result<S::Handle, ConnectionUnavailable> {
        loop {
            let (current, seen, seen_failures) = self.slot.read().await.snapshot();

            if let Some(handle) = current {
                if self
                    .connector
                    .probe()
                    .is_healthy(self.connector.store(), &handle)
                    .await
                {
                    return Ok(handle);
                }
                tracing::warn!(generation = seen, "lost database ping, reconnecting");
            }

            let mut slot = self.slot.write().await;
            if slot.generation != seen {
                // Someone else rebuilt while we queued; probe their handle
                continue;
            }
            if slot.failures != seen_failures {
                // Someone else already failed to rebuild while we queued
                if let Some(err) = &slot.last_failure {
                    return Err(err.clone());
                }
            }

            match self.connector.connect().await {
                Ok(handle) => {
                    // The stale handle goes away once in-flight requests drop their clones
                    slot.handle = Some(handle.clone());
                    slot.generation += 1;
                    slot.last_failure = None;
                    tracing::info!(generation = slot.generation, "database handle rebuilt");
                    return Ok(handle);
                }
                Err(e) => {
                    let err = self.rebuild_failed(e);
                    slot.failures += 1;
                    slot.last_failure = Some(err.clone());
                    return Err(err);
                }
            }
        }
    }

    /// Snapshot of the installed handle without probing it.
    pub async fn current(&self) -> Option<S::Handle> {
        self.slot.read().await.handle.clone()
    }

    /// Number of handles installed so far.
    pub async fn generation(&self) -> u64 {
        self.slot.read().await.generation
    }

    /// Probe the installed handle; `false` when there is none.
    pub async fn is_healthy(&self) -> bool {
        match self.current().await {
            Some(handle) => {
                self.connector
                    .probe()
                    .is_healthy(self.connector.store(), &handle)
                    .await
            }
            None => false,
        }
    }

    /// Release the handle. Later calls to `get_connection` reconnect.
    pub async fn close(&self) {
        let handle = self.slot.write().await.handle.take();
        if let Some(handle) = handle {
            self.connector.store().close(handle).await;
            tracing::info!("database handle closed");
        }
    }

    fn rebuild_failed(&self, err: ConnectError) -> ConnectionUnavailable {
        match self.on_failure {
            FailurePolicy::Exit => {
                tracing::error!(error = %err, "unable to reconnect to database, exiting");
                std::process::exit(1);
            }
            FailurePolicy::Unavailable => {
                tracing::error!(error = %err, "unable to reconnect to database");
                ConnectionUnavailable::from(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connector::RetryPolicy;
    use crate::db::store::{PoolConfig, StoreError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::Barrier;

    /// Handles are `Arc<u32>` ids so tests can check identity with `Arc::ptr_eq`.
    /// A handle is healthy when its id is at least `healthy_from`.
    #[derive(Default)]
    struct StubStore {
        opens: AtomicU32,
        healthy_from: AtomicU32,
        refuse_opens: AtomicBool,
        refused: AtomicU32,
        closed: AtomicU32,
        ping_barrier: Mutex<Option<Arc<Barrier>>>,
    }

    impl StubStore {
        fn disconnect_all(&self) {
            let next = self.opens.load(Ordering::SeqCst) + 1;
            self.healthy_from.store(next, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Store for Arc<StubStore> {
        type Handle = Arc<u32>;

        async fn open(&self, _pool: &PoolConfig) -> Result<Arc<u32>, StoreError> {
            if self.refuse_opens.load(Ordering::SeqCst) {
                self.refused.fetch_add(1, Ordering::SeqCst);
                return Err(StoreError::Unreachable("connection refused".into()));
            }
            let id = self.opens.fetch_add(1, Ordering::SeqCst) + 1;
            // Yield so concurrent callers really do pile up behind the write lock
            tokio::task::yield_now().await;
            Ok(Arc::new(id))
        }

        async fn ping(&self, handle: &Arc<u32>) -> Result<(), StoreError> {
            let barrier = self.ping_barrier.lock().unwrap().clone();
            if let Some(barrier) = barrier {
                barrier.wait().await;
            }
            if **handle >= self.healthy_from.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(StoreError::Unreachable("server has gone away".into()))
            }
        }

        async fn close(&self, _handle: Arc<u32>) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn manager(store: Arc<StubStore>, on_failure: FailurePolicy) -> Arc<ConnectionManager<Arc<StubStore>>> {
        let policy = RetryPolicy::new(2, Duration::ZERO).unwrap();
        let connector = Connector::new(store, policy, PoolConfig::default());
        Arc::new(ConnectionManager::new(connector, on_failure))
    }

    #[tokio::test]
    async fn init_installs_first_handle() {
        let store = Arc::new(StubStore::default());
        let mgr = manager(store.clone(), FailurePolicy::Unavailable);

        assert!(mgr.current().await.is_none());
        mgr.init().await.unwrap();

        assert_eq!(mgr.generation().await, 1);
        assert_eq!(*mgr.current().await.unwrap(), 1);
        assert_eq!(store.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn init_failure_reports_attempts() {
        let store = Arc::new(StubStore::default());
        store.refuse_opens.store(true, Ordering::SeqCst);
        let mgr = manager(store, FailurePolicy::Unavailable);

        let err = mgr.init().await.unwrap_err();
        assert_eq!(err.attempts, 2);
        assert!(mgr.current().await.is_none());
    }

    #[tokio::test]
    async fn healthy_handle_is_reused() {
        let store = Arc::new(StubStore::default());
        let mgr = manager(store.clone(), FailurePolicy::Unavailable);
        mgr.init().await.unwrap();

        let first = mgr.get_connection().await.unwrap();
        let second = mgr.get_connection().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_handle_is_built_on_demand() {
        let store = Arc::new(StubStore::default());
        let mgr = manager(store.clone(), FailurePolicy::Unavailable);

        let handle = mgr.get_connection().await.unwrap();
        assert_eq!(*handle, 1);
        assert_eq!(mgr.generation().await, 1);
    }

    #[tokio::test]
    async fn disconnect_triggers_exactly_one_rebuild() {
        let store = Arc::new(StubStore::default());
        let mgr = manager(store.clone(), FailurePolicy::Unavailable);
        mgr.init().await.unwrap();

        let before = mgr.get_connection().await.unwrap();
        assert_eq!(*before, 1);

        store.disconnect_all();

        let after = mgr.get_connection().await.unwrap();
        assert_eq!(*after, 2);
        assert_eq!(store.opens.load(Ordering::SeqCst), 2);

        // New handle is healthy, no further rebuilds
        let again = mgr.get_connection().await.unwrap();
        assert!(Arc::ptr_eq(&after, &again));
        assert_eq!(store.opens.load(Ordering::SeqCst), 2);
        assert_eq!(mgr.generation().await, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_share_a_single_rebuild() {
        let store = Arc::new(StubStore::default());
        let mgr = manager(store.clone(), FailurePolicy::Unavailable);
        mgr.init().await.unwrap();
        store.disconnect_all();

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let mgr = mgr.clone();
                tokio::spawn(async move { mgr.get_connection().await })
            })
            .collect();

        let results: Vec<Arc<u32>> = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|joined| joined.expect("task panicked").expect("rebuild failed"))
            .collect();

        // One open at init, one rebuild for all fifty callers
        assert_eq!(store.opens.load(Ordering::SeqCst), 2);
        assert_eq!(mgr.generation().await, 2);
        let first = &results[0];
        assert_eq!(**first, 2);
        assert!(results.iter().all(|h| Arc::ptr_eq(h, first)));
    }

    #[tokio::test]
    async fn healthy_fast_path_does_not_serialize() {
        let store = Arc::new(StubStore::default());
        let mgr = manager(store.clone(), FailurePolicy::Unavailable);
        mgr.init().await.unwrap();

        // Every probe waits until all ten are in flight at once. If the fast
        // path held an exclusive lock across the probe this would never finish.
        const CALLERS: usize = 10;
        *store.ping_barrier.lock().unwrap() = Some(Arc::new(Barrier::new(CALLERS)));

        let calls = (0..CALLERS).map(|_| mgr.get_connection());
        let results = tokio::time::timeout(Duration::from_secs(5), futures::future::join_all(calls))
            .await
            .expect("fast path serialized concurrent callers");

        assert!(results.iter().all(|r| r.as_ref().map(|h| **h == 1).unwrap_or(false)));
        assert_eq!(store.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unavailable_policy_surfaces_error_and_retries_next_call() {
        let store = Arc::new(StubStore::default());
        let mgr = manager(store.clone(), FailurePolicy::Unavailable);
        mgr.init().await.unwrap();

        store.disconnect_all();
        store.refuse_opens.store(true, Ordering::SeqCst);

        let err = mgr.get_connection().await.unwrap_err();
        assert_eq!(err.0.attempts, 2);
        assert_eq!(mgr.generation().await, 1);

        store.refuse_opens.store(false, Ordering::SeqCst);
        let handle = mgr.get_connection().await.unwrap();
        assert_eq!(*handle, 2);
        assert_eq!(mgr.generation().await, 2);
    }

    #[tokio::test]
    async fn queued_callers_share_a_failed_rebuild() {
        let store = Arc::new(StubStore::default());
        let mgr = manager(store.clone(), FailurePolicy::Unavailable);
        mgr.init().await.unwrap();

        store.disconnect_all();
        store.refuse_opens.store(true, Ordering::SeqCst);

        // All callers snapshot the slot before any of them reaches the write lock
        const CALLERS: usize = 10;
        *store.ping_barrier.lock().unwrap() = Some(Arc::new(Barrier::new(CALLERS)));

        let calls = (0..CALLERS).map(|_| mgr.get_connection());
        let results = tokio::time::timeout(Duration::from_secs(5), futures::future::join_all(calls))
            .await
            .expect("callers did not finish");

        assert!(results.iter().all(|r| r.is_err()));
        // One rebuild's worth of attempts, not one per caller
        assert_eq!(store.refused.load(Ordering::SeqCst), 2);
        assert_eq!(mgr.generation().await, 1);

        // A fresh call retries
        *store.ping_barrier.lock().unwrap() = None;
        store.refuse_opens.store(false, Ordering::SeqCst);
        let handle = mgr.get_connection().await.unwrap();
        assert_eq!(*handle, 2);
        assert_eq!(store.refused.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn close_releases_handle_through_store() {
        let store = Arc::new(StubStore::default());
        let mgr = manager(store.clone(), FailurePolicy::Unavailable);
        mgr.init().await.unwrap();

        mgr.close().await;
        assert!(mgr.current().await.is_none());
        assert_eq!(store.closed.load(Ordering::SeqCst), 1);
        assert!(!mgr.is_healthy().await);

        // Closing twice is a no-op
        mgr.close().await;
        assert_eq!(store.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn exit_is_the_default_policy() {
        assert_eq!(FailurePolicy::default(), FailurePolicy::Exit);
    }
}
