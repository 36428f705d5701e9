//! Detached background cache writes.
//!
//! The interceptor hands a response copy to [`CacheWriter::spawn_put`] and
//! returns immediately. Write failures never reach the caller; they are
//! logged and published on a broadcast channel for whoever cares to listen.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use haven_core::{RequestIdentity, Response};
use haven_storage::{CacheTier, TierStore};
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;

/// Capacity of the failure channel. Slow subscribers lag, writers never block.
const FAILURE_CHANNEL_CAPACITY: usize = 64;

/// A background write that did not land.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheWriteFailure {
    pub tier: String,
    pub identity: RequestIdentity,
    pub reason: String,
}

#[derive(Debug, Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

/// Decrements the in-flight count when the write task ends, including when
/// the task is aborted or panics.
struct InFlightGuard(Arc<InFlight>);

impl InFlightGuard {
    fn enter(in_flight: Arc<InFlight>) -> Self {
        in_flight.count.fetch_add(1, Ordering::AcqRel);
        Self(in_flight)
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

/// Spawns and tracks fire-and-forget tier writes.
pub struct CacheWriter<S> {
    store: Arc<S>,
    failures: broadcast::Sender<CacheWriteFailure>,
    in_flight: Arc<InFlight>,
}

impl<S> Clone for CacheWriter<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            failures: self.failures.clone(),
            in_flight: self.in_flight.clone(),
        }
    }
}

impl<S: TierStore + 'static> CacheWriter<S> {
    pub fn new(store: Arc<S>) -> Self {
        let (failures, _) = broadcast::channel(FAILURE_CHANNEL_CAPACITY);
        Self {
            store,
            failures,
            in_flight: Arc::new(InFlight::default()),
        }
    }

    /// Write `response` into `tier` on a detached task.
    ///
    /// Must be called from within a tokio runtime. The returned handle may be
    /// dropped; the write still runs to completion.
    pub fn spawn_put(
        &self,
        tier: String,
        identity: RequestIdentity,
        response: Response,
    ) -> JoinHandle<()> {
        let guard = InFlightGuard::enter(self.in_flight.clone());
        let store = self.store.clone();
        let failures = self.failures.clone();

        tokio::spawn(async move {
            let _guard = guard;
            let result = async {
                let handle = store.open(&tier).await?;
                handle.put(&identity, &response).await
            }
            .await;

            match result {
                Ok(()) => {
                    tracing::debug!(tier = %tier, identity = %identity, "Dynamic cache write stored");
                }
                Err(e) => {
                    tracing::warn!(
                        tier = %tier,
                        identity = %identity,
                        error = %e,
                        "Dynamic cache write failed"
                    );
                    // No subscribers is fine.
                    let _ = failures.send(CacheWriteFailure {
                        tier,
                        identity,
                        reason: e.to_string(),
                    });
                }
            }
        })
    }

    pub fn subscribe_failures(&self) -> broadcast::Receiver<CacheWriteFailure> {
        self.failures.subscribe()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.count.load(Ordering::Acquire)
    }

    /// Resolve once no write is in flight.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.in_flight.idle.notified();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }
}
