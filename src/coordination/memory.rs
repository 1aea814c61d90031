//! In-memory coordination backend.
//!
//! Provides the lease table and release notifications inside one process.
//! Every [`crate::LockManager`] built on the same `MemCoordinator` (tasks,
//! threads or independent manager instances) contends on the same locks.
//!
//! # Concurrency Model
//!
//! - **Acquire**: O(1), single shard write lock through `DashMap::entry`, so
//!   check-expiry-and-insert is atomic per key
//! - **Release**: O(1) `remove_if` on the holder token, then a non-blocking
//!   publish on the release channel
//! - **Reaper**: O(N) time-limited scan with shard read locks, removal by
//!   `remove_if` on the expiry so a re-acquired key is never removed
//!
//! Expired leases are also replaced lazily by the next `try_acquire`, the
//! reaper only keeps the table from growing with dead holders.

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;

use super::deadline_after;
use super::AcquireOutcome;
use super::CoordinationBackend;
use super::CoordinationResult;
use super::LeaseState;
use super::PubSubHub;
use super::Subscription;
use crate::constants::UNLOCK_MESSAGE;
use crate::CoordinationConfig;

#[derive(Debug, Clone)]
struct LeaseEntry {
    token: String,
    expires_at: Instant,
}

#[derive(Debug)]
struct ReaperState {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

#[derive(Debug)]
struct MemCoordinatorInner {
    /// key → live lease
    leases: DashMap<String, LeaseEntry>,

    hub: PubSubHub,

    /// Upper bound of one reaper scan
    max_cleanup_duration: Duration,

    reaper: Mutex<Option<ReaperState>>,
}

/// In-process coordination backend
///
/// Cloning shares the lease table and the pub/sub hub.
#[derive(Debug, Clone)]
pub struct MemCoordinator {
    inner: Arc<MemCoordinatorInner>,
}

impl Default for MemCoordinator {
    fn default() -> Self {
        Self::new(&CoordinationConfig::default())
    }
}

impl MemCoordinator {
    pub fn new(config: &CoordinationConfig) -> Self {
        Self {
            inner: Arc::new(MemCoordinatorInner {
                leases: DashMap::new(),
                hub: PubSubHub::new(config.subscriber_buffer_size),
                max_cleanup_duration: Duration::from_millis(config.max_cleanup_duration_ms),
                reaper: Mutex::new(None),
            }),
        }
    }

    /// The hub carrying release notifications
    pub fn hub(&self) -> &PubSubHub {
        &self.inner.hub
    }

    /// Number of entries in the lease table, expired ones included
    pub fn lease_count(&self) -> usize {
        self.inner.leases.len()
    }

    /// Removes expired leases, bounded by the configured scan duration.
    ///
    /// Returns the removed keys.
    pub fn cleanup_expired(&self) -> Vec<String> {
        let start = Instant::now();
        let now = Instant::now();
        let max = self.inner.max_cleanup_duration;

        // Phase 1: collect expired keys (read-only, with time limit)
        let to_remove: Vec<String> = self
            .inner
            .leases
            .iter()
            .take_while(|_| start.elapsed() <= max)
            .filter(|entry| entry.value().expires_at <= now)
            .map(|entry| entry.key().clone())
            .collect();

        // Phase 2: remove after dropping iter (avoids deadlock)
        to_remove
            .into_iter()
            .filter_map(|key| {
                self.inner
                    .leases
                    .remove_if(&key, |_, lease| lease.expires_at <= now)
                    .map(|(k, _)| k)
            })
            .collect()
    }

    /// Spawns the background reaper on the current tokio runtime.
    ///
    /// Calling it while a reaper is running is a no-op. The reaper exits when
    /// `cancel` fires or [`Self::stop_reaper`] is called.
    pub fn start_reaper(
        &self,
        interval: Duration,
        cancel: CancellationToken,
    ) {
        let mut reaper = self.inner.reaper.lock();
        if reaper.is_some() {
            return;
        }

        let coordinator = self.clone();
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            debug!(?interval, "Lease reaper started");
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = coordinator.cleanup_expired();
                        if !removed.is_empty() {
                            debug!(count = removed.len(), "Reaped expired leases");
                        }
                    }
                }
            }
            debug!("Lease reaper stopped");
        });

        *reaper = Some(ReaperState { cancel, handle });
    }

    /// Stops the reaper and waits for it to exit.
    pub async fn stop_reaper(&self) {
        let state = self.inner.reaper.lock().take();
        if let Some(state) = state {
            state.cancel.cancel();
            let _ = state.handle.await;
        }
    }

    pub fn is_reaper_running(&self) -> bool {
        self.inner.reaper.lock().as_ref().is_some_and(|state| !state.handle.is_finished())
    }
}

#[async_trait]
impl CoordinationBackend for MemCoordinator {
    async fn try_acquire(
        &self,
        key: &str,
        token: &str,
        lease: Duration,
    ) -> CoordinationResult<AcquireOutcome> {
        let now = Instant::now();
        let fresh = LeaseEntry {
            token: token.to_string(),
            expires_at: deadline_after(now, lease),
        };

        let outcome = match self.inner.leases.entry(key.to_string()) {
            Entry::Vacant(vacant) => {
                vacant.insert(fresh);
                AcquireOutcome::Acquired
            }
            Entry::Occupied(mut occupied) => {
                let current = occupied.get();
                if current.expires_at <= now {
                    trace!(key, expired_holder = %current.token, "Replacing expired lease");
                    occupied.insert(fresh);
                    AcquireOutcome::Acquired
                } else {
                    AcquireOutcome::Held {
                        ttl: Some(current.expires_at - now),
                    }
                }
            }
        };
        Ok(outcome)
    }

    async fn release(
        &self,
        key: &str,
        token: &str,
        channel: &str,
    ) -> CoordinationResult<bool> {
        let now = Instant::now();
        // An expired lease of the same token is dropped but does not count as
        // released, its waiters already woke up at expiry.
        let released = self
            .inner
            .leases
            .remove_if(key, |_, lease| lease.token == token)
            .is_some_and(|(_, lease)| lease.expires_at > now);
        if released {
            self.inner.hub.publish(channel, UNLOCK_MESSAGE);
        }
        Ok(released)
    }

    async fn renew(
        &self,
        key: &str,
        token: &str,
        lease: Duration,
    ) -> CoordinationResult<bool> {
        let now = Instant::now();
        let Some(mut current) = self.inner.leases.get_mut(key) else {
            return Ok(false);
        };
        if current.token != token || current.expires_at <= now {
            return Ok(false);
        }
        current.expires_at = deadline_after(now, lease);
        Ok(true)
    }

    async fn holder(
        &self,
        key: &str,
    ) -> CoordinationResult<Option<LeaseState>> {
        let now = Instant::now();
        Ok(self.inner.leases.get(key).and_then(|lease| {
            (lease.expires_at > now).then(|| LeaseState {
                holder: lease.token.clone(),
                ttl: Some(lease.expires_at - now),
            })
        }))
    }

    async fn subscribe(
        &self,
        channel: &str,
    ) -> CoordinationResult<Subscription> {
        Ok(self.inner.hub.subscribe(channel))
    }

    async fn publish(
        &self,
        channel: &str,
        message: &str,
    ) -> CoordinationResult<usize> {
        Ok(self.inner.hub.publish(channel, message))
    }
}
