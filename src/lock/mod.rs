//! Pub/sub distributed lock
//!
//! A waiter that finds the lock taken does not poll. It subscribes to the
//! lock's release channel, retries once (a release may have happened between
//! the failed attempt and the subscription), then parks on the subscription:
//!
//! ```text
//! acquire()
//!   try_acquire ──Acquired──────────────────────────────────► LockGuard
//!      │ Held
//!      ▼
//!   subscribe(release channel)
//!      │
//!      ▼
//!   try_acquire ──Acquired──────────────────────────────────► LockGuard
//!      │ Held { ttl }
//!      ▼
//!   park on recv() for min(ttl, time left) ── deadline ─────► LockError::Timeout
//!      │ woken by release / holder lease ran out
//!      └──────► retry
//! ```
//!
//! Waking on the holder's remaining lease covers holders that died without
//! releasing: their lease expires on the backend and no release is published.
//!
//! Locks are not reentrant and waiters are not served in FIFO order, every
//! waiter of a key is woken on each release and the fastest retry wins.

mod guard;
mod handle;


pub use guard::*;
pub use handle::*;

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use futures::FutureExt;
use nanoid::nanoid;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::coordination::deadline_after;
use crate::coordination::AcquireOutcome;
use crate::coordination::CoordinationBackend;
use crate::metrics;
use crate::CoordinationError;
use crate::LockConfig;
use crate::LockError;
use crate::Result;
use crate::SystemError;

/// Acquires and releases named locks on a shared coordination backend
///
/// Cheap to clone, clones share the backend client and the instance id.
/// Each manager gets its own instance id, so two managers on one backend
/// behave like two independent processes.
#[derive(Clone)]
pub struct LockManager {
    backend: Arc<dyn CoordinationBackend>,
    channel_prefix: Arc<str>,
    instance_id: Arc<str>,
}

impl std::fmt::Debug for LockManager {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("LockManager")
            .field("channel_prefix", &self.channel_prefix)
            .field("instance_id", &self.instance_id)
            .finish_non_exhaustive()
    }
}

impl LockManager {
    pub fn new(
        backend: Arc<dyn CoordinationBackend>,
        config: &LockConfig,
    ) -> Self {
        Self {
            backend,
            channel_prefix: Arc::from(config.channel_prefix.as_str()),
            instance_id: Arc::from(nanoid!(10).as_str()),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Channel on which releases of `resource_key` are published
    pub fn release_channel(
        &self,
        resource_key: &str,
    ) -> String {
        format!("{}{}", self.channel_prefix, resource_key)
    }

    fn new_holder_token(&self) -> String {
        format!("{}:{}", self.instance_id, nanoid!())
    }

    /// Single attempt, never waits.
    ///
    /// Returns `Ok(None)` when another holder owns the lock.
    pub async fn try_acquire(
        &self,
        resource_key: &str,
        lease: Duration,
    ) -> Result<Option<LockGuard>> {
        validate_key(resource_key)?;
        let token = self.new_holder_token();
        let granted_at = Instant::now();

        match self.backend.try_acquire(resource_key, &token, lease).await? {
            AcquireOutcome::Acquired => Ok(Some(self.granted(resource_key, token, lease, granted_at))),
            AcquireOutcome::Held { .. } => Ok(None),
        }
    }

    /// Waits up to `wait_timeout` for the lock.
    ///
    /// # Arguments
    /// * `resource_key` - Lock name, shared by every contender of the resource
    /// * `wait_timeout` - Upper bound of the wait, the caller is parked (not
    ///   spinning) while waiting
    /// * `lease` - Time after which the backend reclaims the lock if it is
    ///   neither released nor renewed
    ///
    /// # Errors
    /// - `LockError::Timeout` when the wait bound elapsed
    /// - `SystemError::Coordination` when the backend failed
    ///
    /// Dropping the returned future abandons the wait and unsubscribes.
    pub async fn acquire(
        &self,
        resource_key: &str,
        wait_timeout: Duration,
        lease: Duration,
    ) -> Result<LockGuard> {
        let never = CancellationToken::new();
        self.acquire_with_cancel(resource_key, wait_timeout, lease, &never).await
    }

    /// Like [`Self::acquire`], abandoning the wait with `LockError::Cancelled`
    /// once `cancel` fires.
    pub async fn acquire_with_cancel(
        &self,
        resource_key: &str,
        wait_timeout: Duration,
        lease: Duration,
        cancel: &CancellationToken,
    ) -> Result<LockGuard> {
        validate_key(resource_key)?;
        let started = Instant::now();
        // Duration::MAX waits without bound.
        let deadline = deadline_after(started, wait_timeout);
        let token = self.new_holder_token();

        // Fast path: uncontended lock, no subscription needed.
        if let AcquireOutcome::Acquired = self.backend.try_acquire(resource_key, &token, lease).await? {
            metrics::observe_acquire(started, "acquired");
            return Ok(self.granted(resource_key, token, lease, Instant::now()));
        }

        let channel = self.release_channel(resource_key);
        let mut subscription = self.backend.subscribe(&channel).await?;
        trace!(resource_key, %channel, "Waiting for lock release");

        loop {
            let ttl = match self.backend.try_acquire(resource_key, &token, lease).await? {
                AcquireOutcome::Acquired => {
                    metrics::observe_acquire(started, "acquired");
                    return Ok(self.granted(resource_key, token, lease, Instant::now()));
                }
                AcquireOutcome::Held { ttl } => ttl,
            };

            let now = Instant::now();
            if now >= deadline {
                metrics::observe_acquire(started, "timeout");
                metrics::LOCK_TIMEOUTS.inc();
                debug!(resource_key, waited = ?now - started, "Lock wait timed out");
                return Err(LockError::Timeout {
                    resource_key: resource_key.to_string(),
                    waited: now - started,
                }
                .into());
            }

            let remaining = deadline - now;
            let park = ttl.map_or(remaining, |ttl| ttl.min(remaining));

            tokio::select! {
                _ = cancel.cancelled() => {
                    metrics::observe_acquire(started, "cancelled");
                    debug!(resource_key, "Lock wait cancelled");
                    return Err(LockError::Cancelled {
                        resource_key: resource_key.to_string(),
                    }
                    .into());
                }
                notified = tokio::time::timeout(park, subscription.recv()) => match notified {
                    Ok(Some(_)) => trace!(resource_key, "Woken by release"),
                    Ok(None) => {
                        return Err(CoordinationError::SubscriptionClosed { channel }.into());
                    }
                    // Holder's lease ran out or the deadline passed, the loop re-checks both.
                    Err(_) => {}
                },
            }
        }
    }

    /// Releases the lock held through `handle` and wakes its waiters.
    ///
    /// Idempotent: returns `Ok(false)` when there was nothing left to release
    /// (already released, lease expired, lock taken over).
    pub async fn release(
        &self,
        handle: &LockHandle,
    ) -> Result<bool> {
        let channel = self.release_channel(handle.resource_key());
        match self
            .backend
            .release(handle.resource_key(), handle.holder_token(), &channel)
            .await
        {
            Ok(released) => {
                if released {
                    debug!(resource_key = handle.resource_key(), "Lock released");
                } else {
                    debug!(
                        resource_key = handle.resource_key(),
                        "Lock was no longer held at release"
                    );
                }
                Ok(released)
            }
            Err(source) => {
                metrics::LOCK_RELEASE_FAILURES.inc();
                Err(LockError::Release {
                    resource_key: handle.resource_key().to_string(),
                    source,
                }
                .into())
            }
        }
    }

    /// Extends the lease of a held lock to `lease` from now.
    ///
    /// # Errors
    /// `LockError::NotHeld` when the lease already expired or changed hands.
    pub async fn renew(
        &self,
        handle: &mut LockHandle,
        lease: Duration,
    ) -> Result<()> {
        let renewed_at = Instant::now();
        if self
            .backend
            .renew(handle.resource_key(), handle.holder_token(), lease)
            .await?
        {
            handle.extend(lease, renewed_at);
            trace!(resource_key = handle.resource_key(), ?lease, "Lease renewed");
            Ok(())
        } else {
            warn!(resource_key = handle.resource_key(), "Lease lost before renewal");
            Err(LockError::NotHeld {
                resource_key: handle.resource_key().to_string(),
                holder: handle.holder_token().to_string(),
            }
            .into())
        }
    }

    /// Whether any holder currently owns `resource_key`.
    pub async fn is_locked(
        &self,
        resource_key: &str,
    ) -> Result<bool> {
        Ok(self.backend.holder(resource_key).await?.is_some())
    }

    /// Runs `critical_section` while holding `resource_key`.
    ///
    /// The lock is released exactly once on every exit path: success, error
    /// or panic. A panic inside the critical section is reported as
    /// `SystemError::Panicked` after the release. A failed release is logged
    /// and does not change the outcome, the lease bounds how long the lock can
    /// stay behind.
    pub async fn with_lock<F, Fut, T>(
        &self,
        resource_key: &str,
        wait_timeout: Duration,
        lease: Duration,
        critical_section: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let guard = self.acquire(resource_key, wait_timeout, lease).await?;

        let outcome = AssertUnwindSafe(async move { critical_section().await })
            .catch_unwind()
            .await;

        if let Err(e) = guard.release().await {
            warn!(resource_key, "Lock release failed, lock expires with its lease: {:?}", e);
        }

        match outcome {
            Ok(result) => result,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!(resource_key, %message, "Critical section panicked");
                Err(SystemError::Panicked(message).into())
            }
        }
    }

    fn granted(
        &self,
        resource_key: &str,
        token: String,
        lease: Duration,
        granted_at: Instant,
    ) -> LockGuard {
        debug!(resource_key, holder = %token, ?lease, "Lock acquired");
        LockGuard::new(
            self.clone(),
            LockHandle::new(resource_key.to_string(), token, lease, granted_at),
        )
    }
}

fn validate_key(resource_key: &str) -> Result<()> {
    if resource_key.trim().is_empty() {
        return Err(LockError::InvalidKey(resource_key.to_string()).into());
    }
    Ok(())
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
