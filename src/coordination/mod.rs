//! Coordination backends for the distributed lock
//!
//! The lock manager only relies on two primitives of the shared service:
//!
//! 1. **Atomic set-if-absent with expiry** to grant a lease to exactly one
//!    holder token ([`CoordinationBackend::try_acquire`]).
//! 2. **Publish/subscribe** so waiters park on a release channel instead of
//!    polling ([`CoordinationBackend::subscribe`], [`CoordinationBackend::publish`]).
//!
//! Release is a compare-and-delete on the holder token followed by a publish
//! on the key's release channel, executed atomically where the backend allows
//! it.
//!
//! # Backends
//!
//! - [`MemCoordinator`]: lease table and pub/sub hub in process memory. Every
//!   lock manager holding the same instance contends on the same locks.
//! - `RedisCoordinator` (feature `redis-backend`): `SET NX PX`, Lua
//!   compare-and-delete + `PUBLISH`, and a Redis pub/sub connection per
//!   waiter. Works across processes and hosts.

mod memory;
mod pubsub;
#[cfg(feature = "redis-backend")]
mod redis_backend;


pub use memory::*;
pub use pubsub::*;
#[cfg(feature = "redis-backend")]
pub use redis_backend::*;

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::CoordinationBackendKind;
use crate::CoordinationConfig;
use crate::CoordinationError;
use crate::Result;

pub type CoordinationResult<T> = std::result::Result<T, CoordinationError>;

/// Cap on any wait or lease, roughly 30 years
pub(crate) const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `start + duration` clamped to [`FAR_FUTURE`], so `Duration::MAX` means
/// "unbounded" instead of overflowing `Instant`.
pub(crate) fn deadline_after(
    start: Instant,
    duration: Duration,
) -> Instant {
    start + duration.min(FAR_FUTURE)
}

/// Result of one set-if-absent attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// The lease now belongs to the caller's token
    Acquired,
    /// Another token holds the lease
    ///
    /// `ttl` is the remaining lease of the current holder, `None` when the
    /// backend cannot tell (key stored without expiry).
    Held { ttl: Option<Duration> },
}

/// Snapshot of the current lease on a key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseState {
    pub holder: String,
    pub ttl: Option<Duration>,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait CoordinationBackend: Send + Sync + 'static {
    /// Stores `token` under `key` for `lease` unless a live lease exists.
    async fn try_acquire(
        &self,
        key: &str,
        token: &str,
        lease: Duration,
    ) -> CoordinationResult<AcquireOutcome>;

    /// Deletes `key` if it is still held by `token` and, only then, publishes
    /// a release message on `channel`.
    ///
    /// Returns whether this call removed the lease. Releasing an expired or
    /// foreign lease is not an error.
    async fn release(
        &self,
        key: &str,
        token: &str,
        channel: &str,
    ) -> CoordinationResult<bool>;

    /// Resets the expiry of `key` to `lease` if it is still held by `token`.
    async fn renew(
        &self,
        key: &str,
        token: &str,
        lease: Duration,
    ) -> CoordinationResult<bool>;

    /// Current live lease on `key`, if any.
    async fn holder(
        &self,
        key: &str,
    ) -> CoordinationResult<Option<LeaseState>>;

    /// Subscribes to `channel`. Messages published after this returns are
    /// delivered to the subscription.
    async fn subscribe(
        &self,
        channel: &str,
    ) -> CoordinationResult<Subscription>;

    async fn publish(
        &self,
        channel: &str,
        message: &str,
    ) -> CoordinationResult<usize>;
}

/// Builds the long-lived backend client described by `config`.
///
/// The memory backend's reaper (when enabled) runs until `shutdown` fires.
pub async fn build_backend(
    config: &CoordinationConfig,
    shutdown: &CancellationToken,
) -> Result<Arc<dyn CoordinationBackend>> {
    match config.backend {
        CoordinationBackendKind::Memory => {
            let backend = MemCoordinator::new(config);
            if config.reaper_enabled {
                backend.start_reaper(config.reaper_interval(), shutdown.child_token());
            }
            info!("Using in-memory coordination backend");
            Ok(Arc::new(backend))
        }
        #[cfg(feature = "redis-backend")]
        CoordinationBackendKind::Redis => {
            let backend = RedisCoordinator::connect(&config.redis_url, config.subscriber_buffer_size).await?;
            info!(url = %config.redis_url, "Using redis coordination backend");
            Ok(Arc::new(backend))
        }
        #[cfg(not(feature = "redis-backend"))]
        CoordinationBackendKind::Redis => Err(crate::Error::Config(::config::ConfigError::Message(
            "backend = \"redis\" requires the `redis-backend` feature".to_string(),
        ))),
    }
}
