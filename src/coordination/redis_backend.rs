//! Redis coordination backend.
//!
//! Leases are plain string keys holding the holder token:
//!
//! - acquire: `SET key token NX PX lease_ms`, on failure `PTTL key`
//! - release: Lua compare-and-delete followed by `PUBLISH channel "unlock"`
//!   in the same script, so no waiter can miss the release
//! - renew: Lua compare-and-`PEXPIRE`
//!
//! Each subscription owns a dedicated pub/sub connection whose messages are
//! forwarded into a bounded channel by a small task. Dropping the
//! subscription cancels that task, which drops the connection and with it the
//! server-side subscription.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::Client;
use redis::Script;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;

use super::AcquireOutcome;
use super::CoordinationBackend;
use super::CoordinationResult;
use super::LeaseState;
use super::Subscription;
use crate::constants::UNLOCK_MESSAGE;
use crate::CoordinationError;

const RELEASE_SCRIPT: &str = r#"
if redis.call('get', KEYS[1]) == ARGV[1] then
    redis.call('del', KEYS[1])
    redis.call('publish', KEYS[2], ARGV[2])
    return 1
end
return 0
"#;

const RENEW_SCRIPT: &str = r#"
if redis.call('get', KEYS[1]) == ARGV[1] then
    return redis.call('pexpire', KEYS[1], ARGV[2])
end
return 0
"#;

/// Shared Redis client for leases and release notifications
#[derive(Clone)]
pub struct RedisCoordinator {
    client: Client,
    conn: ConnectionManager,
    subscriber_buffer_size: usize,
}

impl std::fmt::Debug for RedisCoordinator {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("RedisCoordinator")
            .field("subscriber_buffer_size", &self.subscriber_buffer_size)
            .finish_non_exhaustive()
    }
}

impl RedisCoordinator {
    /// Connects to Redis.
    ///
    /// # Arguments
    /// * `url` - Redis connection URL (e.g. `redis://127.0.0.1:6379/`)
    /// * `subscriber_buffer_size` - Per-subscription message buffer
    pub async fn connect(
        url: &str,
        subscriber_buffer_size: usize,
    ) -> CoordinationResult<Self> {
        let client = Client::open(url)
            .map_err(|e| CoordinationError::Unavailable(format!("failed to create redis client: {e}")))?;
        let conn = ConnectionManager::new(client.clone())
            .await
            .map_err(|e| CoordinationError::Unavailable(format!("failed to connect to redis at {url}: {e}")))?;

        debug!(url, "Redis coordination backend connected");
        Ok(Self {
            client,
            conn,
            subscriber_buffer_size: subscriber_buffer_size.max(1),
        })
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX).max(1)
}

/// Maps a `PTTL` reply: -2 means the key vanished in between (retry now),
/// -1 means the key has no expiry.
fn ttl_from_pttl(pttl: i64) -> Option<Duration> {
    match pttl {
        -1 => None,
        ms if ms <= 0 => Some(Duration::ZERO),
        ms => Some(Duration::from_millis(ms as u64)),
    }
}

#[async_trait]
impl CoordinationBackend for RedisCoordinator {
    async fn try_acquire(
        &self,
        key: &str,
        token: &str,
        lease: Duration,
    ) -> CoordinationResult<AcquireOutcome> {
        let mut conn = self.conn.clone();

        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(millis(lease))
            .query_async(&mut conn)
            .await?;

        if reply.is_some() {
            return Ok(AcquireOutcome::Acquired);
        }

        let pttl: i64 = redis::cmd("PTTL").arg(key).query_async(&mut conn).await?;
        Ok(AcquireOutcome::Held {
            ttl: ttl_from_pttl(pttl),
        })
    }

    async fn release(
        &self,
        key: &str,
        token: &str,
        channel: &str,
    ) -> CoordinationResult<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = Script::new(RELEASE_SCRIPT)
            .key(key)
            .key(channel)
            .arg(token)
            .arg(UNLOCK_MESSAGE)
            .invoke_async(&mut conn)
            .await?;
        Ok(removed == 1)
    }

    async fn renew(
        &self,
        key: &str,
        token: &str,
        lease: Duration,
    ) -> CoordinationResult<bool> {
        let mut conn = self.conn.clone();
        let renewed: i64 = Script::new(RENEW_SCRIPT)
            .key(key)
            .arg(token)
            .arg(millis(lease))
            .invoke_async(&mut conn)
            .await?;
        Ok(renewed == 1)
    }

    async fn holder(
        &self,
        key: &str,
    ) -> CoordinationResult<Option<LeaseState>> {
        let mut conn = self.conn.clone();
        let holder: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        let Some(holder) = holder else {
            return Ok(None);
        };
        let pttl: i64 = redis::cmd("PTTL").arg(key).query_async(&mut conn).await?;
        Ok(Some(LeaseState {
            holder,
            ttl: ttl_from_pttl(pttl),
        }))
    }

    async fn subscribe(
        &self,
        channel: &str,
    ) -> CoordinationResult<Subscription> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        // Returns once the server confirmed the subscription.
        pubsub.subscribe(channel).await?;

        let (sender, receiver) = mpsc::channel(self.subscriber_buffer_size);
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let task_channel = channel.to_string();

        tokio::spawn(async move {
            let mut messages = Box::pin(pubsub.into_on_message());
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    message = messages.next() => {
                        let Some(message) = message else {
                            debug!(channel = %task_channel, "Redis subscription stream ended");
                            break;
                        };
                        let payload: String = message.get_payload().unwrap_or_default();
                        if let Err(mpsc::error::TrySendError::Closed(_)) = sender.try_send(payload) {
                            break;
                        }
                    }
                }
            }
            trace!(channel = %task_channel, "Redis subscription closed");
        });

        Ok(Subscription::new(channel.to_string(), receiver, cancel.drop_guard()))
    }

    async fn publish(
        &self,
        channel: &str,
        message: &str,
    ) -> CoordinationResult<usize> {
        let mut conn = self.conn.clone();
        let receivers: usize = redis::cmd("PUBLISH")
            .arg(channel)
            .arg(message)
            .query_async(&mut conn)
            .await?;
        Ok(receivers)
    }
}
