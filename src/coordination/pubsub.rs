//! In-process publish/subscribe hub for lock release notifications
//!
//! # Architecture
//!
//! ```text
//! release() -> publish(channel) -> lookup in DashMap -> try_send(per-subscriber channel)
//!                                                              ↓
//! acquire() waiter parked on Subscription::recv() <────────────┘
//! ```
//!
//! Publishing never blocks: a subscriber whose buffer is full already has a
//! pending wake-up, so the extra message is dropped. Subscribers are removed
//! from the hub when their [`Subscription`] is dropped (RAII), including when
//! the waiting future is cancelled.

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::trace;

/// A live subscription to one channel
///
/// Dropping it unsubscribes.
pub struct Subscription {
    channel: String,
    receiver: mpsc::Receiver<String>,
    _cleanup: Box<dyn Send + Sync>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

impl Subscription {
    /// Wraps a receiver fed by a backend.
    ///
    /// `cleanup` is dropped together with the subscription and must undo the
    /// backend registration in its own `Drop`.
    pub fn new(
        channel: String,
        receiver: mpsc::Receiver<String>,
        cleanup: impl Send + Sync + 'static,
    ) -> Self {
        Self {
            channel,
            receiver,
            _cleanup: Box::new(cleanup),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Waits for the next message.
    ///
    /// Returns `None` once the backend side of the channel is gone.
    pub async fn recv(&mut self) -> Option<String> {
        self.receiver.recv().await
    }
}

struct SubscriberCleanup {
    id: u64,
    channel: String,
    hub: Arc<PubSubHubInner>,
}

impl Drop for SubscriberCleanup {
    fn drop(&mut self) {
        // Atomic check-and-remove so a concurrent subscribe on the same
        // channel never lands in a list that is being dropped.
        self.hub.subscribers.remove_if_mut(&self.channel, |_channel, subscribers| {
            subscribers.retain(|s| s.id != self.id);
            subscribers.is_empty()
        });
        trace!(subscriber_id = self.id, channel = %self.channel, "Subscriber removed");
    }
}

#[derive(Debug)]
struct Subscriber {
    id: u64,
    sender: mpsc::Sender<String>,
}

#[derive(Debug)]
struct PubSubHubInner {
    subscribers: DashMap<String, Vec<Subscriber>>,
    next_id: AtomicU64,
    buffer_size: usize,
}

/// Channel-keyed wait queues
///
/// Cloning shares the same hub.
#[derive(Debug, Clone)]
pub struct PubSubHub {
    inner: Arc<PubSubHubInner>,
}

impl PubSubHub {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            inner: Arc::new(PubSubHubInner {
                subscribers: DashMap::new(),
                next_id: AtomicU64::new(1),
                buffer_size: buffer_size.max(1),
            }),
        }
    }

    /// Registers a subscriber on `channel`.
    ///
    /// Messages published after this call returns are delivered to it.
    pub fn subscribe(
        &self,
        channel: &str,
    ) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.inner.buffer_size);

        self.inner
            .subscribers
            .entry(channel.to_string())
            .or_default()
            .push(Subscriber { id, sender });

        trace!(subscriber_id = id, channel, "Subscriber registered");

        Subscription::new(
            channel.to_string(),
            receiver,
            SubscriberCleanup {
                id,
                channel: channel.to_string(),
                hub: self.inner.clone(),
            },
        )
    }

    /// Publishes `message` to every subscriber of `channel`.
    ///
    /// Returns the number of subscribers that hold a pending wake-up after the
    /// call. Never blocks.
    pub fn publish(
        &self,
        channel: &str,
        message: &str,
    ) -> usize {
        let Some(subscribers) = self.inner.subscribers.get(channel) else {
            return 0;
        };

        let delivered = subscribers
            .iter()
            .filter(|s| match s.sender.try_send(message.to_string()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => true,
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            })
            .count();

        trace!(channel, subscribers = subscribers.len(), delivered, "Message published");
        delivered
    }

    pub fn subscriber_count(
        &self,
        channel: &str,
    ) -> usize {
        self.inner.subscribers.get(channel).map(|s| s.len()).unwrap_or(0)
    }

    pub fn channel_count(&self) -> usize {
        self.inner.subscribers.len()
    }
}
