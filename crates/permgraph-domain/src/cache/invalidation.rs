//! Broadcast of invalidation timestamps between cache holders.

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::DomainResult;

/// Default number of signals a slow subscriber may fall behind by before it
/// observes a lag.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// A publish/subscribe channel carrying invalidation timestamps.
///
/// Any holder may publish; every subscriber receives every timestamp and
/// treats cache entries computed before it as stale. Implementations backed
/// by an external bus (database notifications, Redis pub/sub) relay incoming
/// messages into the local receivers returned by `subscribe`.
#[async_trait]
pub trait InvalidationChannel: Send + Sync {
    /// Broadcasts `timestamp` to every subscriber.
    async fn publish(&self, timestamp: u64) -> DomainResult<()>;

    /// Returns a new receiver for signals published from now on.
    fn subscribe(&self) -> broadcast::Receiver<u64>;
}

/// In-process [`InvalidationChannel`] built on a tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastInvalidationChannel {
    sender: broadcast::Sender<u64>,
}

impl BroadcastInvalidationChannel {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastInvalidationChannel {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

#[async_trait]
impl InvalidationChannel for BroadcastInvalidationChannel {
    async fn publish(&self, timestamp: u64) -> DomainResult<()> {
        match self.sender.send(timestamp) {
            Ok(receivers) => debug!(timestamp, receivers, "published invalidation"),
            // Nobody listening yet: there is no cached state to invalidate.
            Err(_) => debug!(timestamp, "published invalidation with no subscribers"),
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<u64> {
        self.sender.subscribe()
    }
}
