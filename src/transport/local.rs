//! # In-process reference transport.
//!
//! [`LocalTransport`] implements the [`Transport`] contract for a single
//! process: channels are entries in a shared map, publishing fans the
//! message out to every registered delivery callback synchronously, and
//! [`LocalPublisher`] handles back the `publisher_count` bookkeeping.
//!
//! This is a reference implementation for tests and demos, not a broker:
//! there is no queueing (`queue_depth` and hints are accepted and ignored)
//! and no cross-process delivery.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::TransportError;

use super::{DeliveryFn, DeliveryHints, SubscriptionToken, Transport};

struct ChannelState<M> {
    subscribers: Vec<(u64, DeliveryFn<M>)>,
    publishers: usize,
}

impl<M> Default for ChannelState<M> {
    fn default() -> Self {
        Self {
            subscribers: Vec::new(),
            publishers: 0,
        }
    }
}

struct TransportState<M> {
    next_id: AtomicU64,
    channels: RwLock<HashMap<String, ChannelState<M>>>,
}

/// In-process transport carrying one message type.
///
/// Cheap to clone; clones share the same channel map.
pub struct LocalTransport<M> {
    state: Arc<TransportState<M>>,
}

impl<M> Clone for LocalTransport<M> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<M: Send + Sync + 'static> LocalTransport<M> {
    /// Creates an empty transport.
    pub fn new() -> Self {
        Self {
            state: Arc::new(TransportState {
                next_id: AtomicU64::new(1),
                channels: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Registers a publisher on `channel` and returns a handle for it.
    ///
    /// The publisher is counted in [`Transport::publisher_count`] until the
    /// handle is dropped.
    pub fn publisher(&self, channel: impl Into<String>) -> LocalPublisher<M> {
        let channel = channel.into();
        self.state
            .channels
            .write()
            .entry(channel.clone())
            .or_default()
            .publishers += 1;
        LocalPublisher {
            state: Arc::clone(&self.state),
            channel,
        }
    }
}

impl<M: Send + Sync + 'static> Default for LocalTransport<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<M: Send + Sync + 'static> Transport<M> for LocalTransport<M> {
    async fn subscribe(
        &self,
        channel: &str,
        _queue_depth: usize,
        _hints: &DeliveryHints,
        on_message: DeliveryFn<M>,
    ) -> Result<SubscriptionToken, TransportError> {
        let id = self.state.next_id.fetch_add(1, Ordering::Relaxed);
        self.state
            .channels
            .write()
            .entry(channel.to_string())
            .or_default()
            .subscribers
            .push((id, on_message));
        Ok(SubscriptionToken::new(id, channel))
    }

    async fn unsubscribe(&self, token: &SubscriptionToken) {
        let mut channels = self.state.channels.write();
        if let Some(chan) = channels.get_mut(token.channel()) {
            chan.subscribers.retain(|(id, _)| *id != token.id());
        }
    }

    fn resolved_channel_name(&self, token: &SubscriptionToken) -> String {
        token.channel().to_string()
    }

    fn publisher_count(&self, token: &SubscriptionToken) -> usize {
        self.state
            .channels
            .read()
            .get(token.channel())
            .map(|chan| chan.publishers)
            .unwrap_or(0)
    }
}

/// Publishing side of a [`LocalTransport`] channel.
///
/// Dropping the handle deregisters the publisher from the channel's count.
pub struct LocalPublisher<M> {
    state: Arc<TransportState<M>>,
    channel: String,
}

impl<M: Send + Sync + 'static> LocalPublisher<M> {
    /// Publishes one message to every subscriber of the channel.
    ///
    /// Callbacks are invoked synchronously on the calling thread, outside
    /// the transport's channel lock.
    pub fn publish(&self, msg: M) {
        let msg = Arc::new(msg);
        let callbacks: Vec<DeliveryFn<M>> = {
            let channels = self.state.channels.read();
            match channels.get(&self.channel) {
                Some(chan) => chan.subscribers.iter().map(|(_, cb)| Arc::clone(cb)).collect(),
                None => Vec::new(),
            }
        };
        for cb in callbacks {
            cb(Arc::clone(&msg));
        }
    }

    /// The channel this handle publishes to.
    pub fn channel(&self) -> &str {
        &self.channel
    }
}

impl<M> Drop for LocalPublisher<M> {
    fn drop(&mut self) {
        let mut channels = self.state.channels.write();
        if let Some(chan) = channels.get_mut(&self.channel) {
            chan.publishers = chan.publishers.saturating_sub(1);
        }
    }
}
