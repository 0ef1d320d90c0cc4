//! # Message transport boundary.
//!
//! A [`Transport`] hands messages of one type to registered delivery
//! callbacks. The subscription handle consumes this contract; it never talks
//! to a broker directly.
//!
//! ## Contract
//! - `subscribe` registers a delivery callback for a channel and returns a
//!   revocable [`SubscriptionToken`].
//! - The delivery callback receives a shared, immutable payload
//!   (`Arc<M>`), may be invoked from an arbitrary thread, at most once per
//!   message, with no ordering guarantee relative to other channels.
//! - `unsubscribe` stops further deliveries for a token; a delivery already
//!   in flight may still complete.
//! - `resolved_channel_name` and `publisher_count` are cheap, synchronous
//!   introspection calls used for diagnostics and timeout reports.
//!
//! [`LocalTransport`] is an in-process reference implementation used by the
//! tests and demos.

mod local;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TransportError;

pub use local::{LocalPublisher, LocalTransport};

/// Delivery callback registered with a transport.
///
/// Invoked once per inbound message with a shared, immutable payload.
pub type DeliveryFn<M> = Arc<dyn Fn(Arc<M>) + Send + Sync>;

/// Opaque, transport-specific delivery options.
///
/// The handle passes these through to [`Transport::subscribe`] without
/// interpreting them.
#[derive(Clone, Debug, Default)]
pub struct DeliveryHints {
    entries: HashMap<String, String>,
}

impl DeliveryHints {
    /// Creates an empty hint set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets one hint, replacing any previous value for the key.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    /// Looks up one hint.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Returns the number of hints.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when no hints are set.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Identity of one active subscription, issued by [`Transport::subscribe`].
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionToken {
    id: u64,
    channel: Arc<str>,
}

impl SubscriptionToken {
    /// Creates a token. Intended for transport implementations.
    pub fn new(id: u64, channel: impl Into<Arc<str>>) -> Self {
        Self {
            id,
            channel: channel.into(),
        }
    }

    /// Transport-assigned subscription id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Channel this token subscribes to.
    pub fn channel(&self) -> &str {
        &self.channel
    }
}

impl fmt::Debug for SubscriptionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionToken({}@{})", self.id, self.channel)
    }
}

/// # Publish/subscribe transport for one message type.
///
/// Implementations deliver messages by invoking the registered
/// [`DeliveryFn`] from their own receive context. The handle treats the
/// transport as an external collaborator: subscribe failures are the only
/// errors it propagates, and a silent transport is reported through the
/// watchdog rather than through this trait.
#[async_trait]
pub trait Transport<M: Send + Sync + 'static>: Send + Sync {
    /// Registers `on_message` for `channel` and returns a revocable token.
    ///
    /// `queue_depth` and `hints` are passed through opaquely; a transport is
    /// free to ignore them.
    async fn subscribe(
        &self,
        channel: &str,
        queue_depth: usize,
        hints: &DeliveryHints,
        on_message: DeliveryFn<M>,
    ) -> Result<SubscriptionToken, TransportError>;

    /// Stops further deliveries for `token`.
    ///
    /// Unknown or already-revoked tokens are ignored.
    async fn unsubscribe(&self, token: &SubscriptionToken);

    /// Returns the fully resolved channel name for diagnostics.
    fn resolved_channel_name(&self, token: &SubscriptionToken) -> String;

    /// Returns the number of publishers currently known on the token's
    /// channel.
    fn publisher_count(&self, token: &SubscriptionToken) -> usize;
}
