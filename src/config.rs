//! # Subscription configuration.
//!
//! Provides [`SubscribeOptions`], the immutable configuration a handle is
//! built from, plus the callback type aliases and the [`TimeoutInfo`]
//! snapshot handed to timeout callbacks.
//!
//! ## Sentinel value
//! `silence_timeout = Duration::ZERO` disables the watchdog (no timer is
//! ever armed); [`SubscribeOptions::timeout`] maps the sentinel to `None`.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::handle::IncomingMessage;
use crate::policies::AcceptancePolicy;
use crate::transport::DeliveryHints;

/// Snapshot passed to a timeout callback on each watchdog firing.
#[derive(Clone, Debug)]
pub struct TimeoutInfo {
    /// Resolved channel name (configured name until resolution).
    pub channel: Arc<str>,
    /// Arrival time of the last accepted message (construction time if none
    /// was ever accepted).
    pub last_message_at: SystemTime,
    /// Elapsed silence at the moment of firing.
    pub silent_for: Duration,
    /// Publishers currently known on the channel.
    pub publisher_count: usize,
}

/// Callback invoked on each watchdog firing.
///
/// Runs outside the handle's state lock, so it may query the handle that
/// fired it.
pub type TimeoutCallback = Arc<dyn Fn(&TimeoutInfo) + Send + Sync>;

/// Callback invoked synchronously for each accepted message.
///
/// Receives an [`IncomingMessage`] wrapper; marking it consumed clears the
/// handle's new-data flag for this message.
pub type MessageCallback<M> = Arc<dyn Fn(&IncomingMessage<M>) + Send + Sync>;

/// Configuration for one subscription handle.
///
/// Built once, consumed at handle construction. All fields are public; the
/// chainable `with_*`/`on_*` helpers exist so call sites stay readable.
///
/// ## Example
/// ```rust
/// use std::time::Duration;
/// use subwatch::SubscribeOptions;
///
/// let opts = SubscribeOptions::<u32>::new("sensors/imu")
///     .with_owner("state_estimator")
///     .with_queue_depth(32)
///     .with_silence_timeout(Duration::from_secs(5));
///
/// assert_eq!(opts.timeout(), Some(Duration::from_secs(5)));
/// ```
pub struct SubscribeOptions<M> {
    /// Channel to subscribe to.
    pub channel: String,
    /// Owning component name; used in diagnostic output only.
    pub owner: String,
    /// Queue depth hint, passed opaquely to the transport.
    pub queue_depth: usize,
    /// Maximum allowed gap between accepted messages before the watchdog
    /// fires. `Duration::ZERO` disables supervision.
    pub silence_timeout: Duration,
    /// Rule deciding whether an inbound message updates state.
    pub policy: AcceptancePolicy<M>,
    /// Opaque transport-specific delivery hints.
    pub hints: DeliveryHints,
    /// Overrides the default log-and-continue timeout behavior.
    pub timeout_callback: Option<TimeoutCallback>,
    /// Invoked synchronously per accepted message.
    pub message_callback: Option<MessageCallback<M>>,
}

impl<M> SubscribeOptions<M> {
    /// Creates options for `channel` with defaults: no owner, queue depth
    /// 16, watchdog disabled, unordered policy, no hints, no callbacks.
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            owner: String::new(),
            queue_depth: 16,
            silence_timeout: Duration::ZERO,
            policy: AcceptancePolicy::Unordered,
            hints: DeliveryHints::new(),
            timeout_callback: None,
            message_callback: None,
        }
    }

    /// Sets the owning component name (diagnostics only).
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    /// Sets the queue depth hint.
    pub fn with_queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth;
        self
    }

    /// Sets the silence timeout. `Duration::ZERO` disables supervision.
    pub fn with_silence_timeout(mut self, timeout: Duration) -> Self {
        self.silence_timeout = timeout;
        self
    }

    /// Sets the acceptance policy.
    pub fn with_policy(mut self, policy: AcceptancePolicy<M>) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the transport delivery hints.
    pub fn with_hints(mut self, hints: DeliveryHints) -> Self {
        self.hints = hints;
        self
    }

    /// Installs a timeout callback, replacing the default warning line.
    pub fn on_timeout(mut self, callback: impl Fn(&TimeoutInfo) + Send + Sync + 'static) -> Self {
        self.timeout_callback = Some(Arc::new(callback));
        self
    }

    /// Installs a message callback, invoked per accepted message.
    pub fn on_message(
        mut self,
        callback: impl Fn(&IncomingMessage<M>) + Send + Sync + 'static,
    ) -> Self {
        self.message_callback = Some(Arc::new(callback));
        self
    }

    /// Returns the silence timeout as an `Option`.
    ///
    /// - `None` → supervision disabled (`Duration::ZERO` sentinel)
    /// - `Some(d)` → watchdog armed with deadline `d`
    #[inline]
    pub fn timeout(&self) -> Option<Duration> {
        if self.silence_timeout == Duration::ZERO {
            None
        } else {
            Some(self.silence_timeout)
        }
    }
}
