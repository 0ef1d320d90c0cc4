//! # Subscription state machine (single-threaded variant).
//!
//! [`SubscriptionCore`] owns the latest message and the received/new/
//! consumed flags, and applies the acceptance policy on each delivery. It
//! takes `&mut self` and performs no locking: use it directly when one
//! thread owns the delivery loop, or behind
//! [`SubscribeHandle`](crate::SubscribeHandle) for the thread-safe,
//! transport-wired variant.
//!
//! ## State invariants
//! - `new_data ⇒ got_data`
//! - a latest message is retained iff `got_data`
//! - `got_data`, once set, is never cleared — a restart of the handle keeps
//!   the state
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use subwatch::{SubscribeOptions, SubscriptionCore};
//!
//! let mut core = SubscriptionCore::new(&SubscribeOptions::<u32>::new("nums"));
//! assert!(!core.has_message());
//!
//! core.deliver(Arc::new(7));
//! assert!(core.is_new_message());
//! assert_eq!(core.take().as_deref(), Some(&7));
//! assert!(!core.is_new_message());
//! ```

use std::sync::Arc;
use std::time::SystemTime;

use tracing::{error, warn};

use crate::config::{MessageCallback, SubscribeOptions};
use crate::policies::{AcceptancePolicy, Verdict};

use super::wrapper::IncomingMessage;

/// Outcome of one delivery, reported to the caller of
/// [`SubscriptionCore::deliver_at`].
pub(crate) enum Delivery<M> {
    /// The message replaced the latest one.
    Accepted(Arc<M>),
    /// The message was discarded by the acceptance policy.
    Rejected,
}

/// Non-thread-safe subscription state machine.
pub struct SubscriptionCore<M> {
    channel: Arc<str>,
    owner: Arc<str>,
    resolved: Option<Arc<str>>,
    policy: AcceptancePolicy<M>,
    message_callback: Option<MessageCallback<M>>,

    got_data: bool,
    new_data: bool,
    used_data: bool,
    latest: Option<Arc<M>>,
    last_received: SystemTime,
}

impl<M> SubscriptionCore<M> {
    /// Creates an empty core from `options`.
    ///
    /// `last_message_time()` starts at the construction time, matching the
    /// baseline the time-consistency check and the watchdog report against
    /// before any message arrives.
    pub fn new(options: &SubscribeOptions<M>) -> Self {
        Self {
            channel: Arc::from(options.channel.as_str()),
            owner: Arc::from(options.owner.as_str()),
            resolved: None,
            policy: options.policy.clone(),
            message_callback: options.message_callback.clone(),
            got_data: false,
            new_data: false,
            used_data: false,
            latest: None,
            last_received: SystemTime::now(),
        }
    }

    /// Feeds one inbound message through the acceptance policy and, on
    /// acceptance, runs the configured message callback inline.
    ///
    /// The callback only sees the [`IncomingMessage`] wrapper, so it cannot
    /// re-enter the core.
    pub fn deliver(&mut self, msg: Arc<M>) {
        if let Delivery::Accepted(accepted) = self.deliver_at(msg, SystemTime::now()) {
            if let Some(callback) = self.message_callback.clone() {
                let wrapped = IncomingMessage::new(accepted, Arc::clone(&self.channel));
                callback(&wrapped);
                if wrapped.is_consumed() {
                    self.new_data = false;
                }
            }
        }
    }

    /// Applies the acceptance policy with an explicit arrival time and
    /// updates state on acceptance. Does not run the message callback.
    pub(crate) fn deliver_at(&mut self, msg: Arc<M>, now: SystemTime) -> Delivery<M> {
        let verdict = self
            .policy
            .judge(msg.as_ref(), now, self.last_received, self.latest.as_deref());
        match verdict {
            Verdict::Accept => self.accept_unchecked(msg, now),
            Verdict::AcceptAfterReset { jump } => {
                warn!(
                    owner = %self.owner,
                    channel = %self.diagnostic_channel(),
                    jump = ?jump,
                    "detected backward jump in time, resetting time consistency checks"
                );
                self.accept_unchecked(msg, now)
            }
            Verdict::RejectOlder => {
                warn!(
                    owner = %self.owner,
                    channel = %self.diagnostic_channel(),
                    "new message is older than the latest message, skipping it"
                );
                Delivery::Rejected
            }
        }
    }

    fn accept_unchecked(&mut self, msg: Arc<M>, now: SystemTime) -> Delivery<M> {
        let kept = Arc::clone(&msg);
        self.latest = Some(msg);
        self.got_data = true;
        self.new_data = true;
        self.last_received = now;
        Delivery::Accepted(kept)
    }

    /// Returns the latest message and marks it consumed: clears the
    /// new-data flag and records that a take succeeded at least once.
    ///
    /// With no message ever accepted this is a usage error: an error-level
    /// diagnostic is emitted, `None` is returned and no flag changes.
    /// Callers are expected to check [`has_message`](Self::has_message)
    /// first.
    pub fn take(&mut self) -> Option<Arc<M>> {
        let msg = self.peek();
        if msg.is_some() {
            self.new_data = false;
            self.used_data = true;
        }
        msg
    }

    /// Returns the latest message without touching the new-data flag.
    ///
    /// Same usage-error contract as [`take`](Self::take).
    pub fn peek(&self) -> Option<Arc<M>> {
        if !self.got_data {
            error!(
                owner = %self.owner,
                channel = %self.diagnostic_channel(),
                "no data received yet (forgot to check has_message()?), returning empty message"
            );
        }
        self.latest.clone()
    }

    /// Whether at least one message was ever accepted. Monotonic.
    pub fn has_message(&self) -> bool {
        self.got_data
    }

    /// Whether a message was accepted since the last `take()` (or since a
    /// message callback marked it consumed).
    pub fn is_new_message(&self) -> bool {
        self.new_data
    }

    /// Whether `take()` succeeded at least once.
    pub fn was_consumed(&self) -> bool {
        self.used_data
    }

    /// Arrival time of the most recently accepted message.
    pub fn last_message_time(&self) -> SystemTime {
        self.last_received
    }

    /// Configured channel name.
    pub fn channel_name(&self) -> &str {
        &self.channel
    }

    pub(crate) fn set_resolved(&mut self, resolved: &str) {
        self.resolved = Some(Arc::from(resolved));
    }

    pub(crate) fn clear_new_data(&mut self) {
        self.new_data = false;
    }

    /// Resolved name when known, configured name otherwise.
    fn diagnostic_channel(&self) -> &str {
        self.resolved.as_deref().unwrap_or(&self.channel)
    }

    pub(crate) fn diagnostic_channel_arc(&self) -> Arc<str> {
        self.resolved
            .clone()
            .unwrap_or_else(|| Arc::clone(&self.channel))
    }
}
