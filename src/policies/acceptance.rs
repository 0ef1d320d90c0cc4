//! # Acceptance policy for inbound messages.
//!
//! [`AcceptancePolicy`] decides whether a delivered message becomes the new
//! latest message of a subscription:
//!
//! - [`AcceptancePolicy::Unordered`] every message is accepted, stamped with
//!   its arrival time.
//! - [`AcceptancePolicy::TimeConsistent`] messages whose embedded timestamp
//!   is older than the latest accepted one are discarded, with one recovery
//!   rule: if the wall clock itself jumped backwards since the last accepted
//!   message, consistency tracking is reset and the message is accepted
//!   unconditionally. Distinguishing these two cases keeps a legitimately
//!   reordered message out of the state without permanently wedging the
//!   subscription after a system clock rollback.
//!
//! The policy is selected at configuration time and carries its own stamp
//! extractor, so one handle type serves both modes.
//!
//! # Example
//! ```rust
//! use std::time::SystemTime;
//! use subwatch::AcceptancePolicy;
//!
//! struct Fix { stamped_at: SystemTime }
//!
//! let policy: AcceptancePolicy<Fix> =
//!     AcceptancePolicy::time_consistent(|fix: &Fix| fix.stamped_at);
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Extracts the embedded timestamp of a message.
pub type StampFn<M> = Arc<dyn Fn(&M) -> SystemTime + Send + Sync>;

/// Rule deciding whether an inbound message updates subscription state.
pub enum AcceptancePolicy<M> {
    /// Always accept; the message is stamped with its arrival time.
    Unordered,
    /// Accept only messages whose embedded timestamp is not older than the
    /// latest accepted one, unless a backward clock jump is detected.
    TimeConsistent {
        /// Extractor for the message's embedded timestamp.
        stamp: StampFn<M>,
    },
}

/// Outcome of judging one inbound message.
pub(crate) enum Verdict {
    /// Accept and replace the latest message.
    Accept,
    /// The wall clock moved backwards; accept unconditionally and reset
    /// consistency tracking.
    AcceptAfterReset {
        /// Size of the detected backward jump.
        jump: Duration,
    },
    /// The message is older than the latest accepted one; discard it.
    RejectOlder,
}

impl<M> AcceptancePolicy<M> {
    /// Returns the unordered policy.
    pub fn unordered() -> Self {
        AcceptancePolicy::Unordered
    }

    /// Returns a time-consistent policy using `stamp` to read each
    /// message's embedded timestamp.
    pub fn time_consistent(stamp: impl Fn(&M) -> SystemTime + Send + Sync + 'static) -> Self {
        AcceptancePolicy::TimeConsistent {
            stamp: Arc::new(stamp),
        }
    }

    /// Judges one inbound message against the current subscription state.
    ///
    /// `latest` is the currently retained message (`None` until the first
    /// acceptance), `last_received` the arrival time of the last accepted
    /// message, `now` the arrival time of this one.
    ///
    /// The backward-jump check has zero tolerance: any `now` earlier than
    /// `last_received` counts as a clock reset.
    pub(crate) fn judge(
        &self,
        msg: &M,
        now: SystemTime,
        last_received: SystemTime,
        latest: Option<&M>,
    ) -> Verdict {
        match self {
            AcceptancePolicy::Unordered => Verdict::Accept,
            AcceptancePolicy::TimeConsistent { stamp } => {
                if now < last_received {
                    let jump = last_received.duration_since(now).unwrap_or_default();
                    return Verdict::AcceptAfterReset { jump };
                }
                match latest {
                    None => Verdict::Accept,
                    Some(prev) if stamp(msg) >= stamp(prev) => Verdict::Accept,
                    Some(_) => Verdict::RejectOlder,
                }
            }
        }
    }
}

impl<M> Default for AcceptancePolicy<M> {
    /// Returns [`AcceptancePolicy::Unordered`].
    fn default() -> Self {
        AcceptancePolicy::Unordered
    }
}

impl<M> Clone for AcceptancePolicy<M> {
    fn clone(&self) -> Self {
        match self {
            AcceptancePolicy::Unordered => AcceptancePolicy::Unordered,
            AcceptancePolicy::TimeConsistent { stamp } => AcceptancePolicy::TimeConsistent {
                stamp: Arc::clone(stamp),
            },
        }
    }
}

impl<M> fmt::Debug for AcceptancePolicy<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcceptancePolicy::Unordered => f.write_str("Unordered"),
            AcceptancePolicy::TimeConsistent { .. } => f.write_str("TimeConsistent"),
        }
    }
}
