//! Message acceptance policies.
//!
//! This module groups the knobs that decide **whether** an inbound message
//! updates subscription state.
//!
//! ## Contents
//! - [`AcceptancePolicy`] unordered vs time-consistent acceptance, selected
//!   at configuration time
//! - [`StampFn`] extractor for a message's embedded timestamp
//!
//! ## Quick wiring
//! ```text
//! SubscribeOptions { policy: AcceptancePolicy, .. }
//!      └─► handle::SubscriptionCore::deliver_at() uses:
//!           - policy.judge(msg, now, ..) to accept / reset / reject
//! ```
//!
//! ## Defaults
//! - `AcceptancePolicy::Unordered` — every delivered message is accepted.

mod acceptance;

pub use acceptance::{AcceptancePolicy, StampFn};
pub(crate) use acceptance::Verdict;
