//! # subwatch
//!
//! **subwatch** manages the lifecycle and liveness of exactly one typed
//! pub/sub subscription at a time: it keeps the latest message, tracks
//! received/new/consumed flags, optionally enforces monotonic message
//! ordering, and barks through a re-armed silence watchdog when the
//! publisher goes quiet.
//!
//! It is a client-side building block, not a broker: the transport is an
//! external collaborator behind the [`Transport`] trait.
//!
//! ## Architecture
//! ```text
//!  ┌───────────────┐   delivery callback    ┌──────────────────────────────┐
//!  │   Transport   │ ─────────────────────► │  SubscribeHandle             │
//!  │ (broker side) │      Arc<M>            │  ┌────────────────────────┐  │
//!  └───────────────┘                        │  │ SubscriptionCore       │  │
//!         ▲                                 │  │  - AcceptancePolicy    │  │
//!         │ subscribe / unsubscribe         │  │  - latest + flags      │  │
//!         │ publisher_count                 │  └────────────────────────┘  │
//!         │                                 │  ┌────────────────────────┐  │
//!         └──────────────────────────────── │  │ OneShotTimer watchdog  │  │
//!                                           │  │  fire → report → rearm │  │
//!                                           │  └────────────────────────┘  │
//!                                           └──────────────┬───────────────┘
//!                                                          │ take()/peek()/flags
//!                                                          ▼
//!                                                   polling thread(s)
//! ```
//!
//! ## Two variants, one contract
//! - [`SubscriptionCore`] — single-threaded: the bare state machine,
//!   `&mut self`, no locking, fed by whoever owns the delivery loop.
//! - [`SubscribeHandle`] — thread-safe: the same contract behind one lock,
//!   wired to a transport and the watchdog. User callbacks run outside the
//!   lock, so a callback may query the handle that invoked it.
//!
//! ## Acceptance policies
//! | Policy | Behavior |
//! |---|---|
//! | [`AcceptancePolicy::Unordered`] | every delivered message is accepted |
//! | [`AcceptancePolicy::TimeConsistent`] | messages with an older embedded timestamp are discarded; a backward wall-clock jump resets tracking instead of wedging the subscription |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use subwatch::{LocalTransport, SubscribeHandle, SubscribeOptions};
//!
//! #[derive(Debug)]
//! struct Reading {
//!     value: f64,
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let transport = LocalTransport::<Reading>::new();
//!     let publisher = transport.publisher("sensors/imu");
//!
//!     let handle = SubscribeHandle::new(
//!         Arc::new(transport.clone()),
//!         SubscribeOptions::new("sensors/imu")
//!             .with_owner("state_estimator")
//!             .with_silence_timeout(Duration::from_secs(5)),
//!     );
//!     handle.start().await.unwrap();
//!
//!     publisher.publish(Reading { value: 9.81 });
//!     if handle.has_message() {
//!         let reading = handle.take().unwrap();
//!         assert_eq!(reading.value, 9.81);
//!     }
//!
//!     handle.stop().await;
//! }
//! ```

mod config;
mod error;
mod handle;
mod policies;
mod timer;
mod transport;

// ---- Public re-exports ----

pub use config::{MessageCallback, SubscribeOptions, TimeoutCallback, TimeoutInfo};
pub use error::TransportError;
pub use handle::{IncomingMessage, SubscribeHandle, SubscriptionCore};
pub use policies::{AcceptancePolicy, StampFn};
pub use timer::{ExpiryFn, OneShotTimer};
pub use transport::{
    DeliveryFn, DeliveryHints, LocalPublisher, LocalTransport, SubscriptionToken, Transport,
};
