//! Subscription handles: state machine, message wrapper, thread-safe
//! decorator.
//!
//! ## Contents
//! - [`SubscriptionCore`] the single-threaded variant: the received/new/
//!   consumed state machine with the delivery algorithm, driven directly
//!   via `&mut self`
//! - [`SubscribeHandle`] the thread-safe variant: the same contract behind
//!   a lock, wired to a [`Transport`](crate::Transport) and to the silence
//!   watchdog
//! - [`IncomingMessage`] the per-delivery wrapper handed to message
//!   callbacks
//!
//! ## Data flow
//! ```text
//! Transport ──► delivery callback ──► SubscriptionCore::deliver_at()
//!                                            │ acceptance policy
//!                                            ▼
//!                          state update + watchdog re-arm  [accepted only]
//!                                            │
//!                                            ▼
//!                         message callback(IncomingMessage)  [outside lock]
//!                                            │ mark_consumed()
//!                                            ▼
//!                                    new-data flag cleared
//! ```

mod core;
mod subscriber;
mod wrapper;

pub use self::core::SubscriptionCore;
pub use subscriber::SubscribeHandle;
pub use wrapper::IncomingMessage;
