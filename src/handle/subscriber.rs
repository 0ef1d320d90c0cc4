//! # Thread-safe subscription handle.
//!
//! [`SubscribeHandle`] wires a [`SubscriptionCore`] to a
//! [`Transport`](crate::Transport) and the silence watchdog, and exposes the
//! identical contract behind a lock. The transport's delivery callback, the
//! watchdog task and any number of polling threads may hit the same handle
//! concurrently; every operation serializes on one internal mutex.
//!
//! ## Callback execution
//! User callbacks (message and timeout) run **after the state lock is
//! released**, from a snapshot taken under it. A callback may therefore
//! call back into the handle that invoked it — `peek()`, `has_message()`,
//! even `take()` — without deadlocking; the price is that state observed
//! inside the callback can already be newer than the snapshot it was
//! handed. The tests pin down both halves of this trade-off.
//!
//! ## Lifecycle
//! ```text
//! new() ──► start() ──► [delivery / watchdog / polling] ──► stop()
//!              ▲                                              │
//!              └──────────────── restart ─────────────────────┘
//!                       (latest message and flags survive)
//! ```
//!
//! The watchdog and the delivery closure hold only `Weak` references to the
//! handle internals: dropping every handle clone silences them. Call
//! [`stop`](SubscribeHandle::stop) before dropping to also deregister from
//! the transport.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::config::{MessageCallback, SubscribeOptions, TimeoutCallback, TimeoutInfo};
use crate::error::TransportError;
use crate::timer::OneShotTimer;
use crate::transport::{DeliveryFn, DeliveryHints, SubscriptionToken, Transport};

use super::core::{Delivery, SubscriptionCore};
use super::wrapper::IncomingMessage;

struct HandleInner<M: Send + Sync + 'static> {
    core: Mutex<SubscriptionCore<M>>,
    transport: Arc<dyn Transport<M>>,
    timer: Mutex<Option<OneShotTimer>>,
    token: Mutex<Option<SubscriptionToken>>,
    started: AtomicBool,

    channel: Arc<str>,
    owner: Arc<str>,
    queue_depth: usize,
    hints: DeliveryHints,
    silence_timeout: Option<Duration>,
    timeout_callback: Option<TimeoutCallback>,
    message_callback: Option<MessageCallback<M>>,
}

impl<M: Send + Sync + 'static> HandleInner<M> {
    /// Delivery path, entered from the transport's receive context.
    fn on_delivery(inner: &HandleInner<M>, msg: Arc<M>) {
        let outcome = inner.core.lock().deliver_at(msg, SystemTime::now());
        if let Delivery::Accepted(accepted) = outcome {
            // The silence window restarts from this acceptance. Rejected
            // messages are not liveness: they leave the running deadline
            // intact.
            if let Some(timer) = inner.timer.lock().as_ref() {
                timer.start();
            }
            if let Some(callback) = &inner.message_callback {
                let wrapped = IncomingMessage::new(accepted, Arc::clone(&inner.channel));
                callback(&wrapped);
                if wrapped.is_consumed() {
                    inner.core.lock().clear_new_data();
                }
            }
        }
    }

    /// Watchdog expiry path. Snapshots state, re-arms, then reports.
    fn on_timeout(inner: &HandleInner<M>) {
        let (last, channel) = {
            let core = inner.core.lock();
            (core.last_message_time(), core.diagnostic_channel_arc())
        };
        let publisher_count = {
            let token = inner.token.lock();
            token
                .as_ref()
                .map(|t| inner.transport.publisher_count(t))
                .unwrap_or(0)
        };
        // Re-arm first so the watchdog keeps signalling while silence
        // continues. After stop() the timer slot is empty and the cycle
        // ends here.
        if let Some(timer) = inner.timer.lock().as_ref() {
            timer.start();
        }

        let silent_for = SystemTime::now().duration_since(last).unwrap_or_default();
        let report = TimeoutInfo {
            channel,
            last_message_at: last,
            silent_for,
            publisher_count,
        };
        match &inner.timeout_callback {
            Some(callback) => callback(&report),
            None => warn!(
                owner = %inner.owner,
                channel = %report.channel,
                silent_for = ?report.silent_for,
                publishers = report.publisher_count,
                "did not receive any message on channel"
            ),
        }
    }
}

/// Thread-safe subscription handle.
///
/// Cheap to clone; clones share the same subscription state. See the
/// [module docs](self) for the locking and callback contract.
///
/// ## Example
/// ```rust
/// use std::sync::Arc;
/// use subwatch::{LocalTransport, SubscribeHandle, SubscribeOptions};
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() {
///     let transport = LocalTransport::<u32>::new();
///     let publisher = transport.publisher("nums");
///
///     let handle = SubscribeHandle::new(
///         Arc::new(transport.clone()),
///         SubscribeOptions::new("nums").with_owner("demo"),
///     );
///     handle.start().await.unwrap();
///
///     publisher.publish(7);
///     assert!(handle.has_message());
///     assert_eq!(handle.take().as_deref(), Some(&7));
///
///     handle.stop().await;
/// }
/// ```
pub struct SubscribeHandle<M: Send + Sync + 'static> {
    inner: Arc<HandleInner<M>>,
}

impl<M: Send + Sync + 'static> Clone for SubscribeHandle<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: Send + Sync + 'static> SubscribeHandle<M> {
    /// Creates a stopped handle from `options`. Nothing is subscribed or
    /// armed until [`start`](Self::start).
    pub fn new(transport: Arc<dyn Transport<M>>, options: SubscribeOptions<M>) -> Self {
        let core = SubscriptionCore::new(&options);
        Self {
            inner: Arc::new(HandleInner {
                core: Mutex::new(core),
                transport,
                timer: Mutex::new(None),
                token: Mutex::new(None),
                started: AtomicBool::new(false),
                channel: Arc::from(options.channel.as_str()),
                owner: Arc::from(options.owner.as_str()),
                queue_depth: options.queue_depth,
                hints: options.hints.clone(),
                silence_timeout: options.timeout(),
                timeout_callback: options.timeout_callback.clone(),
                message_callback: options.message_callback.clone(),
            }),
        }
    }

    /// Subscribes to the transport and arms the watchdog (if a silence
    /// timeout is configured).
    ///
    /// Idempotent: a second `start()` on a running handle is a no-op and
    /// creates no duplicate registrations. After a [`stop`](Self::stop),
    /// `start()` resumes delivery and supervision with the previous state
    /// (latest message, flags) intact.
    pub async fn start(&self) -> Result<(), TransportError> {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let weak: Weak<HandleInner<M>> = Arc::downgrade(&self.inner);
        let deliver: DeliveryFn<M> = Arc::new(move |msg| {
            if let Some(inner) = weak.upgrade() {
                HandleInner::on_delivery(&inner, msg);
            }
        });

        let token = match self
            .inner
            .transport
            .subscribe(
                &self.inner.channel,
                self.inner.queue_depth,
                &self.inner.hints,
                deliver,
            )
            .await
        {
            Ok(token) => token,
            Err(err) => {
                self.inner.started.store(false, Ordering::SeqCst);
                return Err(err);
            }
        };

        let resolved = self.inner.transport.resolved_channel_name(&token);
        info!(
            owner = %self.inner.owner,
            channel = %self.inner.channel,
            resolved = %resolved,
            "subscribed to channel"
        );
        self.inner.core.lock().set_resolved(&resolved);
        *self.inner.token.lock() = Some(token);

        if let Some(silence) = self.inner.silence_timeout {
            let weak: Weak<HandleInner<M>> = Arc::downgrade(&self.inner);
            let timer = OneShotTimer::new(
                silence,
                Arc::new(move || {
                    if let Some(inner) = weak.upgrade() {
                        HandleInner::on_timeout(&inner);
                    }
                }),
            );
            timer.start();
            *self.inner.timer.lock() = Some(timer);
        }
        Ok(())
    }

    /// Halts watchdog supervision and transport delivery.
    ///
    /// Safe to call when already stopped. A delivery or timeout callback
    /// already in flight may still complete; no new ones begin. State is
    /// preserved for a later [`start`](Self::start).
    pub async fn stop(&self) {
        if !self.inner.started.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(timer) = self.inner.timer.lock().take() {
            timer.stop();
        }
        let token = self.inner.token.lock().take();
        if let Some(token) = token {
            self.inner.transport.unsubscribe(&token).await;
        }
    }

    /// Returns the latest message and clears the new-data flag.
    ///
    /// `None` (plus an error-level diagnostic) when no message was ever
    /// received; check [`has_message`](Self::has_message) first.
    pub fn take(&self) -> Option<Arc<M>> {
        self.inner.core.lock().take()
    }

    /// Returns the latest message without clearing the new-data flag.
    pub fn peek(&self) -> Option<Arc<M>> {
        self.inner.core.lock().peek()
    }

    /// Whether at least one message was ever accepted. Monotonic.
    pub fn has_message(&self) -> bool {
        self.inner.core.lock().has_message()
    }

    /// Whether a message was accepted since the last `take()`.
    pub fn is_new_message(&self) -> bool {
        self.inner.core.lock().is_new_message()
    }

    /// Whether `take()` succeeded at least once.
    pub fn was_consumed(&self) -> bool {
        self.inner.core.lock().was_consumed()
    }

    /// Arrival time of the most recently accepted message.
    pub fn last_message_time(&self) -> SystemTime {
        self.inner.core.lock().last_message_time()
    }

    /// Configured channel name.
    pub fn channel_name(&self) -> &str {
        &self.inner.channel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::OnceLock;

    use tokio::time;

    use crate::policies::AcceptancePolicy;
    use crate::transport::LocalTransport;

    struct Stamped {
        stamp: SystemTime,
        seq: u32,
    }

    fn stamped(offset: Duration, seq: u32) -> Stamped {
        Stamped {
            stamp: SystemTime::UNIX_EPOCH + offset,
            seq,
        }
    }

    fn counting_timeout(fires: &Arc<AtomicUsize>) -> impl Fn(&TimeoutInfo) + Send + Sync + 'static {
        let fires = Arc::clone(fires);
        move |_info| {
            fires.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn init_diagnostics() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fires_repeatedly_while_silent() {
        let transport = LocalTransport::<u32>::new();
        let fires = Arc::new(AtomicUsize::new(0));
        let handle = SubscribeHandle::new(
            Arc::new(transport),
            SubscribeOptions::new("quiet")
                .with_silence_timeout(Duration::from_secs(5))
                .on_timeout(counting_timeout(&fires)),
        );
        handle.start().await.unwrap();

        time::sleep(Duration::from_millis(4900)).await;
        assert_eq!(fires.load(Ordering::SeqCst), 0);
        time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fires.load(Ordering::SeqCst), 1);
        // Re-armed on firing: keeps signalling every 5s of silence.
        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fires.load(Ordering::SeqCst), 2);
        assert!(!handle.has_message());

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_accepted_message_rearms_watchdog() {
        let transport = LocalTransport::<u32>::new();
        let publisher = transport.publisher("beat");
        let fires = Arc::new(AtomicUsize::new(0));
        let handle = SubscribeHandle::new(
            Arc::new(transport),
            SubscribeOptions::new("beat")
                .with_silence_timeout(Duration::from_secs(5))
                .on_timeout(counting_timeout(&fires)),
        );
        handle.start().await.unwrap();

        time::sleep(Duration::from_secs(3)).await;
        publisher.publish(1);
        // Deadline pushed to t=8s: nothing at the original t=5s mark.
        time::sleep(Duration::from_millis(4900)).await;
        assert_eq!(fires.load(Ordering::SeqCst), 0);
        time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fires.load(Ordering::SeqCst), 1);

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_prevents_further_firings() {
        let transport = LocalTransport::<u32>::new();
        let fires = Arc::new(AtomicUsize::new(0));
        let handle = SubscribeHandle::new(
            Arc::new(transport),
            SubscribeOptions::new("quiet")
                .with_silence_timeout(Duration::from_secs(5))
                .on_timeout(counting_timeout(&fires)),
        );
        handle.start().await.unwrap();
        time::sleep(Duration::from_secs(1)).await;
        handle.stop().await;

        time::sleep(Duration::from_secs(30)).await;
        assert_eq!(fires.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_delivery_take_and_flags() {
        let transport = LocalTransport::<u32>::new();
        let publisher = transport.publisher("nums");
        let handle = SubscribeHandle::new(Arc::new(transport), SubscribeOptions::new("nums"));
        handle.start().await.unwrap();

        assert!(handle.take().is_none());
        publisher.publish(41);
        publisher.publish(42);

        assert!(handle.has_message());
        assert!(handle.is_new_message());
        assert!(!handle.was_consumed());
        assert_eq!(handle.peek().as_deref(), Some(&42));
        assert!(handle.is_new_message());
        assert_eq!(handle.take().as_deref(), Some(&42));
        assert!(!handle.is_new_message());
        assert!(handle.was_consumed());
        assert_eq!(handle.channel_name(), "nums");

        handle.stop().await;
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let transport = LocalTransport::<u32>::new();
        let publisher = transport.publisher("nums");
        let deliveries = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&deliveries);
        let handle = SubscribeHandle::new(
            Arc::new(transport),
            SubscribeOptions::new("nums").on_message(move |_incoming: &IncomingMessage<u32>| {
                seen.fetch_add(1, Ordering::SeqCst);
            }),
        );
        handle.start().await.unwrap();
        handle.start().await.unwrap();

        publisher.publish(1);
        assert_eq!(deliveries.load(Ordering::SeqCst), 1);

        handle.stop().await;
    }

    #[tokio::test]
    async fn test_stop_then_start_preserves_state() {
        let transport = LocalTransport::<u32>::new();
        let publisher = transport.publisher("nums");
        let handle =
            SubscribeHandle::new(Arc::new(transport.clone()), SubscribeOptions::new("nums"));
        handle.start().await.unwrap();

        publisher.publish(5);
        assert_eq!(handle.take().as_deref(), Some(&5));
        let last_seen = handle.last_message_time();

        handle.stop().await;
        // Published while stopped: never delivered.
        publisher.publish(6);
        assert_eq!(handle.peek().as_deref(), Some(&5));
        assert_eq!(handle.last_message_time(), last_seen);

        handle.start().await.unwrap();
        assert!(handle.has_message());
        assert!(handle.was_consumed());
        publisher.publish(7);
        assert_eq!(handle.take().as_deref(), Some(&7));

        handle.stop().await;
    }

    #[tokio::test]
    async fn test_stop_when_never_started_is_noop() {
        let transport = LocalTransport::<u32>::new();
        let handle = SubscribeHandle::new(Arc::new(transport), SubscribeOptions::new("nums"));
        handle.stop().await;
        handle.stop().await;
        assert!(!handle.has_message());
    }

    #[tokio::test]
    async fn test_time_consistent_rejection_through_handle() {
        init_diagnostics();
        let transport = LocalTransport::<Stamped>::new();
        let publisher = transport.publisher("stamped");
        let handle = SubscribeHandle::new(
            Arc::new(transport),
            SubscribeOptions::new("stamped")
                .with_policy(AcceptancePolicy::time_consistent(|m: &Stamped| m.stamp)),
        );
        handle.start().await.unwrap();

        publisher.publish(stamped(Duration::from_secs(10), 1));
        publisher.publish(stamped(Duration::from_secs(9), 2));
        assert_eq!(handle.take().map(|m| m.seq), Some(1));

        publisher.publish(stamped(Duration::from_secs(11), 3));
        assert_eq!(handle.take().map(|m| m.seq), Some(3));

        handle.stop().await;
    }

    // Callbacks run after the state lock is released: a reentrant call from
    // inside the message callback re-acquires a free lock instead of
    // deadlocking. The flip side of the snapshot approach is relaxed
    // atomicity — by the time the callback runs, the state it queries may
    // already have moved past the message it was handed.
    #[tokio::test]
    async fn test_message_callback_may_reenter_handle() {
        static SLOT: OnceLock<SubscribeHandle<u32>> = OnceLock::new();
        let reentered = Arc::new(AtomicUsize::new(0));

        let transport = LocalTransport::<u32>::new();
        let publisher = transport.publisher("nums");
        let seen = Arc::clone(&reentered);
        let handle = SubscribeHandle::new(
            Arc::new(transport),
            SubscribeOptions::new("nums").on_message(move |incoming: &IncomingMessage<u32>| {
                if let Some(handle) = SLOT.get() {
                    assert!(handle.has_message());
                    assert_eq!(handle.peek().as_deref(), Some(incoming.message().as_ref()));
                    seen.fetch_add(1, Ordering::SeqCst);
                }
                incoming.mark_consumed();
            }),
        );
        let _ = SLOT.set(handle.clone());
        handle.start().await.unwrap();

        publisher.publish(3);
        assert_eq!(reentered.load(Ordering::SeqCst), 1);
        // Marked consumed inside the callback: nothing new for pollers.
        assert!(!handle.is_new_message());
        assert!(handle.has_message());

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_callback_may_reenter_handle() {
        static SLOT: OnceLock<SubscribeHandle<u32>> = OnceLock::new();
        let fires = Arc::new(AtomicUsize::new(0));

        let transport = LocalTransport::<u32>::new();
        let transport_arc = Arc::new(transport.clone());
        let seen = Arc::clone(&fires);
        let handle = SubscribeHandle::new(
            transport_arc,
            SubscribeOptions::new("quiet")
                .with_owner("watchdog_test")
                .with_silence_timeout(Duration::from_secs(2))
                .on_timeout(move |report| {
                    if let Some(handle) = SLOT.get() {
                        assert!(!handle.has_message());
                        assert_eq!(handle.channel_name(), "quiet");
                    }
                    assert_eq!(report.publisher_count, 0);
                    seen.fetch_add(1, Ordering::SeqCst);
                }),
        );
        let _ = SLOT.set(handle.clone());
        handle.start().await.unwrap();

        time::sleep(Duration::from_millis(2100)).await;
        assert_eq!(fires.load(Ordering::SeqCst), 1);

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_report_carries_publisher_count() {
        let transport = LocalTransport::<u32>::new();
        let _p1 = transport.publisher("counted");
        let _p2 = transport.publisher("counted");
        let counts = Arc::new(AtomicUsize::new(usize::MAX));
        let seen = Arc::clone(&counts);
        let handle = SubscribeHandle::new(
            Arc::new(transport),
            SubscribeOptions::new("counted")
                .with_silence_timeout(Duration::from_secs(1))
                .on_timeout(move |report| {
                    seen.store(report.publisher_count, Ordering::SeqCst);
                }),
        );
        handle.start().await.unwrap();

        time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(counts.load(Ordering::SeqCst), 2);

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_messages_do_not_postpone_watchdog() {
        let transport = LocalTransport::<Stamped>::new();
        let publisher = transport.publisher("stamped");
        let fires = Arc::new(AtomicUsize::new(0));
        let handle = SubscribeHandle::new(
            Arc::new(transport),
            SubscribeOptions::new("stamped")
                .with_policy(AcceptancePolicy::time_consistent(|m: &Stamped| m.stamp))
                .with_silence_timeout(Duration::from_secs(5))
                .on_timeout(counting_timeout(&fires)),
        );
        handle.start().await.unwrap();

        time::sleep(Duration::from_secs(1)).await;
        publisher.publish(stamped(Duration::from_secs(100), 1));
        // Older-stamp traffic is rejected and must not count as liveness:
        // the deadline stays at t=6s (one window after the acceptance).
        time::sleep(Duration::from_secs(3)).await;
        publisher.publish(stamped(Duration::from_secs(50), 2));
        time::sleep(Duration::from_millis(1900)).await;
        assert_eq!(fires.load(Ordering::SeqCst), 0);
        time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fires.load(Ordering::SeqCst), 1);
        assert_eq!(handle.take().map(|m| m.seq), Some(1));

        handle.stop().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delivery_from_non_runtime_thread() {
        let transport = LocalTransport::<u32>::new();
        let publisher = transport.publisher("nums");
        let handle = SubscribeHandle::new(
            Arc::new(transport),
            SubscribeOptions::new("nums").with_silence_timeout(Duration::from_secs(5)),
        );
        handle.start().await.unwrap();

        // Transports may deliver from threads the runtime knows nothing
        // about; the watchdog re-arm must not require a runtime context.
        std::thread::spawn(move || publisher.publish(7))
            .join()
            .expect("publishing thread panicked");

        assert_eq!(handle.take().as_deref(), Some(&7));
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_timeout_handler_logs_and_rearms() {
        init_diagnostics();
        let transport = LocalTransport::<u32>::new();
        let handle = SubscribeHandle::new(
            Arc::new(transport),
            SubscribeOptions::new("quiet")
                .with_owner("demo")
                .with_silence_timeout(Duration::from_secs(1)),
        );
        handle.start().await.unwrap();

        // No timeout callback configured: the default handler warns on each
        // firing and the handle stays usable.
        time::sleep(Duration::from_millis(2500)).await;
        assert!(!handle.has_message());

        handle.stop().await;
    }

    struct RefusingTransport;

    #[async_trait::async_trait]
    impl Transport<u32> for RefusingTransport {
        async fn subscribe(
            &self,
            channel: &str,
            _queue_depth: usize,
            _hints: &DeliveryHints,
            _on_message: DeliveryFn<u32>,
        ) -> Result<SubscriptionToken, TransportError> {
            Err(TransportError::SubscribeFailed {
                channel: channel.to_string(),
                reason: "broker unreachable".into(),
            })
        }

        async fn unsubscribe(&self, _token: &SubscriptionToken) {}

        fn resolved_channel_name(&self, token: &SubscriptionToken) -> String {
            token.channel().to_string()
        }

        fn publisher_count(&self, _token: &SubscriptionToken) -> usize {
            0
        }
    }

    #[tokio::test]
    async fn test_failed_subscribe_leaves_handle_stopped() {
        let handle = SubscribeHandle::new(Arc::new(RefusingTransport), SubscribeOptions::new("nums"));
        let err = handle.start().await.unwrap_err();
        assert_eq!(err.as_label(), "transport_subscribe_failed");
        // The failed start does not latch the running flag; a later start
        // may retry the subscription.
        assert!(!handle.inner.started.load(Ordering::SeqCst));
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_watchdog_disabled_by_zero_sentinel() {
        let transport = LocalTransport::<u32>::new();
        let fires = Arc::new(AtomicUsize::new(0));
        let handle = SubscribeHandle::new(
            Arc::new(transport),
            SubscribeOptions::new("free")
                .with_silence_timeout(Duration::ZERO)
                .on_timeout(counting_timeout(&fires)),
        );
        handle.start().await.unwrap();
        // No timer was ever created.
        assert!(handle.inner.timer.lock().is_none());
        handle.stop().await;
        assert_eq!(fires.load(Ordering::SeqCst), 0);
    }
}
