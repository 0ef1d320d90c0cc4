//! # Restartable one-shot timer.
//!
//! [`OneShotTimer`] implements the timer contract the subscription watchdog
//! is built on:
//! - [`OneShotTimer::start`] arms the timer; starting an armed timer resets
//!   the deadline to the full duration from now.
//! - [`OneShotTimer::stop`] cancels the pending expiry.
//! - The expiry callback fires at most once per arm cycle.
//!
//! Each arm cycle spawns a task that `select!`s the expiry sleep against a
//! per-cycle [`CancellationToken`]; `stop()` (or a re-arm) cancels the token
//! and the cycle ends without firing. The timer captures the runtime it was
//! created on, so it may be armed and stopped from any thread — including
//! threads that do not belong to a tokio runtime.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::select;
use tokio::time;
use tokio_util::sync::CancellationToken;

/// Callback invoked when the timer expires.
pub type ExpiryFn = Arc<dyn Fn() + Send + Sync>;

/// One-shot timer that can be stopped and re-armed.
pub struct OneShotTimer {
    duration: Duration,
    on_expiry: ExpiryFn,
    runtime: Handle,
    armed: Mutex<Option<CancellationToken>>,
}

impl OneShotTimer {
    /// Creates a timer firing `on_expiry` once, `duration` after each arm.
    ///
    /// Captures the current tokio runtime for the expiry tasks, so it must
    /// be created from within one; [`start`](Self::start) and
    /// [`stop`](Self::stop) then work from any thread.
    pub fn new(duration: Duration, on_expiry: ExpiryFn) -> Self {
        Self {
            duration,
            on_expiry,
            runtime: Handle::current(),
            armed: Mutex::new(None),
        }
    }

    /// Arms the timer, cancelling any previous arm cycle.
    ///
    /// The deadline is the full configured duration from the moment of this
    /// call.
    pub fn start(&self) {
        let token = CancellationToken::new();
        {
            let mut armed = self.armed.lock();
            if let Some(prev) = armed.take() {
                prev.cancel();
            }
            *armed = Some(token.clone());
        }
        let on_expiry = Arc::clone(&self.on_expiry);
        let duration = self.duration;
        self.runtime.spawn(async move {
            select! {
                _ = token.cancelled() => {}
                _ = time::sleep(duration) => {
                    (on_expiry)();
                }
            }
        });
    }

    /// Cancels the pending expiry, if any. Safe to call when not armed.
    pub fn stop(&self) {
        if let Some(token) = self.armed.lock().take() {
            token.cancel();
        }
    }
}

impl Drop for OneShotTimer {
    fn drop(&mut self) {
        self.stop();
    }
}
