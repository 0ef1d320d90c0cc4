//! Error types used by the subscription handles and transports.
//!
//! The handle contract itself is total: `take`/`peek` on an empty handle
//! return `None` with an error-level diagnostic, ordering violations are
//! discarded with a warning, and clock regressions recover automatically.
//! The only fallible public operation is connecting to the transport, which
//! surfaces a [`TransportError`].

use thiserror::Error;

/// # Errors produced by a message transport.
///
/// Returned from [`Transport::subscribe`](crate::Transport::subscribe) and
/// propagated out of [`SubscribeHandle::start`](crate::SubscribeHandle::start).
/// Transport-level failures past that point (publishers disappearing, broker
/// hiccups) are outside the handle's responsibility and only show up as
/// sustained watchdog firings.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum TransportError {
    /// The transport refused or failed the subscription request.
    #[error("failed to subscribe to channel '{channel}': {reason}")]
    SubscribeFailed {
        /// The configured channel name.
        channel: String,
        /// Transport-specific failure description.
        reason: String,
    },
}

impl TransportError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use subwatch::TransportError;
    ///
    /// let err = TransportError::SubscribeFailed {
    ///     channel: "sensors/imu".into(),
    ///     reason: "broker unreachable".into(),
    /// };
    /// assert_eq!(err.as_label(), "transport_subscribe_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            TransportError::SubscribeFailed { .. } => "transport_subscribe_failed",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            TransportError::SubscribeFailed { channel, reason } => {
                format!("subscribe to '{channel}' failed: {reason}")
            }
        }
    }
}
