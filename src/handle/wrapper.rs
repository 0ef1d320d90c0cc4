//! Per-delivery message wrapper.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Wrapper handed to the message callback for one accepted message.
///
/// Lets the callback signal that it consumed the message: a consumed
/// message does not set the handle's new-data flag, so a poller calling
/// [`is_new_message`](crate::SubscribeHandle::is_new_message) afterwards
/// sees nothing pending. By default (callback returns without marking) the
/// flag stays set.
pub struct IncomingMessage<M> {
    message: Arc<M>,
    channel: Arc<str>,
    consumed: AtomicBool,
}

impl<M> IncomingMessage<M> {
    pub(crate) fn new(message: Arc<M>, channel: Arc<str>) -> Self {
        Self {
            message,
            channel,
            consumed: AtomicBool::new(false),
        }
    }

    /// The accepted payload.
    pub fn message(&self) -> &Arc<M> {
        &self.message
    }

    /// Configured channel name of the subscription this arrived on.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Marks the message as consumed, clearing the handle's new-data flag
    /// once the callback returns.
    pub fn mark_consumed(&self) {
        self.consumed.store(true, Ordering::Release);
    }

    /// Whether the callback marked the message consumed.
    pub fn is_consumed(&self) -> bool {
        self.consumed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unmarked_by_default() {
        let wrapped = IncomingMessage::new(Arc::new(42u32), Arc::from("chan"));
        assert!(!wrapped.is_consumed());
        assert_eq!(**wrapped.message(), 42);
        assert_eq!(wrapped.channel(), "chan");
    }

    #[test]
    fn test_mark_consumed_sticks() {
        let wrapped = IncomingMessage::new(Arc::new(1u32), Arc::from("chan"));
        wrapped.mark_consumed();
        assert!(wrapped.is_consumed());
    }
}
