//! Cancellation signal shared across concurrent requests.
//!
//! A [`CancelSignal`] is raised once (Ctrl+C in the binary, or the caller) and
//! observed by every pending and in-flight request of a retrieval. Raising it
//! never discards chunks that already completed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Shared handle to a cancel signal.
pub type SharedCancel = Arc<CancelSignal>;

/// One-shot cancellation flag with async notification.
#[derive(Debug, Default)]
pub struct CancelSignal {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelSignal {
    /// Create a signal that has not been raised.
    pub fn new() -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Create a new shared signal wrapped in [`Arc`].
    pub fn shared() -> SharedCancel {
        Arc::new(Self::new())
    }

    /// Raise the signal. Wakes all waiters exactly once.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    /// Whether the signal has been raised.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Wait until the signal is raised. Returns immediately if already raised.
    pub async fn cancelled(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a concurrent cancel() is not missed.
        notified.as_mut().enable();

        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

/// Whether an optional signal has been raised.
pub fn is_cancelled(signal: Option<&SharedCancel>) -> bool {
    signal.map(|s| s.is_cancelled()).unwrap_or(false)
}
