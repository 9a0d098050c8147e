use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// Run-scoped cancellation signal. Cloning shares the same underlying
/// state, so triggering one clone cancels every in-flight attempt holding
/// another.
#[derive(Clone)]
pub struct AbortSignal(Arc<Inner>);

struct Inner {
    triggered: AtomicBool,
    notify: Notify,
}

impl Default for AbortSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl AbortSignal {
    pub fn new() -> Self {
        Self(Arc::new(Inner {
            triggered: AtomicBool::new(false),
            notify: Notify::new(),
        }))
    }

    pub fn trigger(&self) {
        self.0.triggered.store(true, Ordering::SeqCst);
        self.0.notify.notify_waiters();
    }

    pub fn is_triggered(&self) -> bool {
        self.0.triggered.load(Ordering::SeqCst)
    }

    /// Resolves immediately if already triggered; otherwise waits.
    pub async fn cancelled(&self) {
        if self.is_triggered() {
            return;
        }
        self.0.notify.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancelled_resolves_immediately_once_triggered() {
        let signal = AbortSignal::new();
        signal.trigger();
        signal.cancelled().await;
        assert!(signal.is_triggered());
    }

    #[tokio::test]
    async fn clones_share_state() {
        let signal = AbortSignal::new();
        let clone = signal.clone();
        clone.trigger();
        assert!(signal.is_triggered());
    }
}
