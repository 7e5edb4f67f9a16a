//! One-shot interrupt flag shared by the keystroke watcher and the renderer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

#[derive(Default)]
struct SignalState {
    raised: AtomicBool,
    notify: Notify,
}

/// A flag that transitions from lowered to raised at most once.
///
/// The watcher is the only writer and the renderer the only reader that acts
/// on it. Clones share the same underlying flag; every stream gets a fresh
/// signal from [`InterruptSignal::new`].
#[derive(Clone, Default)]
pub struct InterruptSignal {
    state: Arc<SignalState>,
}

impl InterruptSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the signal. Returns `true` only for the call that performed the
    /// transition.
    pub fn raise(&self) -> bool {
        if self.state.raised.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.state.notify.notify_waiters();
        true
    }

    pub fn is_raised(&self) -> bool {
        self.state.raised.load(Ordering::SeqCst)
    }

    /// Resolves once the signal has been raised.
    pub async fn raised(&self) {
        loop {
            let notified = self.state.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a raise between the load and the
            // await is not lost.
            notified.as_mut().enable();
            if self.is_raised() {
                return;
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for InterruptSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterruptSignal")
            .field("raised", &self.is_raised())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn raise_transitions_exactly_once() {
        let signal = InterruptSignal::new();
        assert!(!signal.is_raised());
        assert!(signal.raise());
        assert!(!signal.raise());
        assert!(signal.is_raised());
    }

    #[test]
    fn clones_observe_the_same_flag() {
        let signal = InterruptSignal::new();
        let writer = signal.clone();
        writer.raise();
        assert!(signal.is_raised());
        assert!(!InterruptSignal::new().is_raised());
    }

    #[tokio::test]
    async fn raised_wakes_pending_waiter() {
        let signal = InterruptSignal::new();
        let writer = signal.clone();
        let waiter = tokio::spawn(async move { signal.raised().await });

        tokio::time::sleep(Duration::from_millis(5)).await;
        writer.raise();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .expect("waiter task");
    }

    #[tokio::test]
    async fn raised_returns_immediately_when_already_raised() {
        let signal = InterruptSignal::new();
        signal.raise();
        tokio::time::timeout(Duration::from_millis(50), signal.raised())
            .await
            .expect("already raised");
    }
}
