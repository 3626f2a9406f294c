//! Cancellation token for cooperative cancellation.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::Notify;

/// A token for cooperative cancellation.
///
/// Cancellation is idempotent - only the first cancellation reason is kept.
/// Cancelling a token also cancels every child token derived from it.
#[derive(Default)]
pub struct CancellationToken {
    /// Whether cancellation has been requested.
    cancelled: AtomicBool,
    /// The reason for cancellation (first one wins).
    reason: RwLock<Option<String>>,
    /// Wakes tasks awaiting `cancelled()`.
    notify: Notify,
    /// Child tokens that follow this one.
    children: RwLock<Vec<Weak<CancellationToken>>>,
}

impl CancellationToken {
    /// Creates a new cancellation token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a token that is cancelled whenever this token is cancelled.
    ///
    /// Cancelling the child does not affect the parent.
    #[must_use]
    pub fn child_token(&self) -> Arc<Self> {
        let child = Arc::new(Self::new());
        if self.is_cancelled() {
            child.cancel(self.reason().unwrap_or_default());
        } else {
            let mut children = self.children.write();
            children.retain(|weak| weak.strong_count() > 0);
            children.push(Arc::downgrade(&child));
        }
        child
    }

    /// Requests cancellation with a reason.
    ///
    /// This is idempotent - only the first reason is kept.
    pub fn cancel(&self, reason: impl Into<String>) {
        let reason = reason.into();
        {
            // The reason is in place before the flag becomes visible.
            let mut slot = self.reason.write();
            if self
                .cancelled
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                return;
            }
            *slot = Some(reason.clone());
        }
        self.notify.notify_waiters();

        let children: Vec<_> = self.children.write().drain(..).collect();
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel(reason.clone());
        }
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.reason.read().clone()
    }

    /// Completes once cancellation has been requested.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_token_default_not_cancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.reason().is_none());
    }

    #[test]
    fn test_token_cancel_idempotent() {
        let token = CancellationToken::new();
        token.cancel("First reason");
        token.cancel("Second reason");

        assert!(token.is_cancelled());
        assert_eq!(token.reason(), Some("First reason".to_string()));
    }

    #[test]
    fn test_cancelled_token_always_has_reason() {
        for _ in 0..200 {
            let token = Arc::new(CancellationToken::new());
            let canceller = {
                let token = token.clone();
                std::thread::spawn(move || token.cancel("stop"))
            };
            while !token.is_cancelled() {
                std::hint::spin_loop();
            }
            assert_eq!(token.reason().as_deref(), Some("stop"));
            canceller.join().unwrap();
        }
    }

    #[test]
    fn test_child_token_follows_parent() {
        let parent = CancellationToken::new();
        let child = parent.child_token();

        child.cancel("child only");
        assert!(!parent.is_cancelled());

        let other = parent.child_token();
        parent.cancel("shutdown");
        assert!(other.is_cancelled());
        assert_eq!(other.reason().as_deref(), Some("shutdown"));
    }

    #[test]
    fn test_child_of_cancelled_parent_starts_cancelled() {
        let parent = CancellationToken::new();
        parent.cancel("gone");
        assert!(parent.child_token().is_cancelled());
    }

    #[test]
    fn test_cancelled_future_ready_when_already_cancelled() {
        let token = CancellationToken::new();
        token.cancel("done");
        tokio_test::block_on(token.cancelled());
        assert_eq!(token.reason().as_deref(), Some("done"));
    }

    #[tokio::test]
    async fn test_cancelled_future_wakes() {
        let token = Arc::new(CancellationToken::new());
        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel("wake");

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should complete")
            .expect("task should not panic");
    }
}
