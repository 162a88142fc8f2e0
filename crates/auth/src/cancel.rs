//! Cooperative cancellation token for async state-mutation guards.

use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl Inner {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Cancellation flag shared between a task and its owner.
///
/// Every async callback in this subsystem checks its token before mutating
/// shared state, so a result arriving after teardown (or after the principal
/// changed) is dropped instead of applied. Child tokens are cancelled along
/// with their parent but can also be cancelled on their own.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
    parent: Option<Arc<Inner>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token cancelled when either itself or this parent is cancelled.
    pub fn child(&self) -> CancelToken {
        CancelToken {
            inner: Arc::new(Inner::default()),
            parent: Some(self.inner.clone()),
        }
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled() || self.parent.as_ref().is_some_and(|p| p.is_cancelled())
    }

    /// Completes once the token is cancelled. Safe to race against
    /// `cancel()`: the notify interest is registered before the flag is
    /// re-checked.
    pub async fn cancelled(&self) {
        loop {
            let mut own = pin!(self.inner.notify.notified());
            own.as_mut().enable();
            match &self.parent {
                Some(parent) => {
                    let mut inherited = pin!(parent.notify.notified());
                    inherited.as_mut().enable();
                    if self.is_cancelled() {
                        return;
                    }
                    tokio::select! {
                        _ = &mut own => {}
                        _ = &mut inherited => {}
                    }
                }
                None => {
                    if self.is_cancelled() {
                        return;
                    }
                    own.await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn cancel_wakes_waiters() {
        let token = CancelToken::new();
        let waiter = token.clone();
        let task = tokio::spawn(async move { waiter.cancelled().await });

        tokio::task::yield_now().await;
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test]
    async fn child_follows_parent() {
        let parent = CancelToken::new();
        let child = parent.child();
        assert!(!child.is_cancelled());

        parent.cancel();
        assert!(child.is_cancelled());
        tokio::time::timeout(Duration::from_secs(1), child.cancelled())
            .await
            .expect("child waiter should wake on parent cancel");
    }

    #[tokio::test]
    async fn child_cancel_leaves_parent_alive() {
        let parent = CancelToken::new();
        let child = parent.child();

        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());

        let sibling = parent.child();
        assert!(!sibling.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_returns_immediately_when_already_cancelled() {
        let token = CancelToken::new();
        token.cancel();
        tokio::time::timeout(Duration::from_millis(10), token.cancelled())
            .await
            .expect("already-cancelled token must not block");
    }
}
