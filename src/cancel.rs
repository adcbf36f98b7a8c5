//! A hierarchical cancellation signal (spec.md §5: "a single hierarchical cancellation token (root
//! → per-request) supersedes any ambient context; every suspension point observes it"). Built on a
//! `tokio::sync::watch` channel rather than a dedicated crate: cloning a [`CancellationToken`] and
//! observing `is_canceled()`/`canceled()` is all any suspension point in this crate needs, and a
//! watch channel gives that for free without pulling in `tokio-util`.

use tokio::sync::watch;

#[derive(Clone)]
pub struct CancellationToken {
    rx: watch::Receiver<bool>,
}

#[derive(Clone)]
pub struct CancellationHandle {
    tx: watch::Sender<bool>,
}

/// A token that can never fire, for callers that don't need one (e.g. the node's own background
/// bookkeeping, as opposed to a consumer-facing call).
pub fn never() -> CancellationToken {
    let (_tx, rx) = watch::channel(false);
    CancellationToken { rx }
}

pub fn pair() -> (CancellationHandle, CancellationToken) {
    let (tx, rx) = watch::channel(false);
    (CancellationHandle { tx }, CancellationToken { rx })
}

impl CancellationHandle {
    /// A child token: canceling the parent cancels every child, but canceling a child has no
    /// effect on its parent or siblings (spec.md §9: "root → per-request").
    pub fn child(&self) -> (CancellationHandle, CancellationToken) {
        pair()
    }

    pub fn cancel(&self) {
        let _ = self.tx.broadcast(true);
    }
}

impl CancellationToken {
    pub fn is_canceled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once this token is canceled. Never resolves for a token created with [`never`].
    pub async fn canceled(&mut self) {
        loop {
            if self.is_canceled() {
                return;
            }
            if self.rx.recv().await.is_none() {
                // Sender dropped without ever canceling; treat as "never".
                return futures::future::pending::<()>().await;
            }
        }
    }
}
