//! Cooperative cancellation primitives
//!
//! A run is abortable between requests at any time; inside a script the
//! unrestricted/portable backends observe the flag at delay-resumption
//! points.

use tokio::sync::watch;

/// The sending half; cancelling is idempotent.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    tx: std::sync::Arc<watch::Sender<bool>>,
}

/// The receiving half; cheap to clone and hand to every worker.
#[derive(Debug, Clone)]
pub struct CancellationReceiver {
    rx: watch::Receiver<bool>,
}

/// Creates a linked token/receiver pair.
#[must_use]
pub fn cancellation_pair() -> (CancellationToken, CancellationReceiver) {
    let (tx, rx) = watch::channel(false);
    (
        CancellationToken {
            tx: std::sync::Arc::new(tx),
        },
        CancellationReceiver { rx },
    )
}

impl CancellationToken {
    /// Signals cancellation to every receiver.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    /// Returns true if cancellation has been signalled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl CancellationReceiver {
    /// Returns true if cancellation has been signalled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is signalled. Never resolves if the token
    /// is dropped without cancelling, which makes it safe inside `select!`.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}
