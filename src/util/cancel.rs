//! Cooperative cancellation for in-flight operations.
//!
//! A [`CancelGuard`] fires its [`Cancellation`] when dropped, so tying the
//! guard to a request future cancels the operation when the client goes away.

use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct Cancellation {
    receiver: watch::Receiver<bool>,
}

#[derive(Debug)]
pub struct CancelGuard {
    sender: watch::Sender<bool>,
}

/// Create a linked guard and signal.
pub fn cancellation() -> (CancelGuard, Cancellation) {
    let (sender, receiver) = watch::channel(false);
    (CancelGuard { sender }, Cancellation { receiver })
}

impl Cancellation {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_, receiver) = watch::channel(false);
        Self { receiver }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once cancellation is requested; pends forever if it never is.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        loop {
            if *receiver.borrow_and_update() {
                return;
            }
            if receiver.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl CancelGuard {
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        self.cancel();
    }
}
