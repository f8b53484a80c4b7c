//! Cancellation plumbing for signal-triggered teardown.
//!
//! The lifecycle never installs signal handlers itself; the binary arms a
//! [`CancelHandle`] before the first network call and the state machine
//! observes the paired [`CancelToken`] at every suspension point. Duplicate
//! cancellations are no-ops, so a second signal during teardown cannot
//! re-enter the terminate call.

use std::io;

use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::watch;

/// Sending half of a cancellation channel.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Requests cancellation. Safe to call any number of times.
    pub fn cancel(&self) {
        self.tx.send(true).ok();
    }
}

/// Receiving half of a cancellation channel.
#[derive(Clone, Debug)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// Returns `true` once cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves when cancellation is requested. Never resolves if the handle
    /// is dropped without cancelling.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Creates a linked cancellation handle and token pair.
#[must_use]
pub fn cancel_channel() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx })
}

/// Arms {hangup, interrupt, quit, termination} handlers that trigger
/// cancellation on first delivery.
///
/// Must be called from within a Tokio runtime, before provisioning starts,
/// so teardown is honoured from the launch phase onward.
///
/// # Errors
///
/// Returns an [`io::Error`] when a signal listener cannot be registered.
pub fn install_signal_handlers(handle: &CancelHandle) -> io::Result<()> {
    let kinds = [
        SignalKind::hangup(),
        SignalKind::interrupt(),
        SignalKind::quit(),
        SignalKind::terminate(),
    ];
    for kind in kinds {
        let mut listener = signal(kind)?;
        let armed = handle.clone();
        tokio::spawn(async move {
            if listener.recv().await.is_some() {
                armed.cancel();
            }
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::cancel_channel;

    #[tokio::test]
    async fn token_observes_cancellation() {
        let (handle, mut token) = cancel_channel();
        assert!(!token.is_cancelled());

        handle.cancel();
        assert!(token.is_cancelled());
        timeout(Duration::from_millis(100), token.cancelled())
            .await
            .unwrap_or_else(|err| panic!("cancelled() should resolve: {err}"));
    }

    #[tokio::test]
    async fn duplicate_cancellations_are_noops() {
        let (handle, token) = cancel_channel();
        handle.cancel();
        handle.cancel();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn token_pends_until_cancelled() {
        let (_handle, mut token) = cancel_channel();
        let waited = timeout(Duration::from_millis(20), token.cancelled()).await;
        assert!(waited.is_err(), "cancelled() should still be pending");
    }
}
