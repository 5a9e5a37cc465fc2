//! The cancellation signal propagated to every receiver, reader, and
//! timer task on shutdown (spec §5 "Shutdown propagates a cancel signal
//! to every receiver, reader, and timer; each must observe within 1s").
//!
//! A `tokio::sync::watch<bool>` rather than a oneshot: every task holds
//! its own cloned receiver and can poll `cancelled()` from inside a
//! `tokio::select!` alongside its normal work, the same shape
//! `infra-common`'s lifecycle tasks use for their stop signal.

use tokio::sync::watch;

#[derive(Clone)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownHandle {
    pub fn new() -> (Self, ShutdownSignal) {
        let (tx, rx) = watch::channel(false);
        (ShutdownHandle { tx }, ShutdownSignal { rx })
    }

    /// Broadcasts the cancellation signal to every cloned
    /// [`ShutdownSignal`]. Idempotent: calling it twice just re-sends
    /// `true`.
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }
}

impl ShutdownSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once `trigger()` has been called. Safe to `select!`
    /// against repeatedly; each call re-borrows the latest value.
    pub async fn cancelled(&mut self) {
        if self.is_cancelled() {
            return;
        }
        let _ = self.rx.changed().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn signal_starts_uncancelled() {
        let (_handle, signal) = ShutdownHandle::new();
        assert!(!signal.is_cancelled());
    }

    #[tokio::test]
    async fn trigger_is_observed_by_every_clone() {
        let (handle, mut a) = ShutdownHandle::new();
        let mut b = a.clone();
        handle.trigger();
        tokio::time::timeout(Duration::from_millis(100), a.cancelled()).await.unwrap();
        tokio::time::timeout(Duration::from_millis(100), b.cancelled()).await.unwrap();
        assert!(a.is_cancelled());
        assert!(b.is_cancelled());
    }
}
