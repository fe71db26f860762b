//! Cooperative shutdown signal for the polling worker

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;

/// Sending half, owned by the monitor service.
pub struct ShutdownTrigger(watch::Sender<bool>);

/// Receiving half, checked by the worker at every loop iteration and
/// inside retry sleeps.
#[derive(Clone)]
pub struct ShutdownSignal(Option<watch::Receiver<bool>>);

pub fn channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger(tx), ShutdownSignal(Some(rx)))
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.0.send_replace(true);
    }
}

impl ShutdownSignal {
    /// A signal that never fires, for callers driving the pipeline directly.
    pub fn never() -> Self {
        ShutdownSignal(None)
    }

    pub fn is_triggered(&self) -> bool {
        self.0.as_ref().map_or(false, |rx| *rx.borrow())
    }

    /// Resolve once shutdown is requested or the trigger is gone.
    pub async fn wait(&mut self) {
        let Some(rx) = self.0.as_mut() else {
            return std::future::pending().await;
        };
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Drive `fut` to completion unless shutdown arrives first.
    ///
    /// Returns `None` if shutdown was requested; `fut` is dropped mid-flight.
    pub async fn guard<F: Future>(&mut self, fut: F) -> Option<F::Output> {
        if self.is_triggered() {
            return None;
        }
        tokio::select! {
            out = fut => Some(out),
            _ = self.wait() => None,
        }
    }

    /// Sleep for `duration` unless shutdown arrives first.
    ///
    /// Returns true if shutdown was requested.
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        if self.is_triggered() {
            return true;
        }
        let interrupted = tokio::select! {
            _ = tokio::time::sleep(duration) => false,
            _ = self.wait() => true,
        };
        interrupted || self.is_triggered()
    }
}
