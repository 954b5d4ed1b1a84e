//! Callback subscriptions over the live mirror.

use common::LiveStations;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

/// Handle for a registered listener. Dropping it detaches the listener.
#[derive(Debug)]
pub struct Subscription {
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Invoke `callback` with the current map, then on every change.
    ///
    /// Intermediate states may be skipped; the latest is always delivered.
    pub fn spawn<F>(mut rx: watch::Receiver<LiveStations>, callback: F) -> Self
    where
        F: Fn(&LiveStations) + Send + 'static,
    {
        let task = tokio::spawn(async move {
            let initial = rx.borrow_and_update().clone();
            callback(&initial);
            while rx.changed().await.is_ok() {
                let snapshot = rx.borrow_and_update().clone();
                callback(&snapshot);
            }
            debug!("Live mirror sender closed; listener exiting");
        });
        Self { task: Some(task) }
    }

    pub fn unsubscribe(mut self) {
        self.detach();
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn detach(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}
