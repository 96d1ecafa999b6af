//! Background reclamation of abandoned handshakes.
//!
//! The sweeper holds only a `Weak` reference to the store, so it never keeps
//! a store alive on its own: once the last `Arc` is dropped the task exits at
//! its next tick.

use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::RequestStore;

/// Handle to a running sweep task.
#[derive(Debug)]
pub struct RequestSweeper {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl RequestSweeper {
    /// Spawn a task calling [`RequestStore::sweep`] every `interval`.
    ///
    /// The task stops when `shutdown` is cancelled, when
    /// [`shutdown`](Self::shutdown) is called, or when the store is dropped.
    /// Must be called from within a tokio runtime.
    pub fn spawn<P>(
        store: &Arc<RequestStore<P>>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> Self
    where
        P: Send + Sync + 'static,
    {
        let store = Arc::downgrade(store);
        let token = shutdown.clone();
        let task = tokio::spawn(run(store, interval, token));
        Self { shutdown, task }
    }

    /// Whether the task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the task and wait for it to exit.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            if e.is_panic() {
                error!(error = %e, "Request sweeper panicked");
            }
        }
    }
}

async fn run<P>(store: Weak<RequestStore<P>>, interval: Duration, shutdown: CancellationToken) {
    info!(interval_secs = interval.as_secs(), "Request sweeper starting");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; nothing can be expired yet.
    ticker.tick().await;

    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                info!("Request sweeper shutting down");
                return;
            }
            _ = ticker.tick() => {
                let Some(store) = store.upgrade() else {
                    debug!("Request store dropped, sweeper exiting");
                    return;
                };
                store.sweep();
            }
        }
    }
}
