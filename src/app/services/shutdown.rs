#[cfg(test)]
#[path = "shutdown_test.rs"]
mod tests;

use std::sync::{Arc, atomic};
use std::time::Duration;

use eyre::{Result, eyre};
use tokio::{sync::Notify, task::JoinHandle};

/// Background requests (server cancels, refreshes) still in flight.
#[derive(Debug, Default)]
pub struct PendingTasks {
    count: atomic::AtomicUsize,
    idle: Notify,
}

impl PendingTasks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(&self) -> usize {
        self.count.load(atomic::Ordering::SeqCst)
    }

    /// Counts `task` until it finishes. The count is raised before this
    /// returns, so a caller that tracked a task and then waits never misses it.
    pub fn track(self: &Arc<Self>, task: JoinHandle<()>) {
        self.count.fetch_add(1, atomic::Ordering::SeqCst);
        let pending = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(err) = task.await {
                log::error!("Background task failed: {}", err);
            }
            if pending.count.fetch_sub(1, atomic::Ordering::SeqCst) == 1 {
                pending.idle.notify_waiters();
            }
        });
    }

    pub async fn wait_idle(&self) {
        loop {
            // Registered before the check so a concurrent drain is not lost.
            let drained = self.idle.notified();
            if self.count() == 0 {
                return;
            }
            log::debug!("Waiting for {} pending tasks", self.count());
            drained.await;
        }
    }
}

/// Waits, bounded, for pending background requests before exit.
pub struct ShutdownCoordinator {
    pending: Arc<PendingTasks>,
    timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn new(pending: Arc<PendingTasks>) -> Self {
        Self {
            pending,
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn wait_for_completion(self) -> Result<()> {
        tokio::time::timeout(self.timeout, self.pending.wait_idle())
            .await
            .map_err(|_| {
                eyre!(
                    "shutdown timeout reached with {} tasks pending",
                    self.pending.count()
                )
            })
    }
}
