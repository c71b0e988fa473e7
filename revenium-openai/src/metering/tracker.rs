//! Tracking of in-flight metering deliveries.

use std::future::Future;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::Mutex;
use tokio_util::task::TaskTracker;

/// Counts detached delivery tasks so they can be drained before shutdown.
///
/// A task is released when it finishes, whether it succeeded, failed or
/// panicked. Draining never cancels anything.
#[derive(Debug, Clone, Default)]
pub struct DeliveryTracker {
    tracker: TaskTracker,
    drain: Arc<Mutex<()>>,
}

impl DeliveryTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` on the current tokio runtime and track it.
    ///
    /// Returns `false` (and drops the task) when called outside a runtime.
    pub fn spawn<F>(&self, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match Handle::try_current() {
            Ok(handle) => {
                drop(self.tracker.spawn_on(task, &handle));
                true
            }
            Err(_) => {
                tracing::warn!("No tokio runtime available, dropping metering task");
                false
            }
        }
    }

    /// Number of tasks still running.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until every tracked task has finished.
    ///
    /// Tasks spawned while waiting are waited for too.
    pub async fn flush(&self) {
        let _guard = self.drain.lock().await;
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Drain outstanding tasks at shutdown.
    pub async fn close(&self) {
        let pending = self.pending();
        if pending > 0 {
            tracing::info!(pending, "Waiting for metering deliveries to finish");
        }
        self.flush().await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn flush_waits_for_all_tasks() {
        let tracker = DeliveryTracker::new();
        let done = Arc::new(AtomicUsize::new(0));

        for i in 0..5u64 {
            let done = Arc::clone(&done);
            assert!(tracker.spawn(async move {
                tokio::time::sleep(Duration::from_millis(20 * (i + 1))).await;
                done.fetch_add(1, Ordering::SeqCst);
            }));
        }
        assert_eq!(tracker.pending(), 5);

        tracker.flush().await;
        assert_eq!(done.load(Ordering::SeqCst), 5);
        assert_eq!(tracker.pending(), 0);
    }

    #[tokio::test]
    async fn panicking_task_is_released() {
        let tracker = DeliveryTracker::new();
        tracker.spawn(async {
            let failed = true;
            assert!(!failed, "delivery blew up");
        });
        tracker.flush().await;
        assert_eq!(tracker.pending(), 0);
    }

    #[tokio::test]
    async fn tracker_is_reusable_after_flush() {
        let tracker = DeliveryTracker::new();
        tracker.flush().await;

        let done = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&done);
        tracker.spawn(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        tracker.close().await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn spawn_without_runtime_is_dropped() {
        let tracker = DeliveryTracker::new();
        assert!(!tracker.spawn(async {}));
        assert_eq!(tracker.pending(), 0);
    }
}
