//! Background maintenance tasks.

use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::trace;

/// Handle to a periodic background task.
///
/// Dropping the handle aborts the task. Call [`detach`](Self::detach) to let
/// it run for as long as its target is alive.
#[derive(Debug)]
pub struct SweeperHandle {
    task: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Stop the task now.
    pub fn abort(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Keep the task running after the handle is dropped.
    pub fn detach(mut self) {
        self.task.take();
    }

    /// Whether the task has stopped.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(|task| task.is_finished())
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Run `sweep` against `target` every `interval` until the target is dropped.
///
/// The task only holds a weak reference, so it never keeps the target alive.
/// Must be called from within a tokio runtime.
pub fn spawn_sweeper<T, F>(target: &Arc<T>, interval: Duration, sweep: F) -> SweeperHandle
where
    T: Send + Sync + 'static,
    F: Fn(&T) + Send + 'static,
{
    let target: Weak<T> = Arc::downgrade(target);
    let interval = interval.max(Duration::from_millis(1));

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let Some(target) = target.upgrade() else {
                trace!("Sweep target dropped, stopping sweeper");
                break;
            };
            sweep(&target);
        }
    });

    SweeperHandle { task: Some(task) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_runs_periodically() {
        let counter = Arc::new(AtomicU32::new(0));
        let handle = spawn_sweeper(&counter, Duration::from_secs(10), |c| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_stops_when_target_dropped() {
        let counter = Arc::new(AtomicU32::new(0));
        let handle = spawn_sweeper(&counter, Duration::from_secs(1), |_| {});
        drop(counter);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_aborts() {
        let counter = Arc::new(AtomicU32::new(0));
        let handle = spawn_sweeper(&counter, Duration::from_secs(1), |c| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        drop(handle);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
