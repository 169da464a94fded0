//! Delayed and periodic task execution
//!
//! One scheduler abstraction on top of the tokio timer: one-shot and
//! fixed-rate scheduling returning cancellable handles. Cancellation is
//! prompt (the wait is interruptible) and `cancel` joins the running
//! task, so no further invocation happens after it returns.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Handle to a scheduled task.
///
/// Dropping the handle aborts the task at the next await point;
/// `cancel` additionally waits for the task to wind down.
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
    task: Option<JoinHandle<()>>,
}

impl TimerHandle {
    /// Cancels the task and joins it. Idempotent: repeated calls return
    /// immediately once the task has stopped.
    pub async fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

/// Runs `task` once after `delay`.
pub fn schedule<F>(delay: Duration, task: F) -> TimerHandle
where
    F: Future<Output = ()> + Send + 'static,
{
    let cancelled = Arc::new(AtomicBool::new(false));
    let notify = Arc::new(Notify::new());
    let flag = cancelled.clone();
    let wakeup = notify.clone();
    let handle = tokio::spawn(async move {
        if wait(delay, &flag, &wakeup).await {
            task.await;
        }
    });
    TimerHandle { cancelled, notify, task: Some(handle) }
}

/// Runs `task` every `period`, beginning after `delay`.
pub fn schedule_at_fixed_rate<F, Fut>(delay: Duration, period: Duration, mut task: F) -> TimerHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let cancelled = Arc::new(AtomicBool::new(false));
    let notify = Arc::new(Notify::new());
    let flag = cancelled.clone();
    let wakeup = notify.clone();
    let handle = tokio::spawn(async move {
        if !wait(delay, &flag, &wakeup).await {
            return;
        }
        task().await;
        while wait(period, &flag, &wakeup).await {
            task().await;
        }
    });
    TimerHandle { cancelled, notify, task: Some(handle) }
}

/// Interruptible wait: true when the full duration elapsed, false when
/// cancelled in the meantime.
async fn wait(duration: Duration, cancelled: &AtomicBool, notify: &Notify) -> bool {
    let mut notified = std::pin::pin!(notify.notified());
    notified.as_mut().enable();
    if cancelled.load(Ordering::SeqCst) {
        return false;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => !cancelled.load(Ordering::SeqCst),
        _ = notified => false,
    }
}
