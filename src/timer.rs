//! Single-shot restartable timers.
//!
//! The debounced autosave and the typing auto-stop both need a timer that is
//! reset on every triggering event and invalidated deterministically when the
//! owning context is torn down. [`schedule_once`] spawns a tokio sleep task;
//! the returned handle aborts it on [`TimerHandle::cancel`] or on drop, so a
//! stale callback can never fire into released state.

use std::time::Duration;

/// Handle to a pending single-shot timer. Dropping the handle cancels it.
#[derive(Debug)]
pub struct TimerHandle {
    task: tokio::task::JoinHandle<()>,
}

impl TimerHandle {
    /// Cancel the timer; the callback will not run if it has not started.
    pub fn cancel(&self) {
        self.task.abort();
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Run `callback` once after `delay`, on the runtime's timer.
///
/// Honors the paused test clock, so timing tests are deterministic.
pub fn schedule_once<F>(delay: Duration, callback: F) -> TimerHandle
where
    F: FnOnce() + Send + 'static,
{
    let deadline = tokio::time::Instant::now() + delay;
    let task = tokio::spawn(async move {
        tokio::time::sleep_until(deadline).await;
        callback();
    });
    TimerHandle { task }
}
