use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::context::{Context, deadline_after};

/// Supervises a session for inactivity.
///
/// A background task waits for `timeout` to pass without a call to
/// [`IdleTimer::reset`] and then runs `on_idle` once. The task also exits when
/// the supervised context ends, when the timer is dropped, or after firing.
#[derive(Debug)]
pub struct IdleTimer {
    activity: watch::Sender<Instant>,
    fired: Arc<AtomicBool>,
    timeout: Duration,
    task: JoinHandle<()>,
}

impl IdleTimer {
    /// Arm the timer. Must be called from within a tokio runtime.
    pub fn spawn<F>(timeout: Duration, context: Context, on_idle: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let (activity, observed) = watch::channel(Instant::now());
        let fired = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(supervise(
            timeout,
            context,
            observed,
            Arc::clone(&fired),
            on_idle,
        ));

        Self {
            activity,
            fired,
            timeout,
            task,
        }
    }

    /// Record activity, pushing the expiry out by a full window.
    pub fn reset(&self) {
        self.activity.send_replace(Instant::now());
    }

    /// Returns true if the window elapsed and `on_idle` ran.
    pub fn fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns true once the supervising task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for IdleTimer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn supervise<F>(
    timeout: Duration,
    context: Context,
    mut activity: watch::Receiver<Instant>,
    fired: Arc<AtomicBool>,
    on_idle: F,
) where
    F: FnOnce() + Send + 'static,
{
    loop {
        let deadline = deadline_after(*activity.borrow_and_update(), timeout);
        tokio::select! {
            biased;
            _ = context.done() => return,
            changed = activity.changed() => {
                if changed.is_err() {
                    return;
                }
            }
            _ = tokio::time::sleep_until(deadline) => {
                fired.store(true, Ordering::Release);
                on_idle();
                return;
            }
        }
    }
}
