use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::config::RetryConfig;
use crate::error::StorageError;

/// Longest single sleep between cancellation checks.
const CANCEL_POLL: Duration = Duration::from_millis(10);

/// Shared flag that stops busy-retry loops from waiting any longer.
///
/// Cancellation only affects operations that are waiting on a busy store;
/// an operation that gets through on its current attempt still completes.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
    timeout: Duration,
    cancel: CancelFlag,
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig, cancel: CancelFlag) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            timeout: Duration::from_millis(config.timeout_ms),
            cancel,
        }
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    /// Delay after the `attempt`-th busy failure (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Runs `op`, retrying it while it fails with a busy/locked error.
    ///
    /// Any other outcome is returned as is. Gives up with
    /// [`StorageError::Busy`] once the attempt budget or the timeout is spent,
    /// and with [`StorageError::Cancelled`] when the cancel flag is raised
    /// while waiting.
    pub fn run<T, F>(&self, operation: &str, mut op: F) -> Result<T, StorageError>
    where
        F: FnMut() -> Result<T, StorageError>,
    {
        let started = Instant::now();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let err = match op() {
                Err(err) if err.is_busy() => err,
                other => return other,
            };
            if attempt >= self.max_attempts {
                warn!(operation, attempts = attempt, error = %err, "store busy, giving up");
                return Err(StorageError::Busy { attempts: attempt });
            }
            let delay = self.backoff(attempt);
            if started.elapsed() + delay > self.timeout {
                warn!(
                    operation,
                    attempts = attempt,
                    error = %err,
                    "store busy, retry timeout reached"
                );
                return Err(StorageError::Busy { attempts: attempt });
            }
            warn!(
                operation,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "store busy, retrying"
            );
            if !self.sleep(delay) {
                warn!(operation, attempts = attempt, "busy retry cancelled");
                return Err(StorageError::Cancelled);
            }
        }
    }

    /// Sleeps for `delay` in short slices. Returns false if cancelled.
    fn sleep(&self, delay: Duration) -> bool {
        let deadline = Instant::now() + delay;
        loop {
            if self.cancel.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep((deadline - now).min(CANCEL_POLL));
        }
    }
}
