//! Per-operation deadline and cancellation.

use crate::config::SyncStateConfig;
use crate::error::{CoreError, CoreResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Longest single sleep while waiting, so cancellation is noticed promptly.
const SLEEP_SLICE: Duration = Duration::from_millis(5);

/// Shared flag used to cancel operations from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Cancels every operation using a context derived from this handle.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true once [`CancelHandle::cancel`] was called.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Deadline and cancellation state passed to every operation.
///
/// Contexts are cheap to clone; clones share the cancellation flag.
///
/// # Example
///
/// ```rust
/// use syncstate_core::OpContext;
/// use std::time::Duration;
///
/// let ctx = OpContext::with_timeout(Duration::from_secs(5));
/// let handle = ctx.cancel_handle();
/// assert!(ctx.check().is_ok());
///
/// handle.cancel();
/// assert!(ctx.check().is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct OpContext {
    deadline: Option<Instant>,
    cancel: CancelHandle,
}

impl OpContext {
    /// A context with no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// A context that expires after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// A context that expires at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            cancel: CancelHandle::default(),
        }
    }

    /// A context using the configured default timeout.
    pub fn from_config(config: &SyncStateConfig) -> Self {
        Self::with_timeout(config.default_timeout)
    }

    /// Returns a handle that cancels this context and its clones.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Returns the deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline. `None` means unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Fails if the context was cancelled or its deadline passed.
    pub fn check(&self) -> CoreResult<()> {
        if self.cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(CoreError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Sleeps for `duration`, waking early on cancellation or deadline.
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` or `DeadlineExceeded` if the wait was cut short.
    pub fn sleep(&self, duration: Duration) -> CoreResult<()> {
        let wake_at = Instant::now() + duration;
        loop {
            self.check()?;
            let now = Instant::now();
            if now >= wake_at {
                return Ok(());
            }
            let mut slice = (wake_at - now).min(SLEEP_SLICE);
            if let Some(remaining) = self.remaining() {
                slice = slice.min(remaining);
            }
            std::thread::sleep(slice);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn background_never_expires() {
        let ctx = OpContext::background();
        assert!(ctx.check().is_ok());
        assert!(ctx.remaining().is_none());
    }

    #[test]
    fn expired_deadline() {
        let ctx = OpContext::with_deadline(Instant::now());
        assert!(matches!(ctx.check(), Err(CoreError::DeadlineExceeded)));
    }

    #[test]
    fn cancellation_is_shared_by_clones() {
        let ctx = OpContext::with_timeout(Duration::from_secs(60));
        let clone = ctx.clone();
        ctx.cancel_handle().cancel();
        assert!(matches!(clone.check(), Err(CoreError::Cancelled)));
    }

    #[test]
    fn sleep_stops_at_deadline() {
        let ctx = OpContext::with_timeout(Duration::from_millis(20));
        let start = Instant::now();
        let result = ctx.sleep(Duration::from_secs(10));
        assert!(matches!(result, Err(CoreError::DeadlineExceeded)));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn sleep_wakes_on_cancel() {
        let ctx = OpContext::background();
        let handle = ctx.cancel_handle();
        let waiter = std::thread::spawn(move || ctx.sleep(Duration::from_secs(10)));
        std::thread::sleep(Duration::from_millis(20));
        handle.cancel();
        assert!(matches!(waiter.join().unwrap(), Err(CoreError::Cancelled)));
    }

    #[test]
    fn short_sleep_completes() {
        let ctx = OpContext::with_timeout(Duration::from_secs(5));
        assert!(ctx.sleep(Duration::from_millis(1)).is_ok());
    }
}
