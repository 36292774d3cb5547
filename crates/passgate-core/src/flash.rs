//! Transient error indicator
//!
//! After a mismatch the host shows an error (shake, red dots) for a fixed
//! duration. The hide is a scheduled task owned by [`ErrorFlash`]; raising
//! again or clearing aborts the pending hide first, so a stale timer never
//! hides a newer error.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// `is_error` flag with an auto-clearing timer
pub struct ErrorFlash {
    flag: Arc<watch::Sender<bool>>,
    pending: Option<JoinHandle<()>>,
}

impl Default for ErrorFlash {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorFlash {
    pub fn new() -> Self {
        let (flag, _) = watch::channel(false);
        Self {
            flag: Arc::new(flag),
            pending: None,
        }
    }

    pub fn is_error(&self) -> bool {
        *self.flag.borrow()
    }

    /// Receiver for hosts rendering the flag
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.flag.subscribe()
    }

    /// Raise the flag and schedule it to clear after `duration`
    ///
    /// Must be called from within a tokio runtime.
    pub fn raise(&mut self, duration: Duration) {
        self.cancel_pending();
        self.flag.send_replace(true);

        let deadline = tokio::time::Instant::now() + duration;
        let flag = Arc::clone(&self.flag);
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            flag.send_replace(false);
        }));
    }

    /// Drop the flag now and invalidate any pending hide
    pub fn clear(&mut self) {
        self.cancel_pending();
        self.flag.send_replace(false);
    }

    fn cancel_pending(&mut self) {
        if let Some(task) = self.pending.take() {
            task.abort();
        }
    }
}

impl Drop for ErrorFlash {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DISPLAY: Duration = Duration::from_millis(1500);

    /// Let spawned tasks observe the advanced clock
    async fn settle() {
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_flag_clears_after_duration() {
        let mut flash = ErrorFlash::new();
        flash.raise(DISPLAY);
        assert!(flash.is_error());

        tokio::time::sleep(Duration::from_millis(1499)).await;
        settle().await;
        assert!(flash.is_error());

        tokio::time::sleep(Duration::from_millis(2)).await;
        settle().await;
        assert!(!flash.is_error());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reraise_invalidates_old_timer() {
        let mut flash = ErrorFlash::new();
        flash.raise(DISPLAY);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        flash.raise(DISPLAY);

        // The first timer would have fired here
        tokio::time::sleep(Duration::from_millis(600)).await;
        settle().await;
        assert!(flash.is_error());

        tokio::time::sleep(Duration::from_millis(1000)).await;
        settle().await;
        assert!(!flash.is_error());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_cancels_pending() {
        let mut flash = ErrorFlash::new();
        let mut rx = flash.subscribe();
        flash.raise(DISPLAY);
        assert!(*rx.borrow_and_update());

        flash.clear();
        assert!(!flash.is_error());
        assert!(rx.has_changed().unwrap());
    }
}
