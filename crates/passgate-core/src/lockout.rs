//! Retry policy for passcode entry
//!
//! Mismatches are counted inside a bounded window:
//!
//! - attempts 1..max: keep counting, flash the error
//! - attempt max: the window resets (counter back to 1) and the caller
//!   walks the flow back a step where it has one
//!
//! There is no backoff and no permanent lockout; a reset window starts
//! from scratch.

use std::time::Duration;

use tokio::sync::watch;

use crate::flash::ErrorFlash;

/// Retry policy
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Mismatches allowed inside one window
    pub max_attempts: u32,
    /// How long the error flag stays raised after a mismatch
    pub error_display: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            error_display: Duration::from_millis(1500),
        }
    }
}

/// What a mismatch did to the window
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MismatchOutcome {
    /// Still inside the window
    Retry { attempt: u32, remaining: u32 },
    /// Window exhausted; the counter is back at 1
    ThresholdReached,
}

/// Attempt counter for one flow
#[derive(Clone, Debug)]
pub struct AttemptCounter {
    count: u32,
    max_attempts: u32,
}

impl AttemptCounter {
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            count: 1,
            max_attempts: policy.max_attempts.max(1),
        }
    }

    /// The attempt number the next mismatch will be recorded as
    pub fn current(&self) -> u32 {
        self.count
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Record a mismatch
    pub fn on_mismatch(&mut self) -> MismatchOutcome {
        if self.count >= self.max_attempts {
            self.count = 1;
            return MismatchOutcome::ThresholdReached;
        }
        let attempt = self.count;
        self.count += 1;
        MismatchOutcome::Retry {
            attempt,
            remaining: self.max_attempts - attempt,
        }
    }

    /// Record a match
    pub fn on_match(&mut self) {
        self.count = 1;
    }
}

/// Attempt counter paired with the error flag it drives
pub struct RetryWindow {
    policy: RetryPolicy,
    counter: AttemptCounter,
    flash: ErrorFlash,
}

impl RetryWindow {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            counter: AttemptCounter::new(&policy),
            flash: ErrorFlash::new(),
            policy,
        }
    }

    /// A new attempt invalidates any error still on display
    pub fn begin_attempt(&mut self) {
        self.flash.clear();
    }

    /// Count a mismatch and flash the error
    pub fn mismatch(&mut self) -> MismatchOutcome {
        self.flash.raise(self.policy.error_display);
        self.counter.on_mismatch()
    }

    pub fn matched(&mut self) {
        self.counter.on_match();
        self.flash.clear();
    }

    pub fn is_error(&self) -> bool {
        self.flash.is_error()
    }

    pub fn error_flag(&self) -> watch::Receiver<bool> {
        self.flash.subscribe()
    }

    pub fn counter(&self) -> &AttemptCounter {
        &self.counter
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_starts_at_one() {
        let counter = AttemptCounter::new(&RetryPolicy::default());
        assert_eq!(counter.current(), 1);
        assert_eq!(counter.max_attempts(), 3);
    }

    #[test]
    fn test_threshold_on_third_mismatch() {
        let mut counter = AttemptCounter::new(&RetryPolicy::default());

        assert_eq!(
            counter.on_mismatch(),
            MismatchOutcome::Retry { attempt: 1, remaining: 2 }
        );
        assert_eq!(
            counter.on_mismatch(),
            MismatchOutcome::Retry { attempt: 2, remaining: 1 }
        );
        assert_eq!(counter.on_mismatch(), MismatchOutcome::ThresholdReached);
        assert_eq!(counter.current(), 1);
    }

    #[test]
    fn test_no_cumulative_lockout_after_reset() {
        let mut counter = AttemptCounter::new(&RetryPolicy::default());
        for _ in 0..3 {
            counter.on_mismatch();
        }
        // A fresh window: the fourth mismatch is attempt 1 again
        assert_eq!(
            counter.on_mismatch(),
            MismatchOutcome::Retry { attempt: 1, remaining: 2 }
        );
    }

    #[test]
    fn test_match_resets_window() {
        let mut counter = AttemptCounter::new(&RetryPolicy::default());
        counter.on_mismatch();
        counter.on_mismatch();
        counter.on_match();
        assert_eq!(counter.current(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_flashes_on_every_mismatch() {
        let mut window = RetryWindow::new(RetryPolicy::default());

        for _ in 0..3 {
            window.begin_attempt();
            assert!(!window.is_error());
            window.mismatch();
            assert!(window.is_error());
        }
        // Threshold reached, flag still shown for the third mismatch
        assert_eq!(window.counter().current(), 1);

        tokio::time::sleep(Duration::from_millis(1600)).await;
        tokio::task::yield_now().await;
        assert!(!window.is_error());
    }

    #[tokio::test]
    async fn test_window_match_clears() {
        let mut window = RetryWindow::new(RetryPolicy::default());
        window.mismatch();
        window.matched();
        assert!(!window.is_error());
        assert_eq!(window.counter().current(), 1);
    }

    #[test]
    fn test_single_attempt_policy() {
        let policy = RetryPolicy {
            max_attempts: 1,
            ..Default::default()
        };
        let mut counter = AttemptCounter::new(&policy);
        assert_eq!(counter.on_mismatch(), MismatchOutcome::ThresholdReached);
        assert_eq!(counter.on_mismatch(), MismatchOutcome::ThresholdReached);
    }
}
