//! Cross-cutting resets triggered by an unlock
//!
//! The gate does not own modal overlays or onboarding state; it only tells
//! the host to clear them once the passcode has been accepted.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Host hooks run after a successful passcode unlock
pub trait UnlockEffects: Send + Sync {
    fn clear_modals(&self);

    fn clear_onboarding_highlight(&self);
}

/// Does nothing
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopEffects;

impl UnlockEffects for NoopEffects {
    fn clear_modals(&self) {}

    fn clear_onboarding_highlight(&self) {}
}

/// Counts hook invocations
#[derive(Debug, Default)]
pub struct RecordingEffects {
    modals_cleared: AtomicUsize,
    highlights_cleared: AtomicUsize,
}

impl RecordingEffects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn modals_cleared(&self) -> usize {
        self.modals_cleared.load(Ordering::SeqCst)
    }

    pub fn highlights_cleared(&self) -> usize {
        self.highlights_cleared.load(Ordering::SeqCst)
    }
}

impl UnlockEffects for RecordingEffects {
    fn clear_modals(&self) {
        self.modals_cleared.fetch_add(1, Ordering::SeqCst);
    }

    fn clear_onboarding_highlight(&self) {
        self.highlights_cleared.fetch_add(1, Ordering::SeqCst);
    }
}
