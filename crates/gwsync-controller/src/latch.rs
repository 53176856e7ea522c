//! One-shot latch.

use std::sync::atomic::{AtomicBool, Ordering};

/// Lets exactly one caller through, ever.
#[derive(Debug, Default)]
pub struct OneShotLatch {
    fired: AtomicBool,
}

impl OneShotLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` for the first call only.
    pub fn fire(&self) -> bool {
        !self.fired.swap(true, Ordering::AcqRel)
    }

    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}
