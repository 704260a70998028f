//! Monotonic clock used by the throttle window.
//!
//! Tests swap in `MockClock` from `crate::infrastructure::mocks`.

use crate::application::ports::Clock;
use std::time::Instant;

/// Clock backed by [`Instant::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
