//! Millisecond clock used for read deadlines.
//!
//! Every polled read in the request cycle measures its own deadline against
//! a `Clock` and yields through it between empty polls. Production code uses
//! the monotonic system clock; tests substitute a manual clock that advances
//! only when paused, so deadline paths run without real delays.

use std::time::{Duration, Instant};

/// Monotonic time source with a cooperative pause.
pub trait Clock {
    /// Milliseconds elapsed since an arbitrary fixed origin.
    fn now_ms(&self) -> u64;

    /// Yield for roughly `duration` before the next poll.
    fn pause(&self, duration: Duration);

    /// Milliseconds elapsed since `start` (a value from `now_ms`).
    fn elapsed_ms(&self, start: u64) -> u64 {
        self.now_ms().saturating_sub(start)
    }
}

/// Wall-clock implementation backed by `Instant`.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    fn pause(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
