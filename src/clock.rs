//! Wall-clock sources used for elapsed-time measurement.

use std::cell::Cell;
use std::time::{Duration, Instant};

/// Monotonic time source.
///
/// Readings are offsets from an arbitrary origin; only differences between two
/// readings are meaningful.
pub trait Clock {
    /// Current reading. Never decreases.
    fn now(&self) -> Duration;

    /// Block until `now() >= deadline`.
    ///
    /// Real clocks sleep; virtual clocks jump forward. Only the event loop calls this.
    fn wait_until(&self, deadline: Duration);
}

/// Real time backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn wait_until(&self, deadline: Duration) {
        let now = self.now();
        if deadline > now {
            std::thread::sleep(deadline - now);
        }
    }
}

/// Virtual time that only moves when told to.
///
/// Benchmarks driven on a `ManualClock` see exact, reproducible elapsed values:
/// a benchmark "takes" time by calling [`ManualClock::advance`].
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward by `by`.
    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }

    /// Set the current reading. Ignored if it would move time backwards.
    pub fn set(&self, to: Duration) {
        if to > self.now.get() {
            self.now.set(to);
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now.get()
    }

    fn wait_until(&self, deadline: Duration) {
        self.set(deadline);
    }
}
