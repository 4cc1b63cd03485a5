use std::time::{Duration, Instant};

/// Source of elapsed time for fit diagnostics
///
/// Fitted values never depend on a clock, only the reported duration does.
pub trait Clock {
    /// Time passed since the clock origin
    fn now(&self) -> Duration;

    fn elapsed_since(&self, start: Duration) -> Duration {
        self.now().saturating_sub(start)
    }
}

/// Wall-clock monotonic time, the origin is the construction moment
#[derive(Clone, Copy, Debug)]
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
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Clock that never advances
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FixedClock {
    now: Duration,
}

impl FixedClock {
    pub fn new(now: Duration) -> Self {
        Self { now }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Duration {
        self.now
    }
}
