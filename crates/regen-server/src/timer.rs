//! Accumulator-based interval timer driven by tick elapsed time.

use std::time::Duration;

/// Fires once every `interval` of accumulated elapsed time.
///
/// A zero interval never fires. Time beyond one interval is carried over, but
/// a single [`advance`](Self::advance) fires at most once; a long stall does
/// not produce a burst of catch-up firings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntervalTimer {
    interval: Duration,
    accumulator: Duration,
}

impl IntervalTimer {
    /// Creates a timer with nothing accumulated.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            accumulator: Duration::ZERO,
        }
    }

    /// Creates a timer from whole seconds, `0` meaning disabled.
    pub fn from_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    /// The configured interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether the timer can ever fire.
    pub fn is_enabled(&self) -> bool {
        !self.interval.is_zero()
    }

    /// Changes the interval, keeping accumulated time.
    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    /// Adds `elapsed`. Returns `true` if the interval was reached.
    pub fn advance(&mut self, elapsed: Duration) -> bool {
        if !self.is_enabled() {
            return false;
        }
        self.accumulator += elapsed;
        if self.accumulator < self.interval {
            return false;
        }
        let interval_ns = self.interval.as_nanos();
        let carried = self.accumulator.as_nanos() % interval_ns;
        self.accumulator = Duration::from_nanos(carried as u64);
        true
    }

    /// Drops accumulated time.
    pub fn reset(&mut self) {
        self.accumulator = Duration::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_when_interval_reached() {
        let mut timer = IntervalTimer::from_secs(2);
        assert!(!timer.advance(Duration::from_secs(1)));
        assert!(timer.advance(Duration::from_secs(1)));
        assert!(!timer.advance(Duration::from_millis(1_999)));
        assert!(timer.advance(Duration::from_millis(1)));
    }

    #[test]
    fn test_long_stall_fires_once_and_carries_remainder() {
        let mut timer = IntervalTimer::new(Duration::from_millis(100));
        assert!(timer.advance(Duration::from_millis(1_050)));
        assert!(!timer.advance(Duration::from_millis(40)));
        assert!(timer.advance(Duration::from_millis(10)));
    }

    #[test]
    fn test_zero_interval_is_disabled() {
        let mut timer = IntervalTimer::from_secs(0);
        assert!(!timer.is_enabled());
        assert!(!timer.advance(Duration::from_secs(3_600)));
    }

    #[test]
    fn test_reset_and_set_interval() {
        let mut timer = IntervalTimer::from_secs(10);
        timer.advance(Duration::from_secs(9));
        timer.reset();
        assert!(!timer.advance(Duration::from_secs(9)));
        timer.set_interval(Duration::from_secs(5));
        assert!(timer.advance(Duration::ZERO));
    }
}
