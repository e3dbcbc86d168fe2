//! Monotonic timestamps in 100 ns ticks and rate computation.
//!
//! Ticks follow the Windows file-time resolution: one tick is 100 ns, so one
//! second is [`TICKS_PER_SECOND`] ticks.

use std::fmt;
use std::time::{Duration, Instant};

/// Number of 100 ns ticks in one second.
pub const TICKS_PER_SECOND: u64 = 10_000_000;

/// A point in time, counted in 100 ns ticks since an arbitrary monotonic epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Build a timestamp from seconds and nanoseconds.
    #[inline]
    #[must_use]
    pub const fn from_parts(seconds: u64, nanoseconds: u32) -> Self {
        Self(seconds * TICKS_PER_SECOND + nanoseconds as u64 / 100)
    }

    /// Build a timestamp from a duration since the epoch.
    #[inline]
    #[must_use]
    pub const fn from_duration(since_epoch: Duration) -> Self {
        Self::from_parts(since_epoch.as_secs(), since_epoch.subsec_nanos())
    }

    /// Raw tick count.
    #[inline]
    #[must_use]
    pub const fn ticks(self) -> u64 {
        self.0
    }

    /// Ticks elapsed between `earlier` and `self`.
    ///
    /// Saturates to zero if `earlier` is actually later.
    #[inline]
    #[must_use]
    pub const fn ticks_since(self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic timestamp source.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current time.
    fn now(&self) -> Timestamp;

    /// Ticks elapsed since `start`.
    fn elapsed(&self, start: Timestamp) -> u64 {
        self.now().ticks_since(start)
    }
}

/// Clock backed by the operating system's monotonic clock.
///
/// The epoch is the moment the clock was created.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    /// Create a clock whose epoch is now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now(&self) -> Timestamp {
        Timestamp::from_duration(self.epoch.elapsed())
    }
}

/// Iterations per second for `count` iterations over `elapsed_ticks`.
///
/// Returns `None` when `elapsed_ticks` is zero: the rate is undefined and no
/// division is performed. The result is truncated, never rounded.
#[inline]
#[must_use]
pub fn rate(count: u64, elapsed_ticks: u64) -> Option<u64> {
    if elapsed_ticks == 0 {
        return None;
    }
    let hz = u128::from(count) * u128::from(TICKS_PER_SECOND) / u128::from(elapsed_ticks);
    Some(u64::try_from(hz).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_parts() {
        assert_eq!(Timestamp::from_parts(0, 0).ticks(), 0);
        assert_eq!(Timestamp::from_parts(1, 0).ticks(), 10_000_000);
        assert_eq!(Timestamp::from_parts(2, 350).ticks(), 20_000_003);
        assert_eq!(Timestamp::from_parts(0, 99).ticks(), 0);
    }

    #[test]
    fn test_ticks_since_saturates() {
        let early = Timestamp(100);
        let late = Timestamp(250);
        assert_eq!(late.ticks_since(early), 150);
        assert_eq!(early.ticks_since(late), 0);
    }

    #[test]
    fn test_rate_truncates() {
        assert_eq!(rate(1000, 2000), Some(5_000_000));
        assert_eq!(rate(3, 7), Some(30_000_000 / 7));
        assert_eq!(rate(1, 3), Some(3_333_333));
        assert_eq!(rate(0, 10), Some(0));
    }

    #[test]
    fn test_rate_matches_formula() {
        for (count, elapsed) in [(5u64, 1u64), (500_000, 1_234_567), (10_000_000, 98_765_432)] {
            assert_eq!(rate(count, elapsed), Some(count * 10_000_000 / elapsed));
        }
    }

    #[test]
    fn test_rate_zero_elapsed_is_undefined() {
        assert_eq!(rate(1000, 0), None);
        assert_eq!(rate(0, 0), None);
    }

    #[test]
    fn test_rate_does_not_overflow() {
        assert_eq!(rate(u64::MAX, 1), Some(u64::MAX));
        assert_eq!(rate(u64::MAX, TICKS_PER_SECOND), Some(u64::MAX));
    }

    #[test]
    fn test_monotonic_clock_advances() {
        let clock = MonotonicClock::new();
        let start = clock.now();
        std::thread::sleep(Duration::from_millis(2));
        assert!(clock.elapsed(start) >= 20_000);
    }
}
