//! Clock access and day-cutoff arithmetic.
//!
//! The collection stores a creation anchor aligned to the local
//! rollover hour; day indexes and cutoffs are plain arithmetic from
//! there, so a test clock makes the whole scheduler deterministic.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{Local, Timelike};

pub const SECONDS_PER_DAY: i64 = 86_400;

/// Injectable wall clock.
pub trait TimeSource: Send + Sync {
    /// Epoch seconds.
    fn now_secs(&self) -> i64;
    /// Epoch milliseconds.
    fn now_ms(&self) -> i64;
}

/// The real clock.
#[derive(Debug, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now_secs(&self) -> i64 {
        self.now_ms() / 1000
    }

    fn now_ms(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}

/// A clock that only moves when told to. Useful for tests and
/// simulations.
#[derive(Debug, Default)]
pub struct ManualClock {
    ms: AtomicI64,
}

impl ManualClock {
    pub fn new(secs: i64) -> Self {
        Self {
            ms: AtomicI64::new(secs * 1000),
        }
    }

    pub fn set_secs(&self, secs: i64) {
        self.ms.store(secs * 1000, Ordering::SeqCst);
    }

    pub fn advance_secs(&self, secs: i64) {
        self.ms.fetch_add(secs * 1000, Ordering::SeqCst);
    }
}

impl TimeSource for ManualClock {
    fn now_secs(&self) -> i64 {
        self.ms.load(Ordering::SeqCst) / 1000
    }

    fn now_ms(&self) -> i64 {
        self.ms.load(Ordering::SeqCst)
    }
}

/// Where we are relative to the daily rollover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedTiming {
    /// Days since the collection was created.
    pub days_elapsed: i32,
    /// Epoch seconds at which `days_elapsed` increments.
    pub next_day_at: i64,
}

impl SchedTiming {
    pub fn compute(creation_anchor: i64, now: i64) -> Self {
        let days_elapsed = ((now - creation_anchor) / SECONDS_PER_DAY).max(0) as i32;
        let next_day_at = creation_anchor + (i64::from(days_elapsed) + 1) * SECONDS_PER_DAY;
        Self {
            days_elapsed,
            next_day_at,
        }
    }
}

/// Epoch seconds of the most recent local `rollover_hour` o'clock.
/// Used once, when a collection is created, to anchor day boundaries.
pub fn local_day_anchor(rollover_hour: u32) -> i64 {
    let now = Local::now();
    let seconds_today = i64::from(now.time().num_seconds_from_midnight());
    let midnight = now.timestamp() - seconds_today;
    let mut anchor = midnight + i64::from(rollover_hour.min(23)) * 3600;
    if anchor > now.timestamp() {
        anchor -= SECONDS_PER_DAY;
    }
    anchor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timing_computation() {
        let anchor = 1_000_000;
        let timing = SchedTiming::compute(anchor, anchor + 10);
        assert_eq!(timing.days_elapsed, 0);
        assert_eq!(timing.next_day_at, anchor + SECONDS_PER_DAY);

        let timing = SchedTiming::compute(anchor, anchor + 3 * SECONDS_PER_DAY + 5);
        assert_eq!(timing.days_elapsed, 3);
        assert_eq!(timing.next_day_at, anchor + 4 * SECONDS_PER_DAY);
    }

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new(100);
        assert_eq!(clock.now_secs(), 100);
        assert_eq!(clock.now_ms(), 100_000);
        clock.advance_secs(50);
        assert_eq!(clock.now_secs(), 150);
    }
}
