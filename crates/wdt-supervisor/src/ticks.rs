//! Wraparound-safe tick arithmetic.
//!
//! Every difference in this module is computed with `wrapping_sub`, so the
//! helpers stay correct when the 32-bit tick counter rolls over. A stored
//! previous tick of `0` means "not sampled yet".

use crate::clock::Tick;

/// Rate limiter on a wrapping tick counter.
///
/// The first call (`*tick_prev == 0`) only records `tick` and returns `false`.
/// Later calls return `true` once at least `tick_tout` ticks have passed since
/// the recorded tick, and then resynchronise `*tick_prev` to `tick`. When the
/// interval has not passed yet, `*tick_prev` is left untouched.
///
/// ```rust
/// use wdt_supervisor::ticks::test_timeout;
///
/// let mut prev = 0;
/// assert!(!test_timeout(20, 5, &mut prev));
/// assert!(!test_timeout(24, 5, &mut prev));
/// assert!(test_timeout(25, 5, &mut prev));
/// assert_eq!(prev, 25);
/// ```
pub fn test_timeout(tick: Tick, tick_tout: Tick, tick_prev: &mut Tick) -> bool {
    if *tick_prev == 0 {
        *tick_prev = tick;
        return false;
    }
    if tick.wrapping_sub(*tick_prev) >= tick_tout {
        *tick_prev = tick;
        return true;
    }
    false
}

/// Tracks the largest gap between consecutive calls.
///
/// Returns `true` when `*tick_max` grew. `*tick_prev` always ends up holding
/// `tick`; when it was `0` the call only seeds it.
///
/// ```rust
/// use wdt_supervisor::ticks::test_duration;
///
/// let (mut max, mut prev) = (0, 0);
/// assert!(!test_duration(20, &mut max, &mut prev));
/// assert!(test_duration(22, &mut max, &mut prev));
/// assert!(test_duration(25, &mut max, &mut prev));
/// assert!(!test_duration(27, &mut max, &mut prev));
/// assert_eq!((max, prev), (3, 27));
/// ```
pub fn test_duration(tick: Tick, tick_max: &mut Tick, tick_prev: &mut Tick) -> bool {
    let grew = if *tick_prev == 0 {
        false
    } else {
        let gap = tick.wrapping_sub(*tick_prev);
        if gap > *tick_max {
            *tick_max = gap;
            true
        } else {
            false
        }
    };
    *tick_prev = tick;
    grew
}

/// Loop jitter bookkeeping for one supervisor task run.
///
/// Combines [`test_duration`] for the worst observed loop gap with
/// [`test_timeout`] for throttling the periodic report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DurationTracker {
    tick_max: Tick,
    tick_prev: Tick,
    tick_report_prev: Tick,
}

impl DurationTracker {
    /// Create an empty tracker.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            tick_max: 0,
            tick_prev: 0,
            tick_report_prev: 0,
        }
    }

    /// Record a loop sample. Returns `true` when the worst gap grew.
    pub fn record(&mut self, tick: Tick) -> bool {
        test_duration(tick, &mut self.tick_max, &mut self.tick_prev)
    }

    /// Returns `true` roughly once per `interval` ticks.
    pub fn should_report(&mut self, tick: Tick, interval: Tick) -> bool {
        test_timeout(tick, interval, &mut self.tick_report_prev)
    }

    /// Worst gap observed so far, in ticks.
    #[must_use]
    pub fn max(&self) -> Tick {
        self.tick_max
    }

    /// Forget every sample.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
