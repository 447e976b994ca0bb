//! Tick source consumed by the supervisor.
//!
//! The supervisor never reads wall time directly. All timing goes through a
//! [`Clock`]: a monotonic, wrapping 32-bit tick counter with a fixed tick
//! period, plus the one suspension point the supervisor task uses.

use std::time::{Duration, Instant};

/// A wrapping tick count.
pub type Tick = u32;

/// Monotonic tick counter and sleep service.
///
/// Implementations must be callable from interrupt context for [`Clock::now`];
/// only [`Clock::sleep`] may block.
pub trait Clock: Send + Sync {
    /// Current tick count. Wraps at `u32::MAX`.
    fn now(&self) -> Tick;

    /// Length of one tick in microseconds.
    fn tick_period_us(&self) -> u32;

    /// Suspend the calling thread for `ticks` ticks.
    fn sleep(&self, ticks: Tick);

    /// Convert milliseconds to ticks, saturating at `u32::MAX`.
    fn ms_to_ticks(&self, ms: u32) -> Tick {
        let period = u64::from(self.tick_period_us().max(1));
        let ticks = u64::from(ms) * 1000 / period;
        Tick::try_from(ticks).unwrap_or(Tick::MAX)
    }

    /// Convert ticks to milliseconds, saturating at `u32::MAX`.
    fn ticks_to_ms(&self, ticks: Tick) -> u32 {
        let ms = u64::from(ticks) * u64::from(self.tick_period_us()) / 1000;
        u32::try_from(ms).unwrap_or(u32::MAX)
    }
}

/// Host clock backed by [`Instant`].
///
/// Tick 0 is the moment the clock was created.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
    tick_period_us: u32,
}

impl SystemClock {
    /// Default tick period: one millisecond.
    pub const DEFAULT_TICK_PERIOD_US: u32 = 1000;

    /// Create a clock with a one millisecond tick.
    #[must_use]
    pub fn new() -> Self {
        Self::with_tick_period_us(Self::DEFAULT_TICK_PERIOD_US)
    }

    /// Create a clock with a custom tick period. A period of zero is raised
    /// to one microsecond.
    #[must_use]
    pub fn with_tick_period_us(tick_period_us: u32) -> Self {
        Self {
            origin: Instant::now(),
            tick_period_us: tick_period_us.max(1),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    #[expect(clippy::cast_possible_truncation, reason = "the tick counter wraps")]
    fn now(&self) -> Tick {
        let micros = self.origin.elapsed().as_micros();
        (micros / u128::from(self.tick_period_us)) as Tick
    }

    fn tick_period_us(&self) -> u32 {
        self.tick_period_us
    }

    fn sleep(&self, ticks: Tick) {
        let micros = u64::from(ticks) * u64::from(self.tick_period_us);
        std::thread::sleep(Duration::from_micros(micros));
    }
}
