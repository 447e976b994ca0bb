//! Simulated watchdog device and manual clock.
//!
//! [`SimulatedDevice`] models the countdown of a real watchdog on top of any
//! [`Clock`]: `open` loads the preload, `clear` restarts it, and [`poll`]
//! reports an expiry once more ticks than the preload allows have elapsed
//! since the last clear. It backs the `wdt-sim` binary and the test suite.
//!
//! [`poll`]: SimulatedDevice::poll

use std::sync::Arc;

use parking_lot::Mutex;
use portable_atomic::{AtomicU32, AtomicU64, Ordering};

use crate::clock::{Clock, Tick};
use crate::device::{DeviceConfig, ExpiryMode, PreloadSpec, WatchdogDevice};
use crate::error::DeviceError;

/// Manually driven tick source.
///
/// Clones share the same counter. [`Clock::sleep`] advances the counter
/// instead of blocking, so a supervisor task driven by this clock runs as
/// fast as the host allows while observing consistent tick arithmetic.
#[derive(Debug, Clone)]
pub struct ManualClock {
    inner: Arc<ManualClockInner>,
}

#[derive(Debug)]
struct ManualClockInner {
    now: AtomicU32,
    tick_period_us: u32,
    sleeps: AtomicU64,
}

impl ManualClock {
    /// Create a clock at tick 0.
    #[must_use]
    pub fn new(tick_period_us: u32) -> Self {
        Self::starting_at(tick_period_us, 0)
    }

    /// Create a clock at `start`. Handy for exercising counter wraparound.
    #[must_use]
    pub fn starting_at(tick_period_us: u32, start: Tick) -> Self {
        Self {
            inner: Arc::new(ManualClockInner {
                now: AtomicU32::new(start),
                tick_period_us: tick_period_us.max(1),
                sleeps: AtomicU64::new(0),
            }),
        }
    }

    /// Advance by `ticks`, wrapping.
    pub fn advance(&self, ticks: Tick) {
        self.inner.now.fetch_add(ticks, Ordering::AcqRel);
    }

    /// Advance by `ms` milliseconds.
    pub fn advance_ms(&self, ms: u32) {
        self.advance(self.ms_to_ticks(ms));
    }

    /// Jump to `tick`.
    pub fn set(&self, tick: Tick) {
        self.inner.now.store(tick, Ordering::Release);
    }

    /// Number of `sleep` calls so far.
    #[must_use]
    pub fn sleep_count(&self) -> u64 {
        self.inner.sleeps.load(Ordering::Acquire)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Tick {
        self.inner.now.load(Ordering::Acquire)
    }

    fn tick_period_us(&self) -> u32 {
        self.inner.tick_period_us
    }

    fn sleep(&self, ticks: Tick) {
        self.inner.sleeps.fetch_add(1, Ordering::AcqRel);
        self.advance(ticks);
    }
}

/// Session handle issued by [`SimulatedDevice`]. Every `open` issues a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle(u32);

impl DeviceHandle {
    /// Wrap a raw handle value.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw handle value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// What an expired simulated countdown did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimExpiry {
    /// Reset mode: the system would have restarted. The session is closed.
    Reset,
    /// Callback mode: the expiry interrupt fired for this handle. The
    /// countdown restarts.
    Callback(DeviceHandle),
}

#[derive(Debug)]
struct Session {
    handle: DeviceHandle,
    config: DeviceConfig,
    timeout_ticks: Tick,
    last_clear: Tick,
}

#[derive(Debug, Default)]
struct SimState {
    session: Option<Session>,
    last_config: Option<DeviceConfig>,
    next_handle: u32,
    fail_next_open: Option<DeviceError>,
}

/// Software model of a watchdog device.
#[derive(Debug)]
pub struct SimulatedDevice<C: Clock> {
    clock: C,
    spec: PreloadSpec,
    state: Mutex<SimState>,
    opens: AtomicU64,
    clears: AtomicU64,
    closes: AtomicU64,
    resets: AtomicU64,
    expiries: AtomicU64,
}

impl<C: Clock> SimulatedDevice<C> {
    /// Create a device with the default preload constraints.
    #[must_use]
    pub fn new(clock: C) -> Self {
        Self::with_preload_spec(clock, PreloadSpec::DEFAULT)
    }

    /// Create a device with custom preload constraints.
    #[must_use]
    pub fn with_preload_spec(clock: C, spec: PreloadSpec) -> Self {
        Self {
            clock,
            spec,
            state: Mutex::new(SimState {
                next_handle: 1,
                ..SimState::default()
            }),
            opens: AtomicU64::new(0),
            clears: AtomicU64::new(0),
            closes: AtomicU64::new(0),
            resets: AtomicU64::new(0),
            expiries: AtomicU64::new(0),
        }
    }

    /// Make the next `open` fail with [`DeviceError::Busy`].
    pub fn fail_next_open(&self) {
        self.fail_next_open_with(DeviceError::Busy);
    }

    /// Make the next `open` fail with `error`.
    pub fn fail_next_open_with(&self, error: DeviceError) {
        self.state.lock().fail_next_open = Some(error);
    }

    /// Check the countdown.
    ///
    /// Returns what the device did if more ticks than the preload allows have
    /// passed since the last clear.
    pub fn poll(&self) -> Option<SimExpiry> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let session = state.session.as_mut()?;
        if now.wrapping_sub(session.last_clear) <= session.timeout_ticks {
            return None;
        }
        Some(self.expire_locked(&mut state, now))
    }

    /// Force the countdown to expire now, regardless of elapsed time.
    pub fn expire(&self) -> Option<SimExpiry> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        if state.session.is_none() {
            return None;
        }
        Some(self.expire_locked(&mut state, now))
    }

    fn expire_locked(&self, state: &mut SimState, now: Tick) -> SimExpiry {
        self.expiries.fetch_add(1, Ordering::Relaxed);
        let Some(session) = state.session.as_mut() else {
            return SimExpiry::Reset;
        };
        match session.config.mode {
            ExpiryMode::Callback => {
                session.last_clear = now;
                SimExpiry::Callback(session.handle)
            }
            ExpiryMode::Reset => {
                tracing::warn!(handle = session.handle.raw(), "Simulated watchdog reset");
                state.session = None;
                self.resets.fetch_add(1, Ordering::Relaxed);
                SimExpiry::Reset
            }
        }
    }

    /// Handle of the open session.
    #[must_use]
    pub fn current_handle(&self) -> Option<DeviceHandle> {
        self.state.lock().session.as_ref().map(|s| s.handle)
    }

    /// Check if a session is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state.lock().session.is_some()
    }

    /// Number of open sessions, zero or one.
    #[must_use]
    pub fn open_sessions(&self) -> usize {
        usize::from(self.is_open())
    }

    /// Configuration of the most recent successful `open`.
    #[must_use]
    pub fn last_config(&self) -> Option<DeviceConfig> {
        self.state.lock().last_config
    }

    /// Countdown length of the open session in ticks.
    #[must_use]
    pub fn timeout_ticks(&self) -> Option<Tick> {
        self.state.lock().session.as_ref().map(|s| s.timeout_ticks)
    }

    /// Successful opens.
    #[must_use]
    pub fn open_count(&self) -> u64 {
        self.opens.load(Ordering::Relaxed)
    }

    /// Countdown restarts.
    #[must_use]
    pub fn clear_count(&self) -> u64 {
        self.clears.load(Ordering::Relaxed)
    }

    /// Closed sessions.
    #[must_use]
    pub fn close_count(&self) -> u64 {
        self.closes.load(Ordering::Relaxed)
    }

    /// Expiries in reset mode.
    #[must_use]
    pub fn reset_count(&self) -> u64 {
        self.resets.load(Ordering::Relaxed)
    }

    /// Expiries in either mode.
    #[must_use]
    pub fn expiry_count(&self) -> u64 {
        self.expiries.load(Ordering::Relaxed)
    }

    /// The tick source.
    #[must_use]
    pub fn clock(&self) -> &C {
        &self.clock
    }
}

impl<C: Clock> WatchdogDevice for SimulatedDevice<C> {
    type Handle = DeviceHandle;

    fn open(&self, config: &DeviceConfig) -> Result<DeviceHandle, DeviceError> {
        let mut state = self.state.lock();
        if let Some(error) = state.fail_next_open.take() {
            return Err(error);
        }
        if state.session.is_some() {
            return Err(DeviceError::Busy);
        }
        if config.preload > self.spec.max_preload {
            return Err(DeviceError::rejected(format!(
                "preload {} exceeds {}",
                config.preload, self.spec.max_preload
            )));
        }

        let handle = DeviceHandle(state.next_handle);
        state.next_handle = state.next_handle.wrapping_add(1).max(1);
        let timeout_ticks = self.clock.ms_to_ticks(self.spec.ms_for_preload(config.preload));
        state.session = Some(Session {
            handle,
            config: *config,
            timeout_ticks,
            last_clear: self.clock.now(),
        });
        state.last_config = Some(*config);
        self.opens.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            handle = handle.raw(),
            preload = config.preload,
            timeout_ticks,
            mode = %config.mode,
            "Simulated watchdog armed"
        );
        Ok(handle)
    }

    fn clear(&self, handle: DeviceHandle) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        if let Some(session) = state.session.as_mut().filter(|s| s.handle == handle) {
            session.last_clear = now;
            self.clears.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn close(&self, handle: DeviceHandle) {
        let mut state = self.state.lock();
        if state.session.as_ref().is_some_and(|s| s.handle == handle) {
            state.session = None;
            self.closes.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn preload_spec(&self) -> PreloadSpec {
        self.spec
    }
}
