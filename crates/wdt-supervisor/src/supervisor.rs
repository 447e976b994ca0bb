//! Hardware control and client liveness APIs.
//!
//! [`Supervisor`] is the single owner of one hardware watchdog. It is built
//! once, shared by `Arc`, and every thread-context accessor serialises on one
//! `parking_lot::Mutex`. Two entry points are safe from interrupt context and
//! never touch that mutex: [`Supervisor::client_feed_from_isr`] and
//! [`Supervisor::on_expiry`].
//!
//! Until the first [`Supervisor::start`] call the supervisor is "not started"
//! and every accessor is a benign no-op. A subsystem that never armed the
//! watchdog must not be able to crash its dependents.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use portable_atomic::{AtomicBool, Ordering};

use crate::clock::{Clock, Tick};
use crate::device::{DeviceConfig, ExpiryMode, WatchdogDevice};
use crate::error::{StarvedClient, SupervisorError, SupervisorResult};
use crate::state::{ClientTable, HardwareState, SlotState};

/// Callback invoked on hardware expiry instead of a reset.
///
/// Runs in interrupt context: it must not block or allocate.
pub type ExpiryCallback = Arc<dyn Fn() + Send + Sync>;

/// Construction-time options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorOptions {
    /// Device or controller instance passed to the driver.
    pub device_id: u32,
    /// Interrupt line routed for expiry notifications, if any.
    pub interrupt_line: Option<u32>,
    /// Number of client slots.
    pub clients: usize,
}

impl SupervisorOptions {
    /// Default number of client slots.
    pub const DEFAULT_CLIENTS: usize = 2;

    /// Upper bound on client slots.
    pub const MAX_CLIENTS: usize = 64;
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            device_id: 0,
            interrupt_line: None,
            clients: Self::DEFAULT_CLIENTS,
        }
    }
}

/// Handle and callback captured by `start` for the expiry trampoline.
struct ExpirySnapshot<H> {
    handle: H,
    callback: ExpiryCallback,
}

/// Hardware watchdog supervisor with software liveness clients.
///
/// # Thread Safety
///
/// `start`, `feed`, `client_feed`, `validate_clients` and `validate_and_feed`
/// hold the supervisor mutex for their whole critical section. The guard is
/// scoped, so every exit path releases it.
///
/// # Interrupt Safety
///
/// `client_feed_from_isr` performs one atomic store per call. `on_expiry`
/// reads the callback snapshot with `try_read` and gives up instead of
/// waiting when `start` is replacing it.
pub struct Supervisor<D: WatchdogDevice, C: Clock> {
    device: D,
    clock: C,
    options: SupervisorOptions,
    hw: Mutex<HardwareState<D::Handle>>,
    clients: ClientTable,
    started: AtomicBool,
    expiry: RwLock<Option<ExpirySnapshot<D::Handle>>>,
}

impl<D: WatchdogDevice, C: Clock> Supervisor<D, C> {
    /// Create a supervisor for `device`. The hardware stays untouched until
    /// [`Supervisor::start`].
    ///
    /// `options.clients` is capped at [`SupervisorOptions::MAX_CLIENTS`].
    #[must_use]
    pub fn new(device: D, clock: C, mut options: SupervisorOptions) -> Self {
        if options.clients > SupervisorOptions::MAX_CLIENTS {
            tracing::warn!(
                requested = options.clients,
                max = SupervisorOptions::MAX_CLIENTS,
                "Client table capped"
            );
            options.clients = SupervisorOptions::MAX_CLIENTS;
        }
        Self {
            device,
            clock,
            options,
            hw: Mutex::new(HardwareState::new()),
            clients: ClientTable::new(options.clients),
            started: AtomicBool::new(false),
            expiry: RwLock::new(None),
        }
    }

    /// Start, restart or stop the hardware watchdog.
    ///
    /// Any open session is closed first, the client table is cleared and the
    /// previous expiry callback is dropped. A negative `starve_ms` is a stop
    /// request: the hardware stays closed and the call succeeds.
    ///
    /// Otherwise the request is clamped to the device preload range and the
    /// device is opened in callback mode when `on_nmi` is supplied, or in
    /// reset mode when it is not.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::HardwareOpenFailed`] if the device refuses
    /// the configuration. The supervisor is left closed.
    pub fn start(&self, starve_ms: i32, on_nmi: Option<ExpiryCallback>) -> SupervisorResult<()> {
        let mut hw = self.hw.lock();
        hw.started = true;
        self.started.store(true, Ordering::Release);
        self.close_locked(&mut hw);

        let Ok(requested_ms) = u32::try_from(starve_ms) else {
            tracing::debug!("Hardware watchdog stopped");
            return Ok(());
        };

        let (preload, effective_ms) = self.device.preload_spec().resolve(requested_ms);
        let mode = if on_nmi.is_some() {
            ExpiryMode::Callback
        } else {
            ExpiryMode::Reset
        };
        tracing::debug!(
            requested_ms,
            starve_ms = effective_ms,
            preload,
            mode = %mode,
            "Hardware watchdog timeout resolved"
        );

        let config = DeviceConfig {
            device_id: self.options.device_id,
            mode,
            preload,
            interrupt_line: self.options.interrupt_line,
        };
        let handle = self.device.open(&config).map_err(|err| {
            tracing::error!(error = %err, device_id = config.device_id, "Hardware watchdog open failed");
            SupervisorError::HardwareOpenFailed(err)
        })?;

        hw.handle = Some(handle);
        hw.starve_ms = effective_ms;
        if let Some(callback) = on_nmi {
            *self.expiry.write() = Some(ExpirySnapshot { handle, callback });
        }
        Ok(())
    }

    /// Fully disarm the hardware watchdog. Equivalent to `start(-1, None)`.
    pub fn stop(&self) {
        let mut hw = self.hw.lock();
        hw.started = true;
        self.started.store(true, Ordering::Release);
        self.close_locked(&mut hw);
        tracing::debug!("Hardware watchdog stopped");
    }

    /// Restart the hardware countdown. No-op while closed or never started.
    pub fn feed(&self) {
        let hw = self.hw.lock();
        if let Some(handle) = hw.handle {
            self.device.clear(handle);
        }
    }

    /// Assert liveness of client `id`, allowing `hp_max` ticks until the
    /// next assertion. `hp_max == 0` stops monitoring the client.
    ///
    /// Out-of-range ids and calls before the first start are ignored.
    pub fn client_feed(&self, id: usize, hp_max: Tick) {
        let Some(slot) = self.clients.get(id) else {
            return;
        };
        let hw = self.hw.lock();
        if hw.started {
            slot.feed(self.clock.now(), hp_max);
        }
    }

    /// Interrupt-context variant of [`Supervisor::client_feed`].
    ///
    /// Never blocks. Races with a concurrent validation pass are accepted:
    /// the footprint and gap are published together, so a reader sees either
    /// the previous assertion or this one, never a mix.
    pub fn client_feed_from_isr(&self, id: usize, hp_max: Tick) {
        if !self.started.load(Ordering::Acquire) {
            return;
        }
        if let Some(slot) = self.clients.get(id) {
            slot.feed(self.clock.now(), hp_max);
        }
    }

    /// Check every active client in id order.
    ///
    /// # Errors
    ///
    /// Returns the first starved client. Validation stops there.
    pub fn validate_clients(&self) -> Result<(), StarvedClient> {
        let hw = self.hw.lock();
        if !hw.started {
            return Ok(());
        }
        self.scan_clients()
    }

    /// Validate all clients and feed the hardware only if they are all
    /// healthy, inside one critical section.
    ///
    /// # Errors
    ///
    /// Returns the first starved client; the hardware is not fed.
    pub fn validate_and_feed(&self) -> Result<(), StarvedClient> {
        let hw = self.hw.lock();
        if !hw.started {
            return Ok(());
        }
        self.scan_clients()?;
        if let Some(handle) = hw.handle {
            self.device.clear(handle);
        }
        Ok(())
    }

    /// Expiry trampoline, called by the interrupt layer when the device fires
    /// in callback mode.
    ///
    /// Returns `true` when the stored callback ran. A handle that does not
    /// match the armed session is logged and ignored.
    ///
    /// The snapshot lock is released before the callback runs, so the
    /// callback may call back into the supervisor, e.g. to `stop` it.
    pub fn on_expiry(&self, handle: D::Handle) -> bool {
        let callback = {
            let Some(snapshot) = self.expiry.try_read() else {
                tracing::warn!(?handle, "Watchdog expiry raised during reconfiguration");
                return false;
            };
            match snapshot.as_ref() {
                Some(armed) if armed.handle == handle => Arc::clone(&armed.callback),
                Some(armed) => {
                    tracing::error!(?handle, expected = ?armed.handle, "Watchdog expiry for unknown handle");
                    return false;
                }
                None => {
                    tracing::warn!(?handle, "Watchdog expiry without a callback");
                    return false;
                }
            }
        };
        callback();
        true
    }

    /// Effective timeout while the hardware is armed.
    #[must_use]
    pub fn starve_ms(&self) -> Option<u32> {
        let hw = self.hw.lock();
        hw.handle.map(|_| hw.starve_ms)
    }

    /// Check if the hardware watchdog is open.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.hw.lock().handle.is_some()
    }

    /// Check if `start` or `stop` has been called at least once.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Number of client slots.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Current state of client `id`, or `None` when out of range.
    #[must_use]
    pub fn client_state(&self, id: usize) -> Option<SlotState> {
        self.clients.get(id).map(crate::state::ClientSlot::load)
    }

    /// Construction-time options.
    #[must_use]
    pub fn options(&self) -> SupervisorOptions {
        self.options
    }

    /// The tick source.
    #[must_use]
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// The device driver.
    #[must_use]
    pub fn device(&self) -> &D {
        &self.device
    }

    fn close_locked(&self, hw: &mut HardwareState<D::Handle>) {
        if let Some(handle) = hw.handle.take() {
            self.device.close(handle);
            tracing::debug!(?handle, "Hardware watchdog closed");
        }
        hw.starve_ms = 0;
        self.clients.clear();
        *self.expiry.write() = None;
    }

    /// Caller holds the supervisor lock.
    fn scan_clients(&self) -> Result<(), StarvedClient> {
        let now = self.clock.now();
        for (id, slot) in self.clients.iter().enumerate() {
            let state = slot.load();
            let SlotState::Active { hp_max, .. } = state else {
                continue;
            };
            if let Some(elapsed) = state.starved_for(now) {
                tracing::error!(client = id, elapsed, hp_max, "Invalid watchdog client");
                return Err(StarvedClient {
                    id,
                    elapsed,
                    hp_max,
                });
            }
        }
        Ok(())
    }
}

impl<D: WatchdogDevice, C: Clock> core::fmt::Debug for Supervisor<D, C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Supervisor")
            .field("options", &self.options)
            .field("clients", &self.clients)
            .field("started", &self.is_started())
            .finish_non_exhaustive()
    }
}
