//! Watchdog device driver seam.
//!
//! The supervisor drives the physical watchdog through [`WatchdogDevice`]:
//! an opaque handle returned by `open`, cleared on every feed, and closed on
//! restart or stop. How a millisecond request maps to the device countdown is
//! described by [`PreloadSpec`].

use core::fmt::Debug;

use crate::error::DeviceError;

/// What the device does when its countdown expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpiryMode {
    /// Reset the system.
    #[default]
    Reset,
    /// Raise the expiry interrupt and call back instead of resetting.
    Callback,
}

impl ExpiryMode {
    /// Get the mode as a string slice.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reset => "reset",
            Self::Callback => "callback",
        }
    }
}

impl core::fmt::Display for ExpiryMode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Preload field constraints of a watchdog device.
///
/// The countdown register is `max_preload` wide at most and is decremented by
/// a device clock of `clock_khz` divided by `2^divisor_shift`. One preload
/// unit therefore lasts `(1 << divisor_shift) / clock_khz` milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreloadSpec {
    /// Largest value the preload field holds.
    pub max_preload: u32,
    /// Clock divisor as a power of two.
    pub divisor_shift: u32,
    /// Device input clock in kHz.
    pub clock_khz: u32,
}

impl PreloadSpec {
    /// 12-bit preload, 200 MHz input clock, divided by `2^13`.
    ///
    /// Usable range is 0 to 167ms.
    pub const DEFAULT: Self = Self {
        max_preload: 0xfff,
        divisor_shift: 13,
        clock_khz: 200_000,
    };

    /// Longest timeout the device can enforce, in milliseconds.
    #[must_use]
    pub fn max_ms(&self) -> u32 {
        self.ms_for_preload(self.max_preload)
    }

    /// Preload value for a millisecond timeout, clamped to the field width.
    #[must_use]
    pub fn preload_for_ms(&self, ms: u32) -> u32 {
        let raw = (u64::from(ms) * u64::from(self.clock_khz))
            .checked_shr(self.divisor_shift)
            .unwrap_or(0);
        u32::try_from(raw)
            .unwrap_or(u32::MAX)
            .min(self.max_preload)
    }

    /// Timeout in milliseconds enforced by a preload value.
    #[must_use]
    pub fn ms_for_preload(&self, preload: u32) -> u32 {
        let khz = u64::from(self.clock_khz.max(1));
        let ms = u64::from(preload)
            .checked_shl(self.divisor_shift)
            .unwrap_or(u64::MAX)
            / khz;
        u32::try_from(ms).unwrap_or(u32::MAX)
    }

    /// Resolve a requested timeout into `(preload, effective_ms)`.
    ///
    /// The request is clamped to `[0, max_ms]`, converted to a preload value,
    /// and converted back so the reported timeout is exactly what the device
    /// will enforce. `effective_ms` never exceeds the request.
    #[must_use]
    pub fn resolve(&self, requested_ms: u32) -> (u32, u32) {
        let clamped = requested_ms.min(self.max_ms());
        let preload = self.preload_for_ms(clamped);
        (preload, self.ms_for_preload(preload))
    }
}

impl Default for PreloadSpec {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Configuration passed to [`WatchdogDevice::open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Device or controller instance.
    pub device_id: u32,
    /// Reset or callback on expiry.
    pub mode: ExpiryMode,
    /// Countdown preload value.
    pub preload: u32,
    /// Interrupt line used to deliver the expiry notification, if the
    /// platform needs one routed explicitly.
    pub interrupt_line: Option<u32>,
}

/// Watchdog device driver.
///
/// `clear` and `close` are infallible: a driver that cannot clear simply lets
/// the device expire, which is the fail-safe outcome.
///
/// # Implementation Requirements
///
/// 1. `open` MUST leave the device disarmed when it returns an error
/// 2. `clear` MUST restart the countdown from the configured preload
/// 3. `close` MUST stop the countdown when the hardware supports it
pub trait WatchdogDevice: Send + Sync {
    /// Opaque handle identifying one open session.
    type Handle: Copy + Eq + Debug + Send + Sync;

    /// Arm the device with `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the device refuses the configuration.
    fn open(&self, config: &DeviceConfig) -> Result<Self::Handle, DeviceError>;

    /// Restart the countdown.
    fn clear(&self, handle: Self::Handle);

    /// Release the device.
    fn close(&self, handle: Self::Handle);

    /// Preload field constraints.
    fn preload_spec(&self) -> PreloadSpec {
        PreloadSpec::DEFAULT
    }
}
