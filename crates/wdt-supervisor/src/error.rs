//! Error types for the watchdog supervisor.
//!
//! Only hardware open failure aborts supervisor start-up. Starvation is not a
//! failure of the API; it is reported as [`StarvedClient`] and consumed by the
//! supervisor task to withhold the hardware feed.

use thiserror::Error;

use crate::clock::Tick;

/// Errors reported by a [`WatchdogDevice`](crate::device::WatchdogDevice) driver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// The device does not support the requested configuration.
    #[error("Unsupported configuration: {0}")]
    Unsupported(String),

    /// The device is already held by another owner.
    #[error("Device busy")]
    Busy,

    /// The driver rejected the open request.
    #[error("Device rejected open: {0}")]
    Rejected(String),
}

impl DeviceError {
    /// Create an unsupported configuration error.
    #[must_use]
    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self::Unsupported(reason.into())
    }

    /// Create a rejected open error.
    #[must_use]
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected(reason.into())
    }
}

/// Errors that can occur while starting or configuring the supervisor.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The hardware watchdog refused to open with the requested configuration.
    #[error("Hardware watchdog open failed: {0}")]
    HardwareOpenFailed(#[source] DeviceError),

    /// Invalid task configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The supervisor task thread could not be created.
    #[error("Failed to spawn supervisor task: {0}")]
    SpawnFailed(#[source] std::io::Error),
}

impl SupervisorError {
    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_configuration(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration(reason.into())
    }
}

/// A specialized `Result` type for supervisor operations.
pub type SupervisorResult<T> = std::result::Result<T, SupervisorError>;

/// A registered client missed its liveness deadline.
///
/// The first starved client in id order wins; validation stops there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Client {id} starved: {elapsed} ticks since last feed (allowed {hp_max})")]
pub struct StarvedClient {
    /// Client slot index.
    pub id: usize,
    /// Ticks elapsed since the client last asserted liveness.
    pub elapsed: Tick,
    /// Allowed gap in ticks.
    pub hp_max: Tick,
}
