//! Prelude for wdt-supervisor.
//!
//! This module re-exports the most commonly used types for convenient importing.
//!
//! # Example
//!
//! ```rust
//! use wdt_supervisor::prelude::*;
//!
//! let clock = ManualClock::new(1000);
//! let supervisor = Supervisor::new(
//!     SimulatedDevice::new(clock.clone()),
//!     clock,
//!     SupervisorOptions::default(),
//! );
//! supervisor.start(100, None)?;
//! supervisor.feed();
//! assert!(supervisor.is_armed());
//! # Ok::<(), SupervisorError>(())
//! ```

pub use crate::clock::{Clock, SystemClock, Tick};
pub use crate::config::{TaskConfig, TaskConfigBuilder};
pub use crate::device::{DeviceConfig, ExpiryMode, PreloadSpec, WatchdogDevice};
pub use crate::error::{DeviceError, StarvedClient, SupervisorError, SupervisorResult};
pub use crate::sim::{DeviceHandle, ManualClock, SimExpiry, SimulatedDevice};
pub use crate::state::SlotState;
pub use crate::supervisor::{ExpiryCallback, Supervisor, SupervisorOptions};
pub use crate::task::{CycleOutcome, QuitFlag, SupervisorTask, TaskEnv, TaskPhase, TaskReport};
