//! # wdt-supervisor
//!
//! Hardware watchdog supervision for resource-constrained controllers, with a
//! software watchdog layered on top so that several independent subsystems
//! ("clients") can each assert liveness on their own schedule.
//!
//! A single periodic task owns the decision to feed the hardware device: it
//! feeds only while every registered client has checked in within its
//! allotted gap. One stalled client therefore starves the whole device, which
//! then resets the system or raises its expiry callback.
//!
//! ## Architecture
//!
//! - [`ticks`] - wraparound-safe tick arithmetic for timeouts and jitter
//! - [`clock`] - the tick source consumed by the supervisor
//! - [`device`] - the watchdog driver seam and preload arithmetic
//! - [`state`] - lock-free client slots and the hardware record
//! - [`supervisor`] - hardware control and client liveness APIs
//! - [`task`] - the periodic supervisor task state machine
//! - [`config`] - task configuration (serde + builder)
//! - [`sim`] - simulated device and manual clock for hosts and tests
//! - [`error`] - error taxonomy
//!
//! ## Interrupt Safety
//!
//! [`Supervisor::client_feed_from_isr`] and [`Supervisor::on_expiry`] never
//! take the supervisor lock. Client slots are single packed atomics, and the
//! expiry callback is read from a snapshot with a non-blocking `try_read`.
//!
//! ## Example
//!
//! ```rust
//! use wdt_supervisor::prelude::*;
//!
//! let clock = ManualClock::new(1000);
//! let device = SimulatedDevice::new(clock.clone());
//! let supervisor = Supervisor::new(device, clock.clone(), SupervisorOptions::default());
//!
//! supervisor.start(150, None)?;
//! assert_eq!(supervisor.starve_ms(), Some(149));
//!
//! // Client 0 must check in at least every 500ms.
//! supervisor.client_feed(0, clock.ms_to_ticks(500));
//! clock.advance_ms(300);
//! assert!(supervisor.validate_and_feed().is_ok());
//!
//! clock.advance_ms(300);
//! let starved = supervisor.validate_and_feed().err();
//! assert_eq!(starved.map(|s| s.id), Some(0));
//! # Ok::<(), SupervisorError>(())
//! ```

#![deny(
    unsafe_op_in_unsafe_fn,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::panic,
    missing_docs,
    missing_debug_implementations
)]
#![warn(clippy::pedantic)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod clock;
pub mod config;
pub mod device;
pub mod error;
pub mod prelude;
pub mod sim;
pub mod state;
pub mod supervisor;
pub mod task;
pub mod ticks;

pub use clock::{Clock, SystemClock, Tick};
pub use config::{TaskConfig, TaskConfigBuilder};
pub use device::{DeviceConfig, ExpiryMode, PreloadSpec, WatchdogDevice};
pub use error::{DeviceError, StarvedClient, SupervisorError, SupervisorResult};
pub use sim::{DeviceHandle, ManualClock, SimExpiry, SimulatedDevice};
pub use state::{ClientSlot, ClientTable, SlotState};
pub use supervisor::{ExpiryCallback, Supervisor, SupervisorOptions};
pub use task::{
    CycleOutcome, NmiCallback, QuitCallback, QuitFlag, SupervisorTask, TaskEnv, TaskMonitor,
    TaskPhase, TaskReport,
};
pub use ticks::DurationTracker;
