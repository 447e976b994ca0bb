//! Periodic supervisor task.
//!
//! The task is the only party that feeds the hardware. It walks through
//! `Delaying -> Starting -> Running -> Closing -> Terminated`:
//!
//! - **Delaying** waits `delay_s` seconds in one second steps so a quit
//!   request is noticed promptly.
//! - **Starting** arms the hardware with the configured timeout.
//! - **Running** validates every client and feeds the hardware only when all
//!   are healthy, then sleeps for the feed period.
//! - **Closing** feeds once more, disarms the hardware and runs `on_quit`.
//!
//! Each phase is exposed as a step (`delay`, `arm`, `cycle`, `close`) so the
//! machine can be driven one transition at a time; [`SupervisorTask::run`]
//! composes them and [`SupervisorTask::spawn`] runs them on a named thread.

use std::sync::Arc;
use std::thread::JoinHandle;

use portable_atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicU64, Ordering};

use crate::clock::{Clock, Tick};
use crate::config::TaskConfig;
use crate::device::WatchdogDevice;
use crate::error::{StarvedClient, SupervisorError, SupervisorResult};
use crate::supervisor::{ExpiryCallback, Supervisor};
use crate::ticks::DurationTracker;

/// Shortest feed period the task aims for, in milliseconds.
const FEED_PERIOD_FLOOR_MS: u32 = 50;

/// Name of the thread created by [`SupervisorTask::spawn`].
pub const TASK_THREAD_NAME: &str = "wdt-supervisor";

/// Callback run once when the task closes.
pub type QuitCallback = Box<dyn FnOnce(&TaskEnv) + Send>;

/// Callback run on hardware expiry instead of a reset.
pub type NmiCallback = ExpiryCallback;

/// Feed period for an effective timeout of `starve_ms`.
///
/// Two thirds of the timeout, but never below `min(50, starve_ms)`.
///
/// ```rust
/// use wdt_supervisor::task::feed_period_ms;
///
/// assert_eq!(feed_period_ms(149), 99);
/// assert_eq!(feed_period_ms(60), 50);
/// assert_eq!(feed_period_ms(30), 30);
/// ```
#[must_use]
pub fn feed_period_ms(starve_ms: u32) -> u32 {
    let two_thirds = u32::try_from(u64::from(starve_ms) * 2 / 3).unwrap_or(starve_ms);
    FEED_PERIOD_FLOOR_MS.clamp(two_thirds, starve_ms)
}

/// Supervisor task phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskPhase {
    /// Waiting before arming the hardware.
    Delaying = 0,
    /// Arming the hardware.
    Starting = 1,
    /// Validating clients and feeding the hardware.
    Running = 2,
    /// Disarming the hardware.
    Closing = 3,
    /// Finished.
    Terminated = 4,
}

impl TaskPhase {
    /// Convert from raw u8 value.
    #[must_use]
    pub fn from_raw(value: u8) -> Self {
        match value {
            0 => Self::Delaying,
            1 => Self::Starting,
            2 => Self::Running,
            3 => Self::Closing,
            _ => Self::Terminated,
        }
    }

    /// Convert to raw u8 value.
    #[must_use]
    pub fn to_raw(self) -> u8 {
        self as u8
    }

    /// Get the phase as a string slice.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Delaying => "delaying",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Closing => "closing",
            Self::Terminated => "terminated",
        }
    }
}

impl core::fmt::Display for TaskPhase {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cooperative cancellation flag shared between the task and its owner.
#[derive(Debug, Clone, Default)]
pub struct QuitFlag(Arc<AtomicBool>);

impl QuitFlag {
    /// Create a cleared flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the task to stop at its next loop iteration.
    pub fn request(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Check if a stop was requested.
    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Everything the task needs from its owner.
pub struct TaskEnv {
    /// Task configuration.
    pub config: TaskConfig,
    /// Cooperative stop request.
    pub quit: QuitFlag,
    /// Run once after the hardware has been disarmed.
    pub on_quit: Option<QuitCallback>,
    /// Arm the hardware in callback mode with this expiry callback.
    pub on_nmi: Option<NmiCallback>,
}

impl TaskEnv {
    /// Create an environment with a fresh quit flag and no callbacks.
    #[must_use]
    pub fn new(config: TaskConfig) -> Self {
        Self {
            config,
            quit: QuitFlag::new(),
            on_quit: None,
            on_nmi: None,
        }
    }

    /// Set the quit callback.
    #[must_use]
    pub fn with_on_quit(mut self, on_quit: impl FnOnce(&TaskEnv) + Send + 'static) -> Self {
        self.on_quit = Some(Box::new(on_quit));
        self
    }

    /// Set the expiry callback.
    #[must_use]
    pub fn with_on_nmi(mut self, on_nmi: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_nmi = Some(Arc::new(on_nmi));
        self
    }
}

impl core::fmt::Debug for TaskEnv {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TaskEnv")
            .field("config", &self.config)
            .field("quit", &self.quit.is_requested())
            .field("on_quit", &self.on_quit.is_some())
            .field("on_nmi", &self.on_nmi.is_some())
            .finish()
    }
}

#[derive(Debug)]
struct MonitorInner {
    phase: AtomicU8,
    cycles: AtomicU64,
    withheld: AtomicU64,
    max_loop_gap: AtomicU32,
    quit: QuitFlag,
}

/// Read-only view of a running task, plus its quit switch.
#[derive(Debug, Clone)]
pub struct TaskMonitor {
    inner: Arc<MonitorInner>,
}

impl TaskMonitor {
    fn new(quit: QuitFlag) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                phase: AtomicU8::new(TaskPhase::Delaying.to_raw()),
                cycles: AtomicU64::new(0),
                withheld: AtomicU64::new(0),
                max_loop_gap: AtomicU32::new(0),
                quit,
            }),
        }
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> TaskPhase {
        TaskPhase::from_raw(self.inner.phase.load(Ordering::Acquire))
    }

    /// Ask the task to stop.
    pub fn request_quit(&self) {
        self.inner.quit.request();
    }

    /// Worst gap between consecutive loop iterations, in ticks.
    #[must_use]
    pub fn max_loop_gap_ticks(&self) -> Tick {
        self.inner.max_loop_gap.load(Ordering::Relaxed)
    }

    /// Completed running cycles.
    #[must_use]
    pub fn cycles(&self) -> u64 {
        self.inner.cycles.load(Ordering::Relaxed)
    }

    /// Cycles in which the hardware feed was withheld.
    #[must_use]
    pub fn withheld(&self) -> u64 {
        self.inner.withheld.load(Ordering::Relaxed)
    }

    fn set_phase(&self, phase: TaskPhase) {
        self.inner.phase.store(phase.to_raw(), Ordering::Release);
    }
}

/// Result of one running cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Every client was healthy and the hardware was fed.
    Fed,
    /// A client starved; the hardware was not fed.
    Withheld(StarvedClient),
}

/// Summary returned when the task terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskReport {
    /// Furthest phase reached before closing.
    pub phase_reached: TaskPhase,
    /// Completed running cycles.
    pub cycles: u64,
    /// Cycles in which the feed was withheld.
    pub withheld: u64,
    /// Worst loop gap in ticks.
    pub max_loop_gap_ticks: Tick,
    /// Whether the hardware was armed.
    pub armed: bool,
}

/// The supervisor task state machine.
pub struct SupervisorTask<D: WatchdogDevice, C: Clock> {
    supervisor: Arc<Supervisor<D, C>>,
    env: TaskEnv,
    monitor: TaskMonitor,
    tracker: DurationTracker,
    feed_period: Tick,
    report_interval: Tick,
    armed: bool,
}

impl<D: WatchdogDevice, C: Clock> SupervisorTask<D, C> {
    /// Create a task for `supervisor`.
    ///
    /// # Errors
    ///
    /// Returns an error if `env.config` is invalid.
    ///
    /// A configuration whose device or client options differ from the
    /// supervisor's is accepted with a warning; the supervisor's win.
    pub fn new(supervisor: Arc<Supervisor<D, C>>, env: TaskEnv) -> SupervisorResult<Self> {
        env.config.validate()?;
        if !env.config.matches(&supervisor.options()) {
            tracing::warn!(
                configured = ?env.config.supervisor_options(),
                actual = ?supervisor.options(),
                "Task configuration does not match supervisor options"
            );
        }
        let report_interval = supervisor
            .clock()
            .ms_to_ticks(env.config.report_interval_ms)
            .max(1);
        tracing::debug!(
            delay_s = env.config.delay_s,
            starve_ms = env.config.starve_ms,
            on_quit = env.on_quit.is_some(),
            on_nmi = env.on_nmi.is_some(),
            "Supervisor task created"
        );
        Ok(Self {
            monitor: TaskMonitor::new(env.quit.clone()),
            supervisor,
            env,
            tracker: DurationTracker::new(),
            feed_period: 1,
            report_interval,
            armed: false,
        })
    }

    /// Handle for observing the task and requesting a stop.
    #[must_use]
    pub fn monitor(&self) -> TaskMonitor {
        self.monitor.clone()
    }

    /// The supervised hardware.
    #[must_use]
    pub fn supervisor(&self) -> &Arc<Supervisor<D, C>> {
        &self.supervisor
    }

    /// Feed period in ticks. Meaningful once armed.
    #[must_use]
    pub fn feed_period_ticks(&self) -> Tick {
        self.feed_period
    }

    fn quit_requested(&self) -> bool {
        self.env.quit.is_requested()
    }

    /// Wait out the start-up delay, one second at a time.
    ///
    /// Returns `false` if a quit was requested before the delay elapsed.
    pub fn delay(&mut self) -> bool {
        self.monitor.set_phase(TaskPhase::Delaying);
        let clock = self.supervisor.clock();
        let one_second = clock.ms_to_ticks(1000);
        let mut remaining = self.env.config.delay_s;
        loop {
            if self.quit_requested() {
                tracing::info!(remaining_s = remaining, "Quit requested during start-up delay");
                return false;
            }
            if remaining == 0 {
                return true;
            }
            tracing::debug!(remaining_s = remaining, "Hardware watchdog starts soon");
            remaining -= 1;
            clock.sleep(one_second);
        }
    }

    /// Arm the hardware and compute the feed period.
    ///
    /// Returns the feed period in milliseconds.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::HardwareOpenFailed`] if the device refuses
    /// the configuration.
    pub fn arm(&mut self) -> SupervisorResult<u32> {
        self.monitor.set_phase(TaskPhase::Starting);
        let requested = self.env.config.effective_starve_ms();
        self.supervisor.start(requested, self.env.on_nmi.clone())?;

        let starve_ms = self.supervisor.starve_ms().unwrap_or(0);
        let period_ms = feed_period_ms(starve_ms);
        self.feed_period = self.supervisor.clock().ms_to_ticks(period_ms).max(1);
        self.armed = true;
        tracing::info!(
            starve_ms,
            feed_period_ms = period_ms,
            feed_period_ticks = self.feed_period,
            "Hardware watchdog armed"
        );
        self.monitor.set_phase(TaskPhase::Running);
        Ok(period_ms)
    }

    /// One running iteration: validate, feed if healthy, track jitter.
    pub fn cycle(&mut self) -> CycleOutcome {
        let outcome = match self.supervisor.validate_and_feed() {
            Ok(()) => CycleOutcome::Fed,
            Err(starved) => {
                self.monitor.inner.withheld.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(client = starved.id, "Hardware feed withheld");
                CycleOutcome::Withheld(starved)
            }
        };
        self.monitor.inner.cycles.fetch_add(1, Ordering::Relaxed);

        let now = self.supervisor.clock().now();
        if self.tracker.record(now) {
            self.monitor
                .inner
                .max_loop_gap
                .store(self.tracker.max(), Ordering::Relaxed);
        }
        if self.tracker.should_report(now, self.report_interval) {
            tracing::debug!(max_loop_gap_ticks = self.tracker.max(), "Supervisor loop jitter");
        }
        outcome
    }

    /// Feed once more, disarm the hardware and run `on_quit`.
    pub fn close(&mut self) {
        self.monitor.set_phase(TaskPhase::Closing);
        tracing::info!(quit = self.quit_requested(), "Supervisor task closing");
        self.supervisor.feed();
        self.supervisor.stop();
        if let Some(on_quit) = self.env.on_quit.take() {
            on_quit(&self.env);
        }
        self.monitor.set_phase(TaskPhase::Terminated);
    }

    /// Run every phase to completion on the calling thread.
    pub fn run(mut self) -> TaskReport {
        let mut phase_reached = TaskPhase::Delaying;
        if self.delay() {
            phase_reached = TaskPhase::Starting;
            match self.arm() {
                Ok(_) => {
                    phase_reached = TaskPhase::Running;
                    while !self.quit_requested() {
                        self.cycle();
                        self.supervisor.clock().sleep(self.feed_period);
                    }
                }
                Err(err) => tracing::error!(error = %err, "Supervisor task failed to arm"),
            }
        }
        self.close();

        TaskReport {
            phase_reached,
            cycles: self.monitor.cycles(),
            withheld: self.monitor.withheld(),
            max_loop_gap_ticks: self.tracker.max(),
            armed: self.armed,
        }
    }
}

impl<D, C> SupervisorTask<D, C>
where
    D: WatchdogDevice + 'static,
    C: Clock + 'static,
{
    /// Run the task on a dedicated thread.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::SpawnFailed`] if the thread cannot be
    /// created.
    pub fn spawn(self) -> SupervisorResult<JoinHandle<TaskReport>> {
        std::thread::Builder::new()
            .name(TASK_THREAD_NAME.to_owned())
            .spawn(move || self.run())
            .map_err(SupervisorError::SpawnFailed)
    }
}

impl<D: WatchdogDevice, C: Clock> core::fmt::Debug for SupervisorTask<D, C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SupervisorTask")
            .field("env", &self.env)
            .field("phase", &self.monitor.phase())
            .field("feed_period", &self.feed_period)
            .field("armed", &self.armed)
            .finish_non_exhaustive()
    }
}
