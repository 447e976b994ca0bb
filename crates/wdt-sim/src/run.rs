//! Simulation runner: supervisor task, client feeders and the device poller.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use portable_atomic::{AtomicU64, Ordering};
use serde::Serialize;
use wdt_supervisor::prelude::*;

use crate::args::ClientSpec;

type HostSupervisor = Supervisor<SimulatedDevice<SystemClock>, SystemClock>;

/// How often the poller checks the simulated countdown.
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Outcome of one simulation run.
#[derive(Debug, Serialize)]
pub struct Summary {
    pub phase_reached: String,
    pub armed: bool,
    pub starve_ms: Option<u32>,
    pub cycles: u64,
    pub withheld: u64,
    pub max_loop_gap_ms: u32,
    pub expiries: u64,
    pub resets: u64,
    pub nmi_callbacks: u64,
    pub client_feeds: Vec<ClientFeeds>,
}

/// Feeds delivered by one client thread.
#[derive(Debug, Serialize)]
pub struct ClientFeeds {
    pub id: usize,
    pub feeds: u64,
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "phase reached:   {}", self.phase_reached)?;
        match self.starve_ms {
            Some(ms) => writeln!(f, "armed:           yes ({ms}ms)")?,
            None => writeln!(f, "armed:           no")?,
        }
        writeln!(f, "cycles:          {}", self.cycles)?;
        writeln!(f, "withheld feeds:  {}", self.withheld)?;
        writeln!(f, "worst loop gap:  {}ms", self.max_loop_gap_ms)?;
        writeln!(f, "expiries:        {}", self.expiries)?;
        writeln!(f, "resets:          {}", self.resets)?;
        write!(f, "nmi callbacks:   {}", self.nmi_callbacks)?;
        for client in &self.client_feeds {
            write!(f, "\nclient {}:        {} feeds", client.id, client.feeds)?;
        }
        Ok(())
    }
}

fn spawn_client(
    supervisor: Arc<HostSupervisor>,
    spec: ClientSpec,
    stop: QuitFlag,
) -> Result<JoinHandle<u64>> {
    thread::Builder::new()
        .name(format!("wdt-client-{}", spec.id))
        .spawn(move || {
            let hp_max = supervisor.clock().ms_to_ticks(spec.hp_ms);
            let started = Instant::now();
            let stall_after = spec.stall_after_ms.map(Duration::from_millis);
            let mut stalled = false;
            let mut feeds = 0u64;
            while !stop.is_requested() {
                if stall_after.is_some_and(|limit| started.elapsed() >= limit) {
                    if !stalled {
                        tracing::warn!(client = spec.id, "Client stalled");
                        stalled = true;
                    }
                } else {
                    supervisor.client_feed(spec.id, hp_max);
                    feeds = feeds.saturating_add(1);
                }
                thread::sleep(Duration::from_millis(spec.period_ms));
            }
            feeds
        })
        .with_context(|| format!("Failed to spawn client {}", spec.id))
}

fn spawn_poller(supervisor: Arc<HostSupervisor>, stop: QuitFlag) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("wdt-poller".to_owned())
        .spawn(move || {
            while !stop.is_requested() {
                match supervisor.device().poll() {
                    Some(SimExpiry::Callback(handle)) => {
                        supervisor.on_expiry(handle);
                    }
                    Some(SimExpiry::Reset) => {
                        tracing::error!("Hardware watchdog expired, system would reset");
                    }
                    None => {}
                }
                thread::sleep(POLL_INTERVAL);
            }
        })
        .context("Failed to spawn device poller")
}

/// Run the supervisor for `duration`, then quit and collect the summary.
pub fn simulate(
    config: TaskConfig,
    clients: &[ClientSpec],
    nmi: bool,
    duration: Duration,
) -> Result<Summary> {
    let clock = SystemClock::new();
    let supervisor = Arc::new(Supervisor::new(
        SimulatedDevice::new(clock),
        clock,
        config.supervisor_options(),
    ));

    let nmi_callbacks = Arc::new(AtomicU64::new(0));
    let mut env = TaskEnv::new(config).with_on_quit(|env| {
        tracing::info!(quit = env.quit.is_requested(), "Supervisor task finished");
    });
    if nmi {
        let counter = Arc::clone(&nmi_callbacks);
        env = env.with_on_nmi(move || {
            counter.fetch_add(1, Ordering::Relaxed);
        });
    }
    let quit = env.quit.clone();

    let task = SupervisorTask::new(Arc::clone(&supervisor), env)?;
    let monitor = task.monitor();
    let task_handle = task.spawn()?;

    let helpers = QuitFlag::new();
    let feeders = clients
        .iter()
        .map(|spec| {
            spawn_client(Arc::clone(&supervisor), *spec, helpers.clone())
                .map(|handle| (spec.id, handle))
        })
        .collect::<Result<Vec<_>>>()?;
    let poller = spawn_poller(Arc::clone(&supervisor), helpers.clone())?;

    thread::sleep(duration);
    let starve_ms = supervisor.starve_ms();
    quit.request();
    let report = task_handle
        .join()
        .map_err(|panic| anyhow!("Supervisor task panicked: {panic:?}"))?;

    helpers.request();
    let mut client_feeds = Vec::with_capacity(feeders.len());
    for (id, handle) in feeders {
        let feeds = handle
            .join()
            .map_err(|panic| anyhow!("Client {id} panicked: {panic:?}"))?;
        client_feeds.push(ClientFeeds { id, feeds });
    }
    poller
        .join()
        .map_err(|panic| anyhow!("Device poller panicked: {panic:?}"))?;

    tracing::debug!(phase = %monitor.phase(), "Simulation finished");
    Ok(Summary {
        phase_reached: report.phase_reached.to_string(),
        armed: report.armed,
        starve_ms,
        cycles: report.cycles,
        withheld: report.withheld,
        max_loop_gap_ms: supervisor.clock().ticks_to_ms(report.max_loop_gap_ticks),
        expiries: supervisor.device().expiry_count(),
        resets: supervisor.device().reset_count(),
        nmi_callbacks: nmi_callbacks.load(Ordering::Relaxed),
        client_feeds,
    })
}
