//! Supervisor task lifecycle tests on real threads.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use portable_atomic::{AtomicU32, Ordering};
use wdt_supervisor::prelude::*;
use wdt_supervisor::TaskMonitor;

type TestResult = Result<(), Box<dyn std::error::Error>>;
type HostSupervisor = Supervisor<SimulatedDevice<SystemClock>, SystemClock>;

fn host_supervisor(clients: usize) -> Arc<HostSupervisor> {
    let clock = SystemClock::new();
    Arc::new(Supervisor::new(
        SimulatedDevice::new(clock),
        clock,
        SupervisorOptions {
            clients,
            ..SupervisorOptions::default()
        },
    ))
}

fn wait_for(monitor: &TaskMonitor, phase: TaskPhase) -> TestResult {
    let deadline = Instant::now() + Duration::from_secs(5);
    while monitor.phase() != phase {
        if Instant::now() > deadline {
            return Err(format!("task never reached {phase}").into());
        }
        thread::sleep(Duration::from_millis(1));
    }
    Ok(())
}

#[test]
fn test_task_runs_until_quit() -> TestResult {
    let supervisor = host_supervisor(2);
    let quits = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&quits);
    let env = TaskEnv::new(TaskConfig::builder().starve_ms(100).build()?).with_on_quit(move |env| {
        assert!(env.quit.is_requested());
        counter.fetch_add(1, Ordering::Relaxed);
    });
    let task = SupervisorTask::new(Arc::clone(&supervisor), env)?;
    let monitor = task.monitor();
    let handle = task.spawn()?;

    wait_for(&monitor, TaskPhase::Running)?;
    thread::sleep(Duration::from_millis(300));
    assert!(supervisor.is_armed());

    monitor.request_quit();
    let report = handle.join().map_err(|panic| format!("task panicked: {panic:?}"))?;

    assert_eq!(report.phase_reached, TaskPhase::Running);
    assert!(report.armed);
    assert!(report.cycles >= 2);
    assert_eq!(report.withheld, 0);
    assert_eq!(monitor.phase(), TaskPhase::Terminated);
    assert_eq!(quits.load(Ordering::Relaxed), 1);
    assert_eq!(supervisor.device().open_sessions(), 0);
    Ok(())
}

#[test]
fn test_stalled_client_lets_hardware_expire() -> TestResult {
    let supervisor = host_supervisor(2);
    let task = SupervisorTask::new(
        Arc::clone(&supervisor),
        TaskEnv::new(TaskConfig::builder().starve_ms(100).build()?),
    )?;
    let monitor = task.monitor();
    let handle = task.spawn()?;
    wait_for(&monitor, TaskPhase::Running)?;

    supervisor.client_feed(0, supervisor.clock().ms_to_ticks(20));
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut expiry = None;
    while expiry.is_none() && Instant::now() < deadline {
        expiry = supervisor.device().poll();
        thread::sleep(Duration::from_millis(5));
    }

    monitor.request_quit();
    let report = handle.join().map_err(|panic| format!("task panicked: {panic:?}"))?;
    assert_eq!(expiry, Some(SimExpiry::Reset));
    assert!(report.withheld >= 1);
    Ok(())
}

#[test]
fn test_quit_during_delay_never_opens_device() -> TestResult {
    let supervisor = host_supervisor(2);
    let task = SupervisorTask::new(
        Arc::clone(&supervisor),
        TaskEnv::new(TaskConfig::builder().delay_s(30).build()?),
    )?;
    let monitor = task.monitor();
    let handle = task.spawn()?;

    monitor.request_quit();
    let report = handle.join().map_err(|panic| format!("task panicked: {panic:?}"))?;
    assert_eq!(report.phase_reached, TaskPhase::Delaying);
    assert!(!report.armed);
    assert_eq!(supervisor.device().open_count(), 0);
    Ok(())
}

#[test]
fn test_open_failure_still_runs_on_quit() -> TestResult {
    let supervisor = host_supervisor(2);
    supervisor
        .device()
        .fail_next_open_with(DeviceError::unsupported("callback mode"));
    let quits = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&quits);
    let env = TaskEnv::new(TaskConfig::default())
        .with_on_nmi(|| {})
        .with_on_quit(move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
        });

    let handle = SupervisorTask::new(Arc::clone(&supervisor), env)?.spawn()?;
    let report = handle.join().map_err(|panic| format!("task panicked: {panic:?}"))?;
    assert_eq!(report.phase_reached, TaskPhase::Starting);
    assert!(!report.armed);
    assert_eq!(quits.load(Ordering::Relaxed), 1);
    assert!(!supervisor.is_armed());
    Ok(())
}
