//! Concurrency tests for the supervisor.

use std::sync::Arc;
use std::thread;

use wdt_supervisor::prelude::*;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn shared_supervisor(
    clients: usize,
) -> (Arc<Supervisor<SimulatedDevice<ManualClock>, ManualClock>>, ManualClock) {
    let clock = ManualClock::starting_at(1000, 1);
    let supervisor = Supervisor::new(
        SimulatedDevice::new(clock.clone()),
        clock.clone(),
        SupervisorOptions {
            clients,
            ..SupervisorOptions::default()
        },
    );
    (Arc::new(supervisor), clock)
}

#[test]
fn test_concurrent_client_feeds() -> TestResult {
    let (supervisor, _clock) = shared_supervisor(8);
    supervisor.start(150, None)?;
    let mut handles = vec![];

    for id in 0..8 {
        let supervisor = Arc::clone(&supervisor);
        handles.push(thread::spawn(move || {
            for _ in 0..1000 {
                if id % 2 == 0 {
                    supervisor.client_feed(id, 100);
                } else {
                    supervisor.client_feed_from_isr(id, 100);
                }
            }
        }));
    }

    for handle in handles {
        assert!(handle.join().is_ok(), "Thread should not panic");
    }

    for id in 0..8 {
        assert_eq!(
            supervisor.client_state(id),
            Some(SlotState::Active {
                footprint: 1,
                hp_max: 100
            })
        );
    }
    Ok(())
}

#[test]
fn test_isr_feeds_race_with_validation() -> TestResult {
    let (supervisor, clock) = shared_supervisor(2);
    supervisor.start(150, None)?;
    supervisor.client_feed(0, 50);

    let feeder = {
        let supervisor = Arc::clone(&supervisor);
        let clock = clock.clone();
        thread::spawn(move || {
            for _ in 0..2000 {
                supervisor.client_feed_from_isr(0, 50);
                clock.advance(1);
            }
        })
    };

    let mut failures = 0;
    for _ in 0..2000 {
        if supervisor.validate_and_feed().is_err() {
            failures += 1;
        }
    }
    assert!(feeder.join().is_ok(), "Feeder should not panic");

    assert_eq!(failures, 0, "a client fed every tick never starves");
    assert!(supervisor.validate_clients().is_ok());
    Ok(())
}

#[test]
fn test_restart_while_clients_feed() -> TestResult {
    let (supervisor, _clock) = shared_supervisor(2);
    supervisor.start(150, None)?;

    let feeder = {
        let supervisor = Arc::clone(&supervisor);
        thread::spawn(move || {
            for _ in 0..1000 {
                supervisor.client_feed(0, 10);
                supervisor.client_feed_from_isr(1, 10);
            }
        })
    };
    for _ in 0..50 {
        supervisor.start(150, None)?;
    }
    assert!(feeder.join().is_ok(), "Feeder should not panic");

    assert_eq!(supervisor.device().open_sessions(), 1);
    assert_eq!(supervisor.device().open_count(), 51);
    assert_eq!(supervisor.device().close_count(), 50);
    Ok(())
}

#[test]
fn test_expiry_during_restart_never_blocks() -> TestResult {
    let (supervisor, _clock) = shared_supervisor(2);
    let callback: ExpiryCallback = Arc::new(|| {});
    supervisor.start(150, Some(Arc::clone(&callback)))?;

    let trampoline = {
        let supervisor = Arc::clone(&supervisor);
        thread::spawn(move || {
            let mut fired = 0u32;
            for raw in 0..5000u32 {
                if supervisor.on_expiry(DeviceHandle::from_raw(raw % 64)) {
                    fired += 1;
                }
            }
            fired
        })
    };
    for _ in 0..50 {
        supervisor.start(150, Some(Arc::clone(&callback)))?;
    }

    let fired = trampoline.join().map_err(|panic| format!("trampoline panicked: {panic:?}"))?;
    assert!(fired <= 5000);
    Ok(())
}
