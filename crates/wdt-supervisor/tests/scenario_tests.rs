//! BDD tests for supervisor scenarios.
//!
//! Feature: hardware watchdog supervision with software clients

#![cfg(test)]

use std::sync::Arc;

use portable_atomic::{AtomicU32, Ordering};
use wdt_supervisor::prelude::*;

type TestResult = Result<(), Box<dyn std::error::Error>>;
type SimSupervisor = Supervisor<SimulatedDevice<ManualClock>, ManualClock>;

fn fixture(clients: usize) -> (SimSupervisor, ManualClock) {
    let clock = ManualClock::starting_at(1000, 1);
    let device = SimulatedDevice::new(clock.clone());
    let options = SupervisorOptions {
        clients,
        ..SupervisorOptions::default()
    };
    (Supervisor::new(device, clock.clone(), options), clock)
}

mod supervision_scenarios {
    use super::*;

    /// Scenario: Hardware never expires while fed with no clients registered
    #[test]
    fn scenario_fed_hardware_never_expires() -> TestResult {
        let (supervisor, clock) = fixture(2);
        supervisor.start(150, None)?;
        let config = supervisor.device().last_config().ok_or("device not configured")?;
        assert!(config.preload <= PreloadSpec::DEFAULT.max_preload);

        for _ in 0..50 {
            clock.advance_ms(100);
            assert!(supervisor.validate_clients().is_ok());
            supervisor.feed();
            assert_eq!(supervisor.device().poll(), None);
        }
        assert_eq!(supervisor.device().expiry_count(), 0);
        assert!(supervisor.is_armed());
        Ok(())
    }

    /// Scenario: A client fed within its gap stays healthy
    #[test]
    fn scenario_client_fed_within_gap_stays_healthy() -> TestResult {
        let (supervisor, clock) = fixture(2);
        supervisor.start(150, None)?;
        let hp_max = clock.ms_to_ticks(500);

        supervisor.client_feed(0, hp_max);
        for _ in 0..10 {
            clock.advance_ms(300);
            assert!(supervisor.validate_clients().is_ok());
            supervisor.client_feed(0, hp_max);
        }
        Ok(())
    }

    /// Scenario: Disabling an overdue client clears it before the next check
    #[test]
    fn scenario_disabled_client_is_never_reported() -> TestResult {
        let (supervisor, clock) = fixture(2);
        supervisor.start(150, None)?;
        let hp_max = clock.ms_to_ticks(100);

        supervisor.client_feed(0, hp_max);
        clock.advance(hp_max + 1);
        assert_eq!(supervisor.validate_clients().map_err(|s| s.id), Err(0));

        supervisor.client_feed(0, 0);
        assert!(supervisor.validate_clients().is_ok());
        assert!(supervisor.validate_and_feed().is_ok());
        assert_eq!(supervisor.client_state(0), Some(SlotState::Inactive));
        Ok(())
    }

    /// Scenario: A stalled client starves the hardware
    #[test]
    fn scenario_stalled_client_withholds_feed() -> TestResult {
        let (supervisor, clock) = fixture(2);
        let supervisor = Arc::new(supervisor);
        let mut task = SupervisorTask::new(Arc::clone(&supervisor), TaskEnv::new(TaskConfig::default()))?;
        task.arm()?;

        supervisor.client_feed(0, clock.ms_to_ticks(500));
        clock.advance_ms(500);
        assert_eq!(task.cycle(), CycleOutcome::Fed);
        let clears = supervisor.device().clear_count();

        clock.advance_ms(1);
        let outcome = task.cycle();
        assert!(matches!(outcome, CycleOutcome::Withheld(s) if s.id == 0 && s.elapsed == 501));
        assert_eq!(supervisor.device().clear_count(), clears);

        let starved = supervisor.validate_clients();
        assert_eq!(starved.map_err(|s| s.id), Err(0));
        Ok(())
    }

    /// Scenario: Out-of-range client ids are ignored
    #[test]
    fn scenario_out_of_range_client_is_ignored() -> TestResult {
        let (supervisor, clock) = fixture(2);
        supervisor.start(150, None)?;

        supervisor.client_feed(5, 100);
        supervisor.client_feed_from_isr(5, 100);
        assert_eq!(supervisor.client_state(5), None);
        assert!(
            (0..supervisor.client_count())
                .all(|id| supervisor.client_state(id) == Some(SlotState::Inactive))
        );

        clock.advance(10_000);
        assert!(supervisor.validate_clients().is_ok());
        Ok(())
    }

    /// Scenario: Callback mode invokes the callback and keeps client state
    #[test]
    fn scenario_callback_mode_expiry() -> TestResult {
        let (supervisor, clock) = fixture(2);
        let fired = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&fired);
        supervisor.start(
            150,
            Some(Arc::new(move || {
                counter.fetch_add(1, Ordering::Relaxed);
            })),
        )?;
        assert_eq!(
            supervisor.device().last_config().map(|c| c.mode),
            Some(ExpiryMode::Callback)
        );
        supervisor.client_feed(1, 1000);
        let before = supervisor.client_state(1);

        clock.advance_ms(200);
        let Some(SimExpiry::Callback(handle)) = supervisor.device().poll() else {
            return Err("expected a callback expiry".into());
        };
        assert!(supervisor.on_expiry(handle));

        assert_eq!(fired.load(Ordering::Relaxed), 1);
        assert_eq!(supervisor.client_state(1), before);
        assert!(supervisor.is_armed());
        Ok(())
    }

    /// Scenario: Reset mode expiry closes the simulated session
    #[test]
    fn scenario_reset_mode_expiry() -> TestResult {
        let (supervisor, clock) = fixture(2);
        supervisor.start(100, None)?;
        clock.advance_ms(200);
        assert_eq!(supervisor.device().poll(), Some(SimExpiry::Reset));
        assert_eq!(supervisor.device().reset_count(), 1);
        Ok(())
    }

    /// Scenario: Restart drops the previous callback and issues a new handle
    #[test]
    fn scenario_restart_invalidates_old_handle() -> TestResult {
        let (supervisor, _clock) = fixture(2);
        let fired = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&fired);
        let callback: ExpiryCallback = Arc::new(move || {
            counter.fetch_add(1, Ordering::Relaxed);
        });

        supervisor.start(150, Some(Arc::clone(&callback)))?;
        let old = supervisor.device().current_handle().ok_or("device not open")?;
        supervisor.start(150, Some(callback))?;
        let new = supervisor.device().current_handle().ok_or("device not open")?;

        assert_ne!(old, new);
        assert!(!supervisor.on_expiry(old));
        assert!(supervisor.on_expiry(new));
        assert_eq!(fired.load(Ordering::Relaxed), 1);
        assert_eq!(supervisor.device().open_sessions(), 1);
        Ok(())
    }

    /// Scenario: Accessors are harmless before the first start
    #[test]
    fn scenario_never_started_supervisor_is_inert() {
        let (supervisor, clock) = fixture(2);
        supervisor.client_feed(0, 1);
        clock.advance(1000);

        assert!(supervisor.validate_and_feed().is_ok());
        assert_eq!(supervisor.starve_ms(), None);
        assert!(!supervisor.on_expiry(DeviceHandle::from_raw(1)));
        assert_eq!(supervisor.device().open_count(), 0);
    }
}
