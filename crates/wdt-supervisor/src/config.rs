//! Configuration for the supervisor task.

use serde::{Deserialize, Serialize};

use crate::error::{SupervisorError, SupervisorResult};
use crate::supervisor::SupervisorOptions;

/// Supervisor task configuration.
///
/// Missing fields deserialise to their defaults, so a partial JSON document
/// is a valid configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// Seconds to wait before arming the hardware.
    pub delay_s: u32,
    /// Requested hardware timeout in milliseconds.
    ///
    /// Non-positive values fall back to [`TaskConfig::DEFAULT_STARVE_MS`].
    pub starve_ms: i32,
    /// Device or controller instance.
    pub device_id: u32,
    /// Interrupt line for expiry notifications.
    pub interrupt_line: Option<u32>,
    /// Number of client slots.
    pub clients: usize,
    /// Interval between loop jitter reports, in milliseconds.
    pub report_interval_ms: u32,
}

impl TaskConfig {
    /// Timeout used when none is configured.
    pub const DEFAULT_STARVE_MS: i32 = 150;

    /// Create a configuration builder.
    #[must_use]
    pub fn builder() -> TaskConfigBuilder {
        TaskConfigBuilder::default()
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> SupervisorResult<()> {
        if self.clients == 0 {
            return Err(SupervisorError::invalid_configuration(
                "clients must be at least 1",
            ));
        }
        if self.clients > SupervisorOptions::MAX_CLIENTS {
            return Err(SupervisorError::invalid_configuration(format!(
                "clients must be at most {}",
                SupervisorOptions::MAX_CLIENTS
            )));
        }
        if self.report_interval_ms == 0 {
            return Err(SupervisorError::invalid_configuration(
                "report_interval_ms must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Timeout actually requested from the hardware.
    #[must_use]
    pub fn effective_starve_ms(&self) -> i32 {
        if self.starve_ms > 0 {
            self.starve_ms
        } else {
            Self::DEFAULT_STARVE_MS
        }
    }

    /// Supervisor construction options derived from this configuration.
    #[must_use]
    pub fn supervisor_options(&self) -> SupervisorOptions {
        SupervisorOptions {
            device_id: self.device_id,
            interrupt_line: self.interrupt_line,
            clients: self.clients,
        }
    }

    /// Check if `options` is what this configuration would build.
    #[must_use]
    pub fn matches(&self, options: &SupervisorOptions) -> bool {
        self.supervisor_options() == *options
    }
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            delay_s: 0,
            starve_ms: Self::DEFAULT_STARVE_MS,
            device_id: 0,
            interrupt_line: None,
            clients: SupervisorOptions::DEFAULT_CLIENTS,
            report_interval_ms: 1000,
        }
    }
}

/// Builder for `TaskConfig`.
#[derive(Debug, Default)]
pub struct TaskConfigBuilder {
    config: TaskConfig,
}

impl TaskConfigBuilder {
    /// Set the start-up delay in seconds.
    #[must_use]
    pub fn delay_s(mut self, seconds: u32) -> Self {
        self.config.delay_s = seconds;
        self
    }

    /// Set the requested hardware timeout in milliseconds.
    #[must_use]
    pub fn starve_ms(mut self, ms: i32) -> Self {
        self.config.starve_ms = ms;
        self
    }

    /// Set the device instance.
    #[must_use]
    pub fn device_id(mut self, id: u32) -> Self {
        self.config.device_id = id;
        self
    }

    /// Set the expiry interrupt line.
    #[must_use]
    pub fn interrupt_line(mut self, line: u32) -> Self {
        self.config.interrupt_line = Some(line);
        self
    }

    /// Set the number of client slots.
    #[must_use]
    pub fn clients(mut self, count: usize) -> Self {
        self.config.clients = count;
        self
    }

    /// Set the jitter report interval in milliseconds.
    #[must_use]
    pub fn report_interval_ms(mut self, ms: u32) -> Self {
        self.config.report_interval_ms = ms;
        self
    }

    /// Build the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> SupervisorResult<TaskConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
