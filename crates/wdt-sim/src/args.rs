//! Command-line arguments and configuration loading.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use wdt_supervisor::{SupervisorOptions, TaskConfig};

#[derive(Parser, Debug)]
#[command(name = "wdt-sim")]
#[command(about = "Run the watchdog supervisor against a simulated device")]
#[command(version)]
#[command(long_about = "
wdt-sim arms a simulated hardware watchdog, starts the supervisor task and
one feeder thread per --client, then reports how the supervisor behaved.

A client given a STALL_AFTER_MS stops feeding after that many milliseconds;
the supervisor then withholds the hardware feed and the simulated device
expires, either resetting or raising the expiry callback with --nmi.
")]
pub struct Cli {
    /// JSON task configuration file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Requested hardware timeout in milliseconds
    #[arg(long, value_name = "MS", allow_negative_numbers = true)]
    pub starve_ms: Option<i32>,

    /// Seconds to wait before arming the hardware
    #[arg(long, value_name = "SECONDS")]
    pub delay: Option<u32>,

    /// How long to run before requesting quit
    #[arg(long, value_name = "MS", default_value_t = 3000)]
    pub duration_ms: u64,

    /// Client feeder, may be repeated
    #[arg(
        long = "client",
        value_name = "ID:HP_MS:PERIOD_MS[:STALL_AFTER_MS]",
        value_parser = parse_client
    )]
    pub clients: Vec<ClientSpec>,

    /// Raise the expiry callback instead of resetting
    #[arg(long)]
    pub nmi: bool,

    /// Print the summary as JSON
    #[arg(long)]
    pub json: bool,

    /// Verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// One simulated client feeder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientSpec {
    pub id: usize,
    pub hp_ms: u32,
    pub period_ms: u64,
    pub stall_after_ms: Option<u64>,
}

fn parse_field<T>(value: &str, name: &str) -> Result<T, String>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|err| format!("invalid {name} '{value}': {err}"))
}

/// Parse `ID:HP_MS:PERIOD_MS[:STALL_AFTER_MS]`.
pub fn parse_client(value: &str) -> Result<ClientSpec, String> {
    let parts: Vec<&str> = value.split(':').collect();
    let (id, hp, period, stall) = match parts.as_slice() {
        [id, hp, period] => (*id, *hp, *period, None),
        [id, hp, period, stall] => (*id, *hp, *period, Some(*stall)),
        _ => {
            return Err(format!(
                "expected ID:HP_MS:PERIOD_MS[:STALL_AFTER_MS], got '{value}'"
            ));
        }
    };

    let spec = ClientSpec {
        id: parse_field(id, "client id")?,
        hp_ms: parse_field(hp, "HP_MS")?,
        period_ms: parse_field(period, "PERIOD_MS")?,
        stall_after_ms: stall.map(|s| parse_field(s, "STALL_AFTER_MS")).transpose()?,
    };
    if spec.id >= SupervisorOptions::MAX_CLIENTS {
        return Err(format!(
            "client id must be below {}",
            SupervisorOptions::MAX_CLIENTS
        ));
    }
    if spec.hp_ms == 0 {
        return Err("HP_MS must be greater than 0".to_owned());
    }
    if spec.period_ms == 0 {
        return Err("PERIOD_MS must be greater than 0".to_owned());
    }
    Ok(spec)
}

fn read_config(path: &Path) -> Result<TaskConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse config file {}", path.display()))
}

impl Cli {
    /// Task configuration: the config file if any, overridden by flags.
    ///
    /// The client table grows to fit the largest `--client` id.
    pub fn task_config(&self) -> Result<TaskConfig> {
        let mut config = match &self.config {
            Some(path) => read_config(path)?,
            None => TaskConfig::default(),
        };
        if let Some(starve_ms) = self.starve_ms {
            config.starve_ms = starve_ms;
        }
        if let Some(delay) = self.delay {
            config.delay_s = delay;
        }
        if let Some(max_id) = self.clients.iter().map(|c| c.id).max() {
            config.clients = config.clients.max(max_id.saturating_add(1));
        }
        config.validate().context("Invalid task configuration")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn parse_client_without_stall() -> TestResult {
        let spec = parse_client("1:500:300")?;
        assert_eq!(
            spec,
            ClientSpec {
                id: 1,
                hp_ms: 500,
                period_ms: 300,
                stall_after_ms: None
            }
        );
        Ok(())
    }

    #[test]
    fn parse_client_with_stall() -> TestResult {
        let spec = parse_client("0:200:100:1500")?;
        assert_eq!(spec.stall_after_ms, Some(1500));
        Ok(())
    }

    #[test]
    fn parse_client_rejects_bad_input() {
        assert!(parse_client("0:200").is_err());
        assert!(parse_client("0:200:100:5:6").is_err());
        assert!(parse_client("x:200:100").is_err());
        assert!(parse_client("0:0:100").is_err());
        assert!(parse_client("0:200:0").is_err());
    }

    #[test]
    fn parse_client_rejects_ids_beyond_table() -> TestResult {
        let last = SupervisorOptions::MAX_CLIENTS - 1;
        assert_eq!(parse_client(&format!("{last}:200:100"))?.id, last);
        assert!(parse_client(&format!("{}:200:100", SupervisorOptions::MAX_CLIENTS)).is_err());
        assert!(parse_client("4000000000:200:100").is_err());
        assert!(Cli::try_parse_from(["wdt-sim", "--client", "4000000000:200:100"]).is_err());
        Ok(())
    }

    #[test]
    fn oversized_config_file_is_rejected() -> TestResult {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(file, r#"{{ "clients": 18446744073709551615 }}"#)?;

        let path = file.path().to_string_lossy().into_owned();
        let cli = Cli::try_parse_from(["wdt-sim", "--config", path.as_str()])?;
        assert!(cli.task_config().is_err());
        Ok(())
    }

    #[test]
    fn parse_cli_flags() -> TestResult {
        let cli = Cli::try_parse_from([
            "wdt-sim",
            "--starve-ms",
            "120",
            "--client",
            "0:500:300",
            "--client",
            "3:400:100:1000",
            "--nmi",
            "-vv",
        ])?;
        assert_eq!(cli.starve_ms, Some(120));
        assert_eq!(cli.clients.len(), 2);
        assert!(cli.nmi);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.duration_ms, 3000);

        let config = cli.task_config()?;
        assert_eq!(config.starve_ms, 120);
        assert_eq!(config.clients, 4);
        Ok(())
    }

    #[test]
    fn config_file_is_overridden_by_flags() -> TestResult {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(file, r#"{{ "starve_ms": 80, "delay_s": 2, "clients": 3 }}"#)?;

        let path = file.path().to_string_lossy().into_owned();
        let cli = Cli::try_parse_from(["wdt-sim", "--config", path.as_str(), "--delay", "0"])?;
        let config = cli.task_config()?;
        assert_eq!(config.starve_ms, 80);
        assert_eq!(config.delay_s, 0);
        assert_eq!(config.clients, 3);
        Ok(())
    }

    #[test]
    fn missing_config_file_is_an_error() -> TestResult {
        let cli = Cli::try_parse_from(["wdt-sim", "--config", "/nonexistent/wdt.json"])?;
        assert!(cli.task_config().is_err());
        Ok(())
    }
}
