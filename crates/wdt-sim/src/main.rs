//! wdt-sim - host simulator for the watchdog supervisor
//!
//! Runs the supervisor task against a simulated hardware watchdog with
//! configurable client feeders, and reports whether the hardware stayed fed.

#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]

mod args;
mod run;

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::args::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("wdt_sim={log_level},wdt_supervisor={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = cli.task_config()?;
    tracing::info!(
        starve_ms = config.effective_starve_ms(),
        delay_s = config.delay_s,
        clients = config.clients,
        nmi = cli.nmi,
        "Starting simulation"
    );

    let summary = run::simulate(
        config,
        &cli.clients,
        cli.nmi,
        Duration::from_millis(cli.duration_ms),
    )?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{summary}");
    }
    Ok(())
}
