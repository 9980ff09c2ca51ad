//! `switchyard` – sensor-fusion simulation on the Switchyard broker.
//!
//! 1. Loads the TOML config given as the first argument, or defaults.
//! 2. Spawns fusion workers, sensors and the clock on one shared broker.
//! 3. Intercepts **Ctrl-C** to broadcast `Crashed { source: "operator" }`
//!    so every worker stops gracefully.
//! 4. Prints the run statistics as JSON once all workers are joined.

mod config;
mod protocol;
mod simulation;
mod stats;
mod workers;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use colored::Colorize;
use switchyard_broker::MessageBroker;
use switchyard_runtime::{WorkerError, telemetry};
use thiserror::Error;
use tracing::warn;

use crate::config::ConfigError;
use crate::protocol::{SimBroadcast, SimProtocol};
use crate::stats::Statistics;

#[derive(Debug, Error)]
enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Worker(#[from] WorkerError),

    #[error("Failed to install Ctrl-C handler: {0}")]
    Signal(#[from] ctrlc::Error),

    #[error("Failed to render report: {0}")]
    Report(#[from] serde_json::Error),
}

fn main() -> ExitCode {
    let _guard = telemetry::init_tracing("switchyard");

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), SimError> {
    let config = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => config::load_from(&path)?,
        None => config::from_env()?,
    };
    print_banner(&config);

    let broker = Arc::new(MessageBroker::<SimProtocol>::new());
    let stats = Arc::new(Statistics::default());
    let broker_ctrlc = Arc::clone(&broker);
    let stats_ctrlc = Arc::clone(&stats);
    ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping all workers …".yellow().bold());
        // Recorded before broadcasting so a clock that has not subscribed
        // yet still sees the stop.
        stats_ctrlc.record_crash("operator", "interrupted");
        let reached = broker_ctrlc.send_broadcast(SimBroadcast::Crashed {
            source: "operator".to_string(),
            reason: "interrupted".to_string(),
        });
        if reached == 0 {
            warn!("No worker was listening for the stop request");
        }
    })?;

    let report = simulation::run(&config, broker, stats)?;

    match &report.crashed {
        Some(crash) => println!(
            "{} {} ({})",
            "✗ Run stopped early by".red().bold(),
            crash.source.bold(),
            crash.reason
        ),
        None => println!("{}", "✓ Run completed".green().bold()),
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn print_banner(config: &config::SimConfig) {
    println!("{}", "Switchyard – sensor fusion simulation".cyan().bold());
    println!(
        "  {} ticks × {} ms, {} sensor(s), {} fusion worker(s)",
        config.duration,
        config.tick_ms,
        config.sensors.len(),
        config.fusion_workers
    );
}
