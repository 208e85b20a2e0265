//! CLI entry point for probe-daq.
//!
//! # Usage
//!
//! Stream measurements from the configured instrument:
//! ```bash
//! probe-daq monitor --config config/probe.toml --interval-ms 200
//! ```
//!
//! Print the merged configuration (defaults, file, and `PROBE_DAQ_*` overrides):
//! ```bash
//! probe-daq check-config
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use probe_daq::config::{ProbeConfig, DEFAULT_CONFIG_PATH};
use probe_daq::logging;
use probe_daq::measurement::{MeasurementKind, Measurements};
use probe_daq::session::ScopeSession;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "probe-daq")]
#[command(about = "Acquisition client for a networked oscilloscope", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Acquire frames and print measurements until interrupted
    Monitor {
        /// Configuration file
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Display refresh interval in milliseconds
        #[arg(long, default_value = "100")]
        interval_ms: u64,

        /// Stop after this many seconds
        #[arg(long)]
        duration_secs: Option<u64>,

        /// Print one JSON object per refresh
        #[arg(long)]
        json: bool,
    },

    /// Validate and print the effective configuration
    CheckConfig {
        /// Configuration file
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
}

#[derive(Serialize)]
struct Readout<'a> {
    state: &'a str,
    frames: u64,
    dropped: u64,
    #[serde(flatten)]
    measurements: Measurements,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Monitor {
            config,
            interval_ms,
            duration_secs,
            json,
        } => monitor(config, interval_ms, duration_secs, json).await,
        Commands::CheckConfig { config } => check_config(config),
    }
}

async fn monitor(
    config_path: PathBuf,
    interval_ms: u64,
    duration_secs: Option<u64>,
    json: bool,
) -> Result<()> {
    let config = ProbeConfig::load_from(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    logging::init_from_config(&config)?;

    let mut session = ScopeSession::start(&config)?;
    let mut refresh = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
    let deadline = duration_secs.map(|s| tokio::time::Instant::now() + Duration::from_secs(s));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
            _ = refresh.tick() => {
                if deadline.is_some_and(|d| tokio::time::Instant::now() >= d) {
                    break;
                }
                if session.drain() > 0 || json {
                    print_readout(&session, json)?;
                }
            }
        }
    }

    let stats = session.stats();
    info!(
        frames = stats.frames_received,
        dropped = stats.frames_dropped,
        reconnects = stats.reconnects,
        "monitor finished"
    );
    session.shutdown().await;
    Ok(())
}

fn print_readout(session: &ScopeSession, json: bool) -> Result<()> {
    let stats = session.stats();
    let readout = Readout {
        state: session.connection_state().label(),
        frames: stats.frames_received,
        dropped: stats.frames_dropped,
        measurements: session.measurements(),
    };

    if json {
        println!("{}", serde_json::to_string(&readout)?);
    } else {
        let fields: Vec<String> = MeasurementKind::ALL
            .iter()
            .map(|kind| {
                format!(
                    "{} {:.4} {}",
                    kind.label(),
                    readout.measurements.get(*kind),
                    kind.unit()
                )
            })
            .collect();
        println!("[{}] {}", readout.state, fields.join(" | "));
    }
    Ok(())
}

fn check_config(config_path: PathBuf) -> Result<()> {
    let config = ProbeConfig::load_from(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}
