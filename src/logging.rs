//! Log output for the client and the `probe-daq` binary.
//!
//! `RUST_LOG` overrides the configured level. When the process already has a global
//! subscriber, as under a test harness or inside an embedding application, [`init`]
//! keeps it and returns `Ok`.
//!
//! ```no_run
//! use probe_daq::{config::ProbeConfig, logging};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! logging::init_from_config(&ProbeConfig::load()?)?;
//! # Ok(())
//! # }
//! ```

use crate::config::ProbeConfig;
use crate::error::{ProbeError, ProbeResult};
use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Multi-line, colored
    #[default]
    Pretty,
    /// One line per event, no colors
    Compact,
    /// One JSON object per event
    Json,
}

/// What [`init`] installs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TracingConfig {
    /// Maximum level when `RUST_LOG` is unset
    pub level: Level,
    /// Line format
    pub format: OutputFormat,
}

impl TracingConfig {
    /// Read the `[application]` log settings.
    pub fn from_probe_config(config: &ProbeConfig) -> ProbeResult<Self> {
        Ok(Self {
            level: parse_log_level(&config.application.log_level)?,
            format: config.application.log_format,
        })
    }
}

/// Install the subscriber described by the `[application]` section.
pub fn init_from_config(config: &ProbeConfig) -> ProbeResult<()> {
    init(TracingConfig::from_probe_config(config)?)
}

/// Install a global subscriber unless one is already set.
pub fn init(config: TracingConfig) -> ProbeResult<()> {
    if tracing::dispatcher::has_been_set() {
        tracing::debug!("global subscriber already installed; keeping it");
        return Ok(());
    }

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(config.level).into())
        .from_env_lossy();
    let output = match config.format {
        OutputFormat::Pretty => fmt::layer().pretty().boxed(),
        OutputFormat::Compact => fmt::layer().compact().with_ansi(false).boxed(),
        OutputFormat::Json => fmt::layer().json().with_current_span(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(output)
        .try_init()
        .map_err(|e| ProbeError::Configuration(format!("cannot install log subscriber: {e}")))
}

/// Case-insensitive level name.
pub(crate) fn parse_log_level(name: &str) -> ProbeResult<Level> {
    const LEVELS: [Level; 5] = [Level::TRACE, Level::DEBUG, Level::INFO, Level::WARN, Level::ERROR];
    LEVELS
        .into_iter()
        .find(|level| level.as_str().eq_ignore_ascii_case(name.trim()))
        .ok_or_else(|| {
            ProbeError::Configuration(format!(
                "Invalid log level '{name}'. Must be one of: trace, debug, info, warn, error"
            ))
        })
}
