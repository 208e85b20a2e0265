//! Layered configuration using Figment.
//!
//! Configuration is merged from, in increasing priority:
//! 1. built-in defaults
//! 2. a TOML file (`config/probe.toml` unless another path is given)
//! 3. environment variables prefixed with `PROBE_DAQ_`, with `__` separating nested keys
//!
//! Every section carries `#[serde(default)]`, so a file only needs the keys it changes.
//!
//! # Example
//! ```no_run
//! use probe_daq::config::ProbeConfig;
//!
//! // PROBE_DAQ_ACQUISITION__FRAME_SIZE=500 would override the file value.
//! let config = ProbeConfig::load()?;
//! println!("frame size: {}", config.acquisition.frame_size);
//! # Ok::<(), probe_daq::error::ProbeError>(())
//! ```

use crate::calibration::{OffsetModel, OutlierFilter};
use crate::decoder::SampleEncoding;
use crate::error::{ProbeError, ProbeResult};
use crate::logging::{self, OutputFormat};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration file read by [`ProbeConfig::load`].
pub const DEFAULT_CONFIG_PATH: &str = "config/probe.toml";

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "PROBE_DAQ_";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Where frames come from
    pub transport: TransportConfig,
    /// Acquisition loop and queue settings
    pub acquisition: AcquisitionConfig,
    /// Raw sample decoding
    pub decoder: DecoderConfig,
    /// Analog front-end calibration
    pub calibration: CalibrationConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log line format
    pub log_format: OutputFormat,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "Probe DAQ".to_string(),
            log_level: "info".to_string(),
            log_format: OutputFormat::default(),
        }
    }
}

/// Transport endpoint, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportConfig {
    /// TCP stream of big-endian frames
    Tcp {
        /// Instrument host name or address
        #[serde(default = "default_tcp_host")]
        host: String,
        /// Instrument port
        #[serde(default = "default_tcp_port")]
        port: u16,
    },
    /// Serial stream of little-endian frames, each preceded by `'S'`
    Serial {
        /// Device path, e.g. `/dev/ttyUSB0` or `COM3`
        device: String,
        /// Baud rate
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
    },
    /// In-process synthetic instrument
    Simulated {
        /// Frequency of the generated sine in Hz
        #[serde(default = "default_sim_frequency")]
        frequency_hz: f64,
        /// Peak amplitude at the decoder output, in volts
        #[serde(default = "default_sim_amplitude")]
        amplitude_volts: f64,
        /// Peak uniform noise added to each sample, in volts
        #[serde(default = "default_sim_noise")]
        noise_volts: f64,
        /// Pause between generated frames
        #[serde(default = "default_sim_interval")]
        frame_interval_ms: u64,
    },
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig::Tcp {
            host: default_tcp_host(),
            port: default_tcp_port(),
        }
    }
}

impl TransportConfig {
    /// Short human-readable endpoint description for logs.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            TransportConfig::Tcp { host, port } => format!("tcp://{host}:{port}"),
            TransportConfig::Serial { device, baud_rate } => {
                format!("serial://{device}@{baud_rate}")
            }
            TransportConfig::Simulated { frequency_hz, .. } => {
                format!("simulated://{frequency_hz}Hz")
            }
        }
    }
}

/// Acquisition loop, queue and timeout settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Samples per frame
    pub frame_size: usize,
    /// Bounded frame queue capacity
    pub queue_capacity: usize,
    /// Bounded outbound command queue capacity
    pub command_queue_capacity: usize,
    /// Pause between reconnect attempts
    pub retry_interval_ms: u64,
    /// Upper bound on one connect attempt
    pub connect_timeout_ms: u64,
    /// How long the producer waits on a full queue before dropping a frame
    pub enqueue_timeout_ms: u64,
    /// Upper bound on joining the acquisition task at shutdown
    pub shutdown_timeout_ms: u64,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            frame_size: 1000,
            queue_capacity: 10,
            command_queue_capacity: 16,
            retry_interval_ms: 2000,
            connect_timeout_ms: 5000,
            enqueue_timeout_ms: 100,
            shutdown_timeout_ms: 1000,
        }
    }
}

impl AcquisitionConfig {
    /// Retry interval as a duration
    #[must_use]
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    /// Connect timeout as a duration
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Enqueue timeout as a duration
    #[must_use]
    pub fn enqueue_timeout(&self) -> Duration {
        Duration::from_millis(self.enqueue_timeout_ms)
    }

    /// Shutdown join timeout as a duration
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// Raw sample decoding settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// ADC reference voltage in volts
    pub reference_voltage: f64,
    /// Wire encoding of each 12-bit code
    pub encoding: SampleEncoding,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            reference_voltage: 1.5,
            encoding: SampleEncoding::default(),
        }
    }
}

/// Analog front-end calibration constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Added before scaling to undo the differential amplifier's level shift
    pub bias: f64,
    /// Multiplier applied after the bias
    pub scale: f64,
    /// Fixed gain of the input stage
    pub base_gain: f64,
    /// Offset-subtraction model
    pub offset: OffsetModel,
    /// Outlier suppression applied last
    pub outlier_filter: OutlierFilter,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            bias: 0.575,
            scale: 0.5,
            base_gain: 16.666,
            offset: OffsetModel::default(),
            outlier_filter: OutlierFilter::default(),
        }
    }
}

fn default_tcp_host() -> String {
    "192.168.4.1".to_string()
}

fn default_tcp_port() -> u16 {
    8080
}

fn default_baud_rate() -> u32 {
    115_200
}

fn default_sim_frequency() -> f64 {
    100_000.0
}

fn default_sim_amplitude() -> f64 {
    0.5
}

fn default_sim_noise() -> f64 {
    0.002
}

fn default_sim_interval() -> u64 {
    10
}

impl ProbeConfig {
    /// Load configuration from [`DEFAULT_CONFIG_PATH`] and the environment.
    pub fn load() -> ProbeResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path and the environment, then validate it.
    ///
    /// A missing file is not an error; defaults and environment overrides still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> ProbeResult<Self> {
        let config: Self = Self::figment(path).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// The merged provider stack, exposed for callers that add their own layers.
    #[must_use]
    pub fn figment<P: AsRef<Path>>(path: P) -> Figment {
        Figment::from(Serialized::defaults(ProbeConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> ProbeResult<()> {
        logging::parse_log_level(&self.application.log_level)?;

        match &self.transport {
            TransportConfig::Tcp { host, port } => {
                if host.trim().is_empty() {
                    return invalid("transport.host must not be empty");
                }
                if *port == 0 {
                    return invalid("transport.port must be non-zero");
                }
            }
            TransportConfig::Serial { device, baud_rate } => {
                if device.trim().is_empty() {
                    return invalid("transport.device must not be empty");
                }
                if *baud_rate == 0 {
                    return invalid("transport.baud_rate must be non-zero");
                }
            }
            TransportConfig::Simulated {
                frequency_hz,
                amplitude_volts,
                noise_volts,
                ..
            } => {
                if !(frequency_hz.is_finite() && *frequency_hz > 0.0) {
                    return invalid("transport.frequency_hz must be positive");
                }
                if !amplitude_volts.is_finite() {
                    return invalid("transport.amplitude_volts must be finite");
                }
                if !(noise_volts.is_finite() && *noise_volts >= 0.0) {
                    return invalid("transport.noise_volts must be non-negative");
                }
            }
        }

        let acq = &self.acquisition;
        if acq.frame_size == 0 {
            return invalid("acquisition.frame_size must be greater than zero");
        }
        if acq.queue_capacity == 0 {
            return invalid("acquisition.queue_capacity must be greater than zero");
        }
        if acq.command_queue_capacity == 0 {
            return invalid("acquisition.command_queue_capacity must be greater than zero");
        }
        if acq.retry_interval_ms == 0 {
            return invalid("acquisition.retry_interval_ms must be greater than zero");
        }
        if acq.connect_timeout_ms == 0 {
            return invalid("acquisition.connect_timeout_ms must be greater than zero");
        }

        let vref = self.decoder.reference_voltage;
        if !(vref.is_finite() && vref > 0.0) {
            return invalid("decoder.reference_voltage must be positive");
        }

        let cal = &self.calibration;
        if ![cal.bias, cal.scale, cal.base_gain]
            .iter()
            .all(|v| v.is_finite())
        {
            return invalid("calibration constants must be finite");
        }
        if let Some(msg) = cal.offset.validate() {
            return invalid(&msg);
        }
        if let Some(msg) = cal.outlier_filter.validate() {
            return invalid(&msg);
        }

        Ok(())
    }
}

fn invalid(msg: &str) -> ProbeResult<()> {
    Err(ProbeError::Configuration(msg.to_string()))
}
