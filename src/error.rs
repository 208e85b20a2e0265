//! Custom error types for the acquisition client.
//!
//! This module defines the primary error type, `ProbeError`, shared by every layer of
//! the crate. Using the `thiserror` crate, it gives a single place to describe what
//! can go wrong, from configuration loading to a dropped instrument connection.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: Wraps errors from `figment` while merging and extracting the
//!   layered configuration (bad TOML, wrong types in environment overrides).
//! - **`Configuration`**: Semantic errors in a configuration that parsed fine, such as
//!   a zero frame size or an empty TCP host. Fatal at startup.
//! - **`Io`** / **`Transport`** / **`ConnectTimeout`**: Connection and read/write
//!   failures. Recoverable; the acquisition task answers them by reconnecting.
//! - **`Framing`**: A short or partial frame. The frame is discarded and the loop
//!   continues.
//! - **`InvalidSetting`** / **`InvalidLabel`**: Rejected control-surface input.
//!
//! There is no decode error: every 16-bit code decodes after masking.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type ProbeResult<T> = std::result::Result<T, ProbeError>;

#[allow(missing_docs)]
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Configuration error: {0}")]
    Config(Box<figment::Error>),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Connection attempt timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("Framing error: expected {expected} bytes, received {received}")]
    Framing { expected: usize, received: usize },

    #[error("Serial support not enabled. Rebuild with --features serial")]
    SerialFeatureDisabled,

    #[error("Invalid setting: {0}")]
    InvalidSetting(String),

    #[error("Unrecognised division label '{0}'")]
    InvalidLabel(String),
}

impl From<figment::Error> for ProbeError {
    fn from(err: figment::Error) -> Self {
        ProbeError::Config(Box::new(err))
    }
}

impl ProbeError {
    /// Whether the acquisition loop may retry after this error.
    ///
    /// Transport-level failures are answered by the reconnect loop. Configuration and
    /// input errors are not: retrying cannot change their outcome.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            ProbeError::Io(_)
            | ProbeError::Transport(_)
            | ProbeError::ConnectTimeout(_)
            | ProbeError::Framing { .. } => true,
            ProbeError::Config(_)
            | ProbeError::Configuration(_)
            | ProbeError::SerialFeatureDisabled
            | ProbeError::InvalidSetting(_)
            | ProbeError::InvalidLabel(_) => false,
        }
    }
}
