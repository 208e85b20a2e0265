//! # Probe DAQ Core Library
//!
//! Client-side acquisition for a small networked oscilloscope. The instrument streams
//! fixed-size frames of 12-bit ADC codes over TCP or a serial link and accepts short
//! binary commands that change its vertical and horizontal settings. This crate turns
//! those frames into calibrated voltage traces with measurements and cursor readouts,
//! keeping the link alive across instrument resets.
//!
//! ## Crate Structure
//!
//! - **`stream`**: Transports, byte framing, and the reconnecting [`StreamClient`] with
//!   its bounded frame queue.
//! - **`decoder`**: Bit-level conversion from wire codes to sample voltages.
//! - **`calibration`**: The analog front-end correction chain applied to each frame.
//! - **`measurement`**: Vpp, extrema, mean, and frequency of a calibrated frame.
//! - **`command`**: Six-byte command encoding and repeat suppression.
//! - **`cursor`**: Two draggable measurement cursors.
//! - **`settings`**: Division tables and the current control state.
//! - **`session`**: [`ScopeSession`], the consumer that ties everything together.
//! - **`config`**, **`logging`**, **`error`**: Layered configuration, tracing setup, and
//!   the crate error type.
//!
//! ## Example
//!
//! ```no_run
//! use probe_daq::{config::ProbeConfig, session::ScopeSession};
//!
//! # async fn run() -> probe_daq::error::ProbeResult<()> {
//! let config = ProbeConfig::load()?;
//! let mut session = ScopeSession::start(&config)?;
//! session.on_frame_ready(|frame| println!("{} samples", frame.len()));
//! loop {
//!     session.tick();
//!     tokio::time::sleep(std::time::Duration::from_millis(50)).await;
//! #   break;
//! }
//! session.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod calibration;
pub mod command;
pub mod config;
pub mod cursor;
pub mod decoder;
pub mod error;
pub mod frame;
pub mod logging;
pub mod measurement;
pub mod session;
pub mod settings;
pub mod stream;

pub use error::{ProbeError, ProbeResult};
pub use session::ScopeSession;
pub use stream::StreamClient;
