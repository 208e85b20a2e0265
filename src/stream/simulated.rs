//! Synthetic instrument for running the full pipeline without hardware.
//!
//! Each connection spawns a task that plays the instrument's side of an in-memory
//! duplex pipe: it emits big-endian frames of a noisy sine, encoded with the same
//! [`SampleDecoder`] settings the consumer decodes with, and reads timebase commands
//! so the generated sample spacing follows the consumer's time axis.

use crate::command::Opcode;
use crate::decoder::SampleDecoder;
use crate::error::ProbeResult;
use crate::settings::{DEFAULT_TIMEBASE_DIV_INDEX, HORIZONTAL_DIVISIONS, TIME_PER_DIV};
use crate::stream::codec::{CommandCodec, WireFormat};
use crate::stream::transport::{Connector, DynTransport};
use async_trait::async_trait;
use futures::StreamExt;
use rand::Rng;
use std::f64::consts::TAU;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::codec::FramedRead;
use tracing::{debug, trace};

const PIPE_CAPACITY: usize = 64 * 1024;

/// Microseconds per division assumed for a timebase prescaler code.
///
/// Prescaler 1 covers 1, 2 and 5 µs/div; the generator uses 5.
fn micros_per_div(prescaler: u32) -> f64 {
    f64::from(prescaler.max(1)) * 5.0
}

/// Shape of the generated signal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationParams {
    /// Sine frequency in Hz
    pub frequency_hz: f64,
    /// Peak amplitude at the decoder output
    pub amplitude_volts: f64,
    /// Peak uniform noise
    pub noise_volts: f64,
    /// Pause between frames
    pub frame_interval: Duration,
    /// Samples per frame
    pub frame_size: usize,
}

/// Connector that produces a fresh simulated instrument per connection.
#[derive(Debug, Clone)]
pub struct SimulatedConnector {
    params: SimulationParams,
    decoder: SampleDecoder,
}

impl SimulatedConnector {
    /// Simulated instrument encoding samples for `decoder`.
    #[must_use]
    pub fn new(params: SimulationParams, decoder: SampleDecoder) -> Self {
        Self { params, decoder }
    }
}

#[async_trait]
impl Connector for SimulatedConnector {
    async fn connect(&self) -> ProbeResult<DynTransport> {
        let (client_end, instrument_end) = tokio::io::duplex(PIPE_CAPACITY);
        let instrument = SimulatedInstrument::new(self.params, self.decoder);
        tokio::spawn(instrument.run(instrument_end));
        debug!(frequency_hz = self.params.frequency_hz, "simulated instrument attached");
        Ok(Box::new(client_end))
    }

    fn wire_format(&self) -> WireFormat {
        WireFormat::TCP
    }

    fn describe(&self) -> String {
        format!("simulated://{}Hz", self.params.frequency_hz)
    }
}

struct SimulatedInstrument {
    params: SimulationParams,
    decoder: SampleDecoder,
    phase: f64,
    micros_per_div: f64,
}

impl SimulatedInstrument {
    fn new(params: SimulationParams, decoder: SampleDecoder) -> Self {
        Self {
            params,
            decoder,
            phase: 0.0,
            micros_per_div: f64::from(TIME_PER_DIV[DEFAULT_TIMEBASE_DIV_INDEX].1),
        }
    }

    async fn run(mut self, pipe: tokio::io::DuplexStream) {
        let (reader, mut writer) = tokio::io::split(pipe);
        let mut commands = FramedRead::new(reader, CommandCodec);
        let mut ticker = tokio::time::interval(self.params.frame_interval.max(Duration::from_millis(1)));

        loop {
            tokio::select! {
                command = commands.next() => match command {
                    Some(Ok(command)) => {
                        debug!(opcode = ?command.opcode, value = command.value, "simulated instrument received command");
                        if command.opcode == Opcode::TimebaseDiv {
                            self.micros_per_div = micros_per_div(command.value);
                        }
                    }
                    // Client side closed.
                    Some(Err(_)) | None => break,
                },
                _ = ticker.tick() => {
                    if self.write_frame(&mut writer).await.is_err() {
                        break;
                    }
                }
            }
        }
        trace!("simulated instrument stopped");
    }

    async fn write_frame<W: AsyncWrite + Unpin>(&mut self, writer: &mut W) -> std::io::Result<()> {
        let n = self.params.frame_size;
        let span = self.micros_per_div * 1e-6 * f64::from(HORIZONTAL_DIVISIONS);
        let dt = if n > 1 { span / (n - 1) as f64 } else { span };
        let step = TAU * self.params.frequency_hz * dt;

        let bytes = {
            // ThreadRng is not Send; keep it out of the await below.
            let mut rng = rand::thread_rng();
            let mut bytes = Vec::with_capacity(n * 2);
            for i in 0..n {
                let noise = if self.params.noise_volts > 0.0 {
                    rng.gen_range(-self.params.noise_volts..=self.params.noise_volts)
                } else {
                    0.0
                };
                let volts =
                    self.params.amplitude_volts * (self.phase + step * i as f64).sin() + noise;
                bytes.extend_from_slice(&self.decoder.encode_volts(volts).to_be_bytes());
            }
            bytes
        };
        self.phase = (self.phase + step * n as f64) % TAU;

        writer.write_all(&bytes).await?;
        writer.flush().await
    }
}
