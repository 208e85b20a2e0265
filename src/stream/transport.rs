//! Transport handles and the connectors that open them.
//!
//! The acquisition task asks its [`Connector`] for a fresh handle on every attempt and
//! owns that handle exclusively until it fails. Anything that is `AsyncRead +
//! AsyncWrite` works as a handle: TCP streams, serial ports, or an in-memory
//! `tokio::io::duplex` pipe in tests.

use crate::config::{ProbeConfig, TransportConfig};
use crate::decoder::SampleDecoder;
use crate::error::{ProbeError, ProbeResult};
use crate::stream::codec::WireFormat;
use crate::stream::simulated::{SimulatedConnector, SimulationParams};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, info};

/// Trait alias for a bidirectional byte stream to the instrument.
pub trait TransportIo: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> TransportIo for T {}

/// Type-erased transport handle.
pub type DynTransport = Box<dyn TransportIo>;

/// Opens transport handles for the acquisition task.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a new connection. Called again after every failure.
    async fn connect(&self) -> ProbeResult<DynTransport>;

    /// Frame layout on this transport.
    fn wire_format(&self) -> WireFormat;

    /// Endpoint description for logs.
    fn describe(&self) -> String;
}

/// TCP connection to the instrument's access point.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    host: String,
    port: u16,
}

impl TcpConnector {
    /// Connector for `host:port`.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self) -> ProbeResult<DynTransport> {
        debug!(host = %self.host, port = self.port, "opening TCP connection");
        let stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
        // Commands are tiny; do not let Nagle hold them back.
        stream.set_nodelay(true)?;
        info!(host = %self.host, port = self.port, "TCP connection established");
        Ok(Box::new(stream))
    }

    fn wire_format(&self) -> WireFormat {
        WireFormat::TCP
    }

    fn describe(&self) -> String {
        format!("tcp://{}:{}", self.host, self.port)
    }
}

/// Serial connection (8N1, no flow control).
#[derive(Debug, Clone)]
pub struct SerialConnector {
    device: String,
    baud_rate: u32,
}

impl SerialConnector {
    /// Connector for a serial device such as `/dev/ttyUSB0` or `COM3`.
    #[must_use]
    pub fn new(device: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            device: device.into(),
            baud_rate,
        }
    }
}

#[async_trait]
impl Connector for SerialConnector {
    #[cfg(feature = "serial")]
    async fn connect(&self) -> ProbeResult<DynTransport> {
        use tokio::task::spawn_blocking;
        use tokio_serial::SerialPortBuilderExt;

        let device = self.device.clone();
        let baud_rate = self.baud_rate;

        // Opening a port can block on some platforms.
        let port = spawn_blocking(move || {
            tokio_serial::new(&device, baud_rate)
                .data_bits(tokio_serial::DataBits::Eight)
                .parity(tokio_serial::Parity::None)
                .stop_bits(tokio_serial::StopBits::One)
                .flow_control(tokio_serial::FlowControl::None)
                .open_native_async()
                .map_err(|e| {
                    ProbeError::Transport(format!("Failed to open serial port {device}: {e}"))
                })
        })
        .await
        .map_err(|e| ProbeError::Transport(format!("serial open task failed: {e}")))??;

        info!(device = %self.device, baud_rate, "serial port opened");
        Ok(Box::new(port))
    }

    #[cfg(not(feature = "serial"))]
    async fn connect(&self) -> ProbeResult<DynTransport> {
        Err(ProbeError::SerialFeatureDisabled)
    }

    fn wire_format(&self) -> WireFormat {
        WireFormat::SERIAL
    }

    fn describe(&self) -> String {
        format!("serial://{}@{}", self.device, self.baud_rate)
    }
}

/// Build the connector named by the `[transport]` section.
///
/// Fails at startup when the serial transport is configured but not compiled in.
pub fn connector_from_config(config: &ProbeConfig) -> ProbeResult<Arc<dyn Connector>> {
    match &config.transport {
        TransportConfig::Tcp { host, port } => Ok(Arc::new(TcpConnector::new(host.clone(), *port))),
        TransportConfig::Serial { device, baud_rate } => {
            if cfg!(feature = "serial") {
                Ok(Arc::new(SerialConnector::new(device.clone(), *baud_rate)))
            } else {
                Err(ProbeError::SerialFeatureDisabled)
            }
        }
        TransportConfig::Simulated {
            frequency_hz,
            amplitude_volts,
            noise_volts,
            frame_interval_ms,
        } => Ok(Arc::new(SimulatedConnector::new(
            SimulationParams {
                frequency_hz: *frequency_hz,
                amplitude_volts: *amplitude_volts,
                noise_volts: *noise_volts,
                frame_interval: Duration::from_millis(*frame_interval_ms),
                frame_size: config.acquisition.frame_size,
            },
            SampleDecoder::from_config(&config.decoder),
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn tcp_connector_reaches_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(&[0xAB, 0xCD]).await.unwrap();
        });

        let connector = TcpConnector::new("127.0.0.1", port);
        assert_eq!(connector.wire_format(), WireFormat::TCP);
        let mut transport = connector.connect().await.unwrap();
        let mut buf = [0u8; 2];
        transport.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [0xAB, 0xCD]);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn refused_connection_is_recoverable() {
        // Bind then drop to find a port nobody listens on.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let err = TcpConnector::new("127.0.0.1", port).connect().await.err().unwrap();
        assert!(err.is_recoverable(), "{err}");
    }

    #[test]
    fn serial_config_requires_feature() {
        let mut config = ProbeConfig::default();
        config.transport = TransportConfig::Serial {
            device: "/dev/ttyUSB0".to_string(),
            baud_rate: 115_200,
        };
        let result = connector_from_config(&config);
        if cfg!(feature = "serial") {
            let connector = result.unwrap();
            assert_eq!(connector.wire_format(), WireFormat::SERIAL);
            assert_eq!(connector.describe(), "serial:///dev/ttyUSB0@115200");
        } else {
            assert!(matches!(result, Err(ProbeError::SerialFeatureDisabled)));
        }
    }

    #[test]
    fn default_config_builds_tcp_connector() {
        let connector = connector_from_config(&ProbeConfig::default()).unwrap();
        assert_eq!(connector.describe(), "tcp://192.168.4.1:8080");
    }
}
