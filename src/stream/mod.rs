//! Instrument link: transports, wire framing, and the reconnecting acquisition client.

pub mod client;
pub mod codec;
pub mod simulated;
pub mod transport;

pub use client::{ConnectionState, StreamClient, StreamStats};
pub use codec::{CommandCodec, FrameCodec, WireFormat};
pub use simulated::{SimulatedConnector, SimulationParams};
pub use transport::{connector_from_config, Connector, DynTransport, TcpConnector};
