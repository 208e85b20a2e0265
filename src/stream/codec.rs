//! Byte framing for the instrument link.
//!
//! Inbound, a frame is `frame_size` back-to-back 16-bit codes. TCP sends them
//! big-endian with no delimiter. Serial sends them little-endian behind a single `'S'`
//! start byte, which lets the reader resynchronise after line noise. Outbound commands
//! are the fixed six-byte layout from [`crate::command`].
//!
//! Both codecs plug into `tokio_util::codec::{FramedRead, FramedWrite}`, which keeps the
//! partial-frame buffer outside the read future. Dropping a pending read (for example
//! when cancellation wins a `select!`) never loses bytes.

use crate::command::{Command, COMMAND_LEN};
use crate::error::ProbeError;
use crate::frame::RawFrame;
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, warn};

/// Start byte of each serial frame.
pub const SERIAL_START_MARKER: u8 = b'S';

/// Byte order of each 16-bit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// Most significant byte first
    BigEndian,
    /// Least significant byte first
    LittleEndian,
}

/// How frames are laid out on a particular transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireFormat {
    /// Byte order of each code
    pub byte_order: ByteOrder,
    /// Optional byte preceding every frame
    pub start_marker: Option<u8>,
}

impl WireFormat {
    /// Network variant.
    pub const TCP: WireFormat = WireFormat {
        byte_order: ByteOrder::BigEndian,
        start_marker: None,
    };

    /// Serial variant.
    pub const SERIAL: WireFormat = WireFormat {
        byte_order: ByteOrder::LittleEndian,
        start_marker: Some(SERIAL_START_MARKER),
    };
}

/// Splits the inbound byte stream into [`RawFrame`]s.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    frame_size: usize,
    format: WireFormat,
    discarded: u64,
}

impl FrameCodec {
    /// Codec for frames of `frame_size` samples.
    #[must_use]
    pub fn new(frame_size: usize, format: WireFormat) -> Self {
        Self {
            frame_size,
            format,
            discarded: 0,
        }
    }

    /// Bytes of sample payload per frame.
    #[must_use]
    pub fn payload_len(&self) -> usize {
        self.frame_size * 2
    }

    /// Bytes per frame on the wire, including any start marker.
    #[must_use]
    pub fn frame_len(&self) -> usize {
        self.payload_len() + usize::from(self.format.start_marker.is_some())
    }

    /// Bytes skipped while hunting for a start marker.
    #[must_use]
    pub fn discarded_bytes(&self) -> u64 {
        self.discarded
    }

    fn skip_to_marker(&mut self, src: &mut BytesMut, marker: u8) -> bool {
        match src.iter().position(|&b| b == marker) {
            Some(0) => true,
            Some(n) => {
                debug!(skipped = n, "resynchronising on frame start marker");
                self.discarded += n as u64;
                src.advance(n);
                true
            }
            None => {
                self.discarded += src.len() as u64;
                src.clear();
                false
            }
        }
    }
}

impl Decoder for FrameCodec {
    type Item = RawFrame;
    type Error = ProbeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<RawFrame>, ProbeError> {
        if let Some(marker) = self.format.start_marker {
            if !self.skip_to_marker(src, marker) {
                return Ok(None);
            }
        }

        let needed = self.frame_len();
        if src.len() < needed {
            src.reserve(needed - src.len());
            return Ok(None);
        }

        if self.format.start_marker.is_some() {
            src.advance(1);
        }
        let payload = src.split_to(self.payload_len());
        let codes = payload
            .chunks_exact(2)
            .map(|pair| match self.format.byte_order {
                ByteOrder::BigEndian => u16::from_be_bytes([pair[0], pair[1]]),
                ByteOrder::LittleEndian => u16::from_le_bytes([pair[0], pair[1]]),
            })
            .collect();

        Ok(Some(RawFrame::new(codes)))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<RawFrame>, ProbeError> {
        if let Some(frame) = self.decode(buf)? {
            return Ok(Some(frame));
        }
        if buf.is_empty() {
            return Ok(None);
        }
        let received = buf.len();
        buf.clear();
        warn!(
            expected = self.frame_len(),
            received, "stream ended inside a frame; discarding partial frame"
        );
        Err(ProbeError::Framing {
            expected: self.frame_len(),
            received,
        })
    }
}

/// Six-byte command framing, usable in both directions.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandCodec;

impl Encoder<Command> for CommandCodec {
    type Error = ProbeError;

    fn encode(&mut self, command: Command, dst: &mut BytesMut) -> Result<(), ProbeError> {
        dst.reserve(COMMAND_LEN);
        dst.put_slice(&command.to_bytes());
        Ok(())
    }
}

impl Decoder for CommandCodec {
    type Item = Command;
    type Error = ProbeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Command>, ProbeError> {
        while src.len() >= COMMAND_LEN {
            let mut bytes = [0u8; COMMAND_LEN];
            src.copy_to_slice(&mut bytes);
            match Command::from_bytes(&bytes) {
                Some(command) => return Ok(Some(command)),
                None => warn!(?bytes, "ignoring command with unknown opcode"),
            }
        }
        Ok(None)
    }
}
