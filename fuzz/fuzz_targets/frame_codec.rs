//! Fuzz target for the inbound frame codec.
//!
//! Tests:
//! - Arbitrary bytes split into arbitrary read chunks
//! - Both wire formats, including serial resynchronisation
//! - Every emitted frame has exactly the configured length

#![no_main]

use arbitrary::Arbitrary;
use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use probe_daq::stream::{FrameCodec, WireFormat};
use tokio_util::codec::Decoder;

#[derive(Debug, Arbitrary)]
struct CodecInput {
    /// Samples per frame, kept small so frames complete often
    frame_size: u8,
    /// Use the serial layout instead of TCP
    serial: bool,
    /// Read chunks as delivered by the transport
    chunks: Vec<Vec<u8>>,
}

fuzz_target!(|input: CodecInput| {
    let frame_size = usize::from(input.frame_size).max(1);
    let format = if input.serial {
        WireFormat::SERIAL
    } else {
        WireFormat::TCP
    };
    let mut codec = FrameCodec::new(frame_size, format);
    let mut buf = BytesMut::new();

    for chunk in &input.chunks {
        buf.extend_from_slice(chunk);
        while let Ok(Some(frame)) = codec.decode(&mut buf) {
            assert_eq!(frame.len(), frame_size);
        }
        assert!(buf.len() < codec.frame_len() || buf.is_empty());
    }

    match codec.decode_eof(&mut buf) {
        Ok(Some(frame)) => assert_eq!(frame.len(), frame_size),
        Ok(None) | Err(_) => {}
    }
});
