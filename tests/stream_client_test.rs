//! Integration tests for the acquisition client
//!
//! The instrument side of each connection is an in-memory duplex pipe handed to the
//! client through a scripted connector, so tests can feed bytes, read commands, and
//! break the link at will.

use async_trait::async_trait;
use probe_daq::command::Command;
use probe_daq::config::AcquisitionConfig;
use probe_daq::error::{ProbeError, ProbeResult};
use probe_daq::stream::{ConnectionState, Connector, DynTransport, StreamClient, WireFormat};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::{mpsc, Mutex};
use tokio::time::{sleep, timeout, Duration, Instant};

const FRAME_SIZE: usize = 4;

/// Hands out one pre-arranged pipe per connect call and waits when none is queued.
struct ScriptedConnector {
    pipes: Mutex<mpsc::UnboundedReceiver<DuplexStream>>,
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self) -> ProbeResult<DynTransport> {
        match self.pipes.lock().await.recv().await {
            Some(pipe) => Ok(Box::new(pipe)),
            None => Err(ProbeError::Transport("no more scripted connections".into())),
        }
    }

    fn wire_format(&self) -> WireFormat {
        WireFormat::TCP
    }

    fn describe(&self) -> String {
        "scripted://test".to_string()
    }
}

/// Test-side handle for queueing connections.
struct Instrument {
    pipes: mpsc::UnboundedSender<DuplexStream>,
}

impl Instrument {
    /// Queue one connection and return the instrument's end of it.
    fn accept(&self) -> DuplexStream {
        let (client_end, instrument_end) = tokio::io::duplex(64 * 1024);
        self.pipes.send(client_end).unwrap();
        instrument_end
    }
}

fn scripted() -> (Arc<dyn Connector>, Instrument) {
    let (tx, rx) = mpsc::unbounded_channel();
    let connector = ScriptedConnector {
        pipes: Mutex::new(rx),
    };
    (Arc::new(connector), Instrument { pipes: tx })
}

fn test_config() -> AcquisitionConfig {
    AcquisitionConfig {
        frame_size: FRAME_SIZE,
        queue_capacity: 10,
        command_queue_capacity: 4,
        retry_interval_ms: 20,
        connect_timeout_ms: 5_000,
        enqueue_timeout_ms: 10,
        shutdown_timeout_ms: 500,
    }
}

/// One big-endian frame with every sample set to `code`.
fn frame_bytes(code: u16) -> Vec<u8> {
    (0..FRAME_SIZE).flat_map(|_| code.to_be_bytes()).collect()
}

async fn wait_for_state(client: &StreamClient, target: ConnectionState) {
    let mut rx = client.watch_state();
    timeout(Duration::from_secs(2), rx.wait_for(|s| *s == target))
        .await
        .expect("timed out waiting for state")
        .expect("state channel closed");
}

async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn frames_arrive_in_order() {
    let (connector, instrument) = scripted();
    let mut pipe = instrument.accept();
    let mut client = tokio_test::assert_ok!(StreamClient::spawn(connector, &test_config()));
    wait_for_state(&client, ConnectionState::Connected).await;

    for code in [0x0101u16, 0x0202, 0x0303] {
        pipe.write_all(&frame_bytes(code)).await.unwrap();
    }

    for code in [0x0101u16, 0x0202, 0x0303] {
        let frame = timeout(Duration::from_secs(2), client.next_frame())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame.codes(), &[code; FRAME_SIZE]);
    }
    assert!(client.try_next_frame().is_none());
    assert_eq!(client.stats().frames_received, 3);

    client.shutdown().await;
}

#[tokio::test]
async fn full_queue_drops_newest_frames() {
    let (connector, instrument) = scripted();
    let mut pipe = instrument.accept();
    let mut client = StreamClient::spawn(connector, &test_config()).unwrap();
    wait_for_state(&client, ConnectionState::Connected).await;

    // Nobody consumes while 25 frames arrive.
    let burst: Vec<u8> = (0..25u16).flat_map(frame_bytes).collect();
    pipe.write_all(&burst).await.unwrap();

    wait_until("15 dropped frames", || client.stats().frames_dropped == 15).await;
    let stats = client.stats();
    assert_eq!(stats.frames_received, 25);
    assert_eq!(client.queued_frames(), 10);

    for code in 0..10u16 {
        let frame = client.try_next_frame().expect("queued frame");
        assert_eq!(frame.codes()[0], code, "queue must stay FIFO");
    }
    assert!(client.try_next_frame().is_none());

    client.shutdown().await;
}

#[tokio::test]
async fn reconnects_after_link_failure_without_losing_frames() {
    let (connector, instrument) = scripted();
    let mut first = instrument.accept();
    let mut client = StreamClient::spawn(connector, &test_config()).unwrap();
    wait_for_state(&client, ConnectionState::Connected).await;
    let mut events = client.subscribe_state_changes();

    first.write_all(&frame_bytes(7)).await.unwrap();
    first.write_all(&frame_bytes(8)).await.unwrap();
    wait_until("two frames", || client.stats().frames_received == 2).await;

    // Instrument resets.
    drop(first);
    let _second = instrument.accept();

    let mut seen = Vec::new();
    while seen.last() != Some(&ConnectionState::Connected) {
        let state = timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("timed out waiting for transition")
            .unwrap();
        seen.push(state);
    }
    assert_eq!(
        seen,
        vec![
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Connected
        ]
    );
    assert!(client.stats().reconnects >= 1);

    assert_eq!(client.try_next_frame().unwrap().codes()[0], 7);
    assert_eq!(client.try_next_frame().unwrap().codes()[0], 8);

    client.shutdown().await;
}

#[tokio::test]
async fn truncated_frame_counts_as_framing_error() {
    let (connector, instrument) = scripted();
    let mut pipe = instrument.accept();
    let mut client = StreamClient::spawn(connector, &test_config()).unwrap();
    wait_for_state(&client, ConnectionState::Connected).await;

    let mut bytes = frame_bytes(1);
    bytes.extend_from_slice(&frame_bytes(2)[..3]);
    pipe.write_all(&bytes).await.unwrap();
    drop(pipe);

    wait_until("framing error", || client.stats().framing_errors == 1).await;
    let frame = client.try_next_frame().unwrap();
    assert_eq!(frame.codes(), &[1; FRAME_SIZE]);
    assert!(client.try_next_frame().is_none(), "partial frame must be discarded");

    client.shutdown().await;
}

#[tokio::test]
async fn commands_reach_the_instrument_byte_exact() {
    let (connector, instrument) = scripted();
    let mut pipe = instrument.accept();
    let client = StreamClient::spawn(connector, &test_config()).unwrap();
    wait_for_state(&client, ConnectionState::Connected).await;

    assert!(client.send(Command::vertical_offset(0.0)));
    assert!(client.send(Command::vertical_div("100mV").unwrap()));

    let mut buf = [0u8; 12];
    timeout(Duration::from_secs(2), pipe.read_exact(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf[..6], &[3, 0, 0xA0, 0x0F, 0, 0]);
    assert_eq!(&buf[6..], &[1, 0, 100, 0, 0, 0]);

    wait_until("commands counted", || client.stats().commands_sent == 2).await;
    client.shutdown().await;
}

#[tokio::test]
async fn failed_writes_are_reported_back() {
    let (connector, instrument) = scripted();
    let pipe = instrument.accept();
    let mut client = StreamClient::spawn(connector, &test_config()).unwrap();
    wait_for_state(&client, ConnectionState::Connected).await;

    // Accepted while the state still says Connected, written after the link broke.
    drop(pipe);
    let command = Command::horizontal_offset(3);
    assert!(client.send(command));

    wait_until("write failure", || client.stats().commands_failed == 1).await;
    assert_eq!(client.stats().commands_sent, 0);
    assert_eq!(client.take_failed_commands(), vec![command]);
    assert!(client.take_failed_commands().is_empty());

    client.shutdown().await;
}

#[tokio::test]
async fn send_is_refused_until_connected() {
    // No connection queued: the first connect attempt stays pending.
    let (connector, _instrument) = scripted();
    let client = StreamClient::spawn(connector, &test_config()).unwrap();
    wait_for_state(&client, ConnectionState::Connecting).await;

    assert!(!client.send(Command::horizontal_offset(1)));
    assert_eq!(client.stats().commands_failed, 1);
    assert_eq!(client.endpoint(), "scripted://test");

    client.shutdown().await;
}

#[tokio::test]
async fn shutdown_is_bounded_while_connect_is_pending() {
    let (connector, _instrument) = scripted();
    let config = test_config();
    let client = StreamClient::spawn(connector, &config).unwrap();
    wait_for_state(&client, ConnectionState::Connecting).await;
    let watcher = client.watch_state();

    let start = Instant::now();
    client.shutdown().await;
    let elapsed = start.elapsed();

    assert!(
        elapsed < config.shutdown_timeout() + Duration::from_millis(200),
        "shutdown took {:?}",
        elapsed
    );
    assert_eq!(*watcher.borrow(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn shutdown_is_bounded_while_streaming() {
    let (connector, instrument) = scripted();
    let mut pipe = instrument.accept();
    let client = StreamClient::spawn(connector, &test_config()).unwrap();
    wait_for_state(&client, ConnectionState::Connected).await;

    // Keep the producer busy against a full queue.
    let feeder = tokio::spawn(async move {
        for code in 0..1000u16 {
            if pipe.write_all(&frame_bytes(code)).await.is_err() {
                break;
            }
        }
    });

    let start = Instant::now();
    client.shutdown().await;
    assert!(start.elapsed() < Duration::from_millis(700));
    feeder.abort();
}
