//! Reconnecting acquisition client.
//!
//! [`StreamClient`] owns one background task that opens the transport, reads frames
//! into a bounded queue, writes queued commands, and reconnects forever after any
//! failure until it is stopped.
//!
//! # State Machine
//!
//! ```text
//! Disconnected ──spawn()──> Connecting ──connect ok──> Connected
//!      ▲                        │                          │
//!      │                 connect failed /           read/write failed,
//!      │                 timed out                  instrument closed
//!      │                        ▼                          │
//!      └──── retry_interval ─ Disconnected <───────────────┘
//! ```
//!
//! # Queue semantics
//!
//! The frame queue is a bounded `mpsc` channel that outlives individual connections.
//! The producer waits at most `enqueue_timeout` for room and then drops the frame, so
//! the consumer sees frames in arrival order with the newest ones dropped under
//! backpressure. The consumer never blocks: [`StreamClient::try_next_frame`] returns
//! `None` when the queue is empty.
//!
//! # Command delivery
//!
//! [`StreamClient::send`] only queues. A queued command whose write fails comes back
//! through [`StreamClient::take_failed_commands`] so the caller can forget it was sent.
//!
//! # Shutdown
//!
//! Cancellation is a `CancellationToken` raced against every await in the task, so the
//! task exits at the next connect, read, or retry boundary. [`StreamClient::shutdown`]
//! waits for it at most `shutdown_timeout` and then aborts it.

use crate::command::Command;
use crate::config::AcquisitionConfig;
use crate::error::{ProbeError, ProbeResult};
use crate::frame::RawFrame;
use crate::stream::codec::{CommandCodec, FrameCodec};
use crate::stream::transport::{Connector, DynTransport};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn, Instrument};

const STATE_EVENT_CAPACITY: usize = 32;

/// Connection state of the acquisition task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ConnectionState {
    /// No transport; waiting to retry or stopped
    #[default]
    Disconnected,
    /// A connect attempt is in progress
    Connecting,
    /// Frames are flowing
    Connected,
}

impl ConnectionState {
    /// Returns true if connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns a short status label for display.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting...",
            Self::Connected => "Connected",
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    frames_received: AtomicU64,
    frames_dropped: AtomicU64,
    framing_errors: AtomicU64,
    reconnects: AtomicU64,
    commands_sent: AtomicU64,
    commands_failed: AtomicU64,
}

/// Snapshot of the acquisition counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StreamStats {
    /// Complete frames read from the transport
    pub frames_received: u64,
    /// Frames dropped because the queue stayed full
    pub frames_dropped: u64,
    /// Partial frames discarded at end of stream
    pub framing_errors: u64,
    /// Times the task went back to `Disconnected` and retried
    pub reconnects: u64,
    /// Commands written to the transport
    pub commands_sent: u64,
    /// Commands that could not be written or queued
    pub commands_failed: u64,
}

impl Counters {
    fn snapshot(&self) -> StreamStats {
        StreamStats {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            framing_errors: self.framing_errors.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            commands_sent: self.commands_sent.load(Ordering::Relaxed),
            commands_failed: self.commands_failed.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Publishes state to the latest-value cell and the transition stream.
struct StatePublisher {
    latest: watch::Sender<ConnectionState>,
    transitions: broadcast::Sender<ConnectionState>,
}

impl StatePublisher {
    fn publish(&self, next: ConnectionState) {
        let changed = self.latest.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            info!(state = next.label(), "connection state changed");
            // No subscribers is fine.
            let _ = self.transitions.send(next);
        }
    }
}

/// Handle to a running acquisition task.
///
/// Dropping the handle cancels the task; use [`StreamClient::shutdown`] to also wait
/// for it.
pub struct StreamClient {
    frames: mpsc::Receiver<RawFrame>,
    commands: mpsc::Sender<Command>,
    failed_commands: mpsc::UnboundedReceiver<Command>,
    state: watch::Receiver<ConnectionState>,
    transitions: broadcast::Sender<ConnectionState>,
    counters: Arc<Counters>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    shutdown_timeout: Duration,
    endpoint: String,
}

impl StreamClient {
    /// Start the acquisition task on the current Tokio runtime.
    ///
    /// Fails when called outside a runtime or with zero-sized queues or frames.
    pub fn spawn(connector: Arc<dyn Connector>, config: &AcquisitionConfig) -> ProbeResult<Self> {
        if config.frame_size == 0 || config.queue_capacity == 0 || config.command_queue_capacity == 0 {
            return Err(ProbeError::Configuration(
                "frame_size, queue_capacity and command_queue_capacity must be non-zero".into(),
            ));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ProbeError::Configuration(format!("no Tokio runtime available: {e}")))?;

        let (frame_tx, frame_rx) = mpsc::channel(config.queue_capacity);
        let (command_tx, command_rx) = mpsc::channel(config.command_queue_capacity);
        let (failed_tx, failed_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (transitions, _) = broadcast::channel(STATE_EVENT_CAPACITY);
        let counters = Arc::new(Counters::default());
        let cancel = CancellationToken::new();
        let endpoint = connector.describe();

        let task = AcquisitionTask {
            connector,
            frame_size: config.frame_size,
            retry_interval: config.retry_interval(),
            connect_timeout: config.connect_timeout(),
            enqueue_timeout: config.enqueue_timeout(),
            frames: frame_tx,
            commands: command_rx,
            failed_commands: failed_tx,
            state: StatePublisher {
                latest: state_tx,
                transitions: transitions.clone(),
            },
            counters: Arc::clone(&counters),
            cancel: cancel.clone(),
        };
        let span = tracing::info_span!("acquisition", endpoint = %endpoint);
        let handle = runtime.spawn(task.run().instrument(span));

        Ok(Self {
            frames: frame_rx,
            commands: command_tx,
            failed_commands: failed_rx,
            state: state_rx,
            transitions,
            counters,
            cancel,
            task: Some(handle),
            shutdown_timeout: config.shutdown_timeout(),
            endpoint,
        })
    }

    /// Take the oldest queued frame without waiting.
    pub fn try_next_frame(&mut self) -> Option<RawFrame> {
        self.frames.try_recv().ok()
    }

    /// Wait for the next frame. `None` once the task has stopped and the queue is empty.
    pub async fn next_frame(&mut self) -> Option<RawFrame> {
        self.frames.recv().await
    }

    /// Number of frames waiting in the queue.
    #[must_use]
    pub fn queued_frames(&self) -> usize {
        self.frames.len()
    }

    /// Queue a command for the transport without blocking.
    ///
    /// Returns false when not connected or the command queue is full. A write failure
    /// after queueing sends the task back to `Disconnected` and reports the command
    /// through [`StreamClient::take_failed_commands`].
    pub fn send(&self, command: Command) -> bool {
        if !self.connection_state().is_connected() {
            debug!(opcode = ?command.opcode, "not connected; command not sent");
            Counters::bump(&self.counters.commands_failed);
            return false;
        }
        match self.commands.try_send(command) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(opcode = ?command.opcode, "command queue full; command not sent");
                Counters::bump(&self.counters.commands_failed);
                false
            }
            Err(TrySendError::Closed(_)) => {
                Counters::bump(&self.counters.commands_failed);
                false
            }
        }
    }

    /// Commands accepted by [`StreamClient::send`] whose write later failed, oldest first.
    pub fn take_failed_commands(&mut self) -> Vec<Command> {
        std::iter::from_fn(|| self.failed_commands.try_recv().ok()).collect()
    }

    /// Current connection state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver that always holds the latest state.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Receiver of every state transition from now on.
    #[must_use]
    pub fn subscribe_state_changes(&self) -> broadcast::Receiver<ConnectionState> {
        self.transitions.subscribe()
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> StreamStats {
        self.counters.snapshot()
    }

    /// Endpoint description.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Stop the task and wait for it, at most `shutdown_timeout`.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(_) => debug!(endpoint = %self.endpoint, "acquisition task joined"),
                Err(_) => {
                    warn!(
                        endpoint = %self.endpoint,
                        timeout_ms = self.shutdown_timeout.as_millis() as u64,
                        "acquisition task did not stop in time; aborting"
                    );
                    task.abort();
                }
            }
        }
    }
}

impl Drop for StreamClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

enum PumpExit {
    Cancelled,
    Failed(ProbeError),
}

struct AcquisitionTask {
    connector: Arc<dyn Connector>,
    frame_size: usize,
    retry_interval: Duration,
    connect_timeout: Duration,
    enqueue_timeout: Duration,
    frames: mpsc::Sender<RawFrame>,
    commands: mpsc::Receiver<Command>,
    failed_commands: mpsc::UnboundedSender<Command>,
    state: StatePublisher,
    counters: Arc<Counters>,
    cancel: CancellationToken,
}

impl AcquisitionTask {
    async fn run(mut self) {
        loop {
            self.state.publish(ConnectionState::Connecting);

            let attempt = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                result = tokio::time::timeout(self.connect_timeout, self.connector.connect()) => {
                    result.unwrap_or(Err(ProbeError::ConnectTimeout(self.connect_timeout)))
                }
            };

            match attempt {
                Ok(transport) => {
                    self.state.publish(ConnectionState::Connected);
                    match self.pump(transport).await {
                        PumpExit::Cancelled => break,
                        PumpExit::Failed(err) => warn!(error = %err, "connection lost"),
                    }
                }
                Err(err) if err.is_recoverable() => warn!(error = %err, "connect failed"),
                Err(err) => warn!(error = %err, "connect failed; retrying anyway"),
            }

            self.state.publish(ConnectionState::Disconnected);
            Counters::bump(&self.counters.reconnects);
            debug!(retry_in_ms = self.retry_interval.as_millis() as u64, "waiting before reconnect");

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.retry_interval) => {}
            }
        }

        self.state.publish(ConnectionState::Disconnected);
        debug!("acquisition task stopped");
    }

    /// Move frames and commands until the transport fails or the task is cancelled.
    ///
    /// The transport halves drop on return, which closes the connection.
    async fn pump(&mut self, transport: DynTransport) -> PumpExit {
        let (reader, writer) = tokio::io::split(transport);
        let codec = FrameCodec::new(self.frame_size, self.connector.wire_format());
        let mut frames = FramedRead::new(reader, codec);
        let mut sink = FramedWrite::new(writer, CommandCodec);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return PumpExit::Cancelled,
                Some(command) = self.commands.recv() => {
                    if let Err(err) = sink.send(command).await {
                        warn!(opcode = ?command.opcode, error = %err, "command write failed");
                        // Closed only once the client handle is gone.
                        let _ = self.failed_commands.send(command);
                        Counters::bump(&self.counters.commands_failed);
                        return PumpExit::Failed(err);
                    }
                    Counters::bump(&self.counters.commands_sent);
                    debug!(opcode = ?command.opcode, value = command.value, "command sent");
                }
                next = frames.next() => match next {
                    Some(Ok(frame)) => {
                        Counters::bump(&self.counters.frames_received);
                        if !self.enqueue(frame).await {
                            return PumpExit::Cancelled;
                        }
                    }
                    Some(Err(err)) => {
                        if matches!(err, ProbeError::Framing { .. }) {
                            Counters::bump(&self.counters.framing_errors);
                        }
                        return PumpExit::Failed(err);
                    }
                    None => {
                        return PumpExit::Failed(ProbeError::Transport(
                            "connection closed by instrument".into(),
                        ))
                    }
                },
            }
        }
    }

    /// Returns false once the consumer is gone.
    async fn enqueue(&self, frame: RawFrame) -> bool {
        match self.frames.send_timeout(frame, self.enqueue_timeout).await {
            Ok(()) => {
                trace!("frame queued");
                true
            }
            Err(SendTimeoutError::Timeout(_)) => {
                Counters::bump(&self.counters.frames_dropped);
                debug!("frame queue full; dropping frame");
                true
            }
            Err(SendTimeoutError::Closed(_)) => false,
        }
    }
}
