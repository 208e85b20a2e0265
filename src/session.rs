//! Consumer side of an acquisition session.
//!
//! A [`ScopeSession`] pulls frames from its [`StreamClient`] on the caller's schedule
//! (one [`ScopeSession::tick`] per display refresh), runs them through decode,
//! calibration and measurement, and hands the result to registered listeners. It also
//! owns the control state that flows the other way: instrument settings, the command
//! encoder, and the two measurement cursors.
//!
//! The session never blocks. When the queue is empty, or while disconnected, the last
//! calibrated frame stays current.

use crate::calibration::CalibrationPipeline;
use crate::command::CommandEncoder;
use crate::config::ProbeConfig;
use crate::cursor::{CursorId, CursorModel, CursorValues, PointerEvent, VisibleRange};
use crate::decoder::SampleDecoder;
use crate::error::ProbeResult;
use crate::frame::{RawFrame, SharedFrame};
use crate::measurement::Measurements;
use crate::settings::{AcquisitionMode, Attenuation, InstrumentSettings, SettingChange};
use crate::stream::client::{ConnectionState, StreamClient, StreamStats};
use crate::stream::transport::connector_from_config;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

/// Callback invoked with every newly calibrated frame.
pub type FrameListener = Box<dyn FnMut(&SharedFrame) + Send>;

/// What happened to a setting change on the way to the instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingOutcome {
    /// A command was queued for the instrument
    Sent,
    /// The wire value did not change; nothing was sent
    Unchanged,
    /// Applied locally but could not be sent; it will be resent on the next change
    NotSent,
}

/// Decode, calibrate, and measure frames from one instrument.
pub struct ScopeSession {
    client: StreamClient,
    decoder: SampleDecoder,
    pipeline: CalibrationPipeline,
    settings: InstrumentSettings,
    encoder: CommandEncoder,
    cursors: CursorModel,
    frame_size: usize,
    last_frame: Option<SharedFrame>,
    measurements: Measurements,
    listeners: Vec<FrameListener>,
}

impl ScopeSession {
    /// Build the configured transport and start acquiring.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(config: &ProbeConfig) -> ProbeResult<Self> {
        config.validate()?;
        let connector = connector_from_config(config)?;
        info!(transport = %config.transport.describe(), "starting acquisition session");
        let client = StreamClient::spawn(connector, &config.acquisition)?;
        Ok(Self::new(client, config))
    }

    /// Wrap an already running client.
    #[must_use]
    pub fn new(client: StreamClient, config: &ProbeConfig) -> Self {
        let settings = InstrumentSettings::default();
        let encoder = CommandEncoder::from_settings(&settings).unwrap_or_else(|err| {
            warn!(%err, "cannot seed command encoder with front-panel defaults");
            CommandEncoder::new()
        });
        Self {
            client,
            decoder: SampleDecoder::from_config(&config.decoder),
            pipeline: CalibrationPipeline::from_config(&config.calibration),
            settings,
            encoder,
            cursors: CursorModel::new(),
            frame_size: config.acquisition.frame_size,
            last_frame: None,
            measurements: Measurements::default(),
            listeners: Vec::new(),
        }
    }

    /// Run one consumer cycle.
    ///
    /// Returns true when a new frame was processed. In Stop mode the queue is left
    /// untouched.
    pub fn tick(&mut self) -> bool {
        self.forget_failed_commands();
        if self.settings.mode() == AcquisitionMode::Stop {
            return false;
        }
        match self.client.try_next_frame() {
            Some(raw) => self.process(&raw),
            None => false,
        }
    }

    /// Drain every queued frame, processing each in order. Returns how many were processed.
    pub fn drain(&mut self) -> usize {
        let mut processed = 0;
        while self.tick() {
            processed += 1;
        }
        processed
    }

    fn process(&mut self, raw: &RawFrame) -> bool {
        if raw.len() != self.frame_size {
            warn!(
                expected = self.frame_size,
                received = raw.len(),
                "discarding frame of unexpected length"
            );
            return false;
        }

        let samples = self.decoder.decode_frame(raw);
        let frame = Arc::new(self.pipeline.calibrate_frame(&samples, &self.settings));
        self.measurements = Measurements::of_frame(&frame);
        for listener in &mut self.listeners {
            listener(&frame);
        }
        self.last_frame = Some(frame);
        true
    }

    /// Register a callback for every newly calibrated frame.
    pub fn on_frame_ready<F>(&mut self, listener: F)
    where
        F: FnMut(&SharedFrame) + Send + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    /// The most recent calibrated frame, if any has arrived.
    #[must_use]
    pub fn latest_frame(&self) -> Option<SharedFrame> {
        self.last_frame.clone()
    }

    /// Readouts for the most recent frame.
    #[must_use]
    pub fn measurements(&self) -> Measurements {
        self.measurements
    }

    /// Apply a control change and tell the instrument about it.
    ///
    /// Out-of-range values are rejected before anything changes. A change whose wire
    /// value matches the last one sent is not resent.
    pub fn on_setting_changed(&mut self, change: SettingChange) -> ProbeResult<SettingOutcome> {
        self.settings.apply(change)?;
        self.forget_failed_commands();
        let Some(command) = self.encoder.encode_change(change, &self.settings)? else {
            debug!(?change, "setting unchanged on the wire");
            return Ok(SettingOutcome::Unchanged);
        };

        if self.client.send(command) {
            debug!(?change, value = command.value, "setting sent");
            Ok(SettingOutcome::Sent)
        } else {
            self.encoder.invalidate(command.opcode);
            warn!(
                ?change,
                state = self.client.connection_state().label(),
                "setting applied locally but not sent"
            );
            Ok(SettingOutcome::NotSent)
        }
    }

    /// Commands lost to a write failure no longer count as the instrument's value.
    fn forget_failed_commands(&mut self) {
        for command in self.client.take_failed_commands() {
            debug!(opcode = ?command.opcode, value = command.value, "command write failed; will resend");
            self.encoder.invalidate(command.opcode);
        }
    }

    /// Feed a pointer event to the cursors. Returns true when a cursor consumed it.
    pub fn on_pointer_event(&mut self, event: &PointerEvent) -> bool {
        self.cursors.handle(event)
    }

    /// Move a cursor to the middle of the visible range.
    pub fn center_cursor(&mut self, id: CursorId, view: &VisibleRange) {
        self.cursors.center(id, view);
    }

    /// Show or hide a cursor.
    pub fn set_cursor_visible(&mut self, id: CursorId, visible: bool) {
        self.cursors.set_visible(id, visible);
    }

    /// Cursor positions and separations.
    #[must_use]
    pub fn cursor_values(&self) -> CursorValues {
        self.cursors.values()
    }

    /// The cursor model, for rendering.
    #[must_use]
    pub fn cursors(&self) -> &CursorModel {
        &self.cursors
    }

    /// Switch between Run and Stop.
    pub fn set_mode(&mut self, mode: AcquisitionMode) {
        info!(?mode, "acquisition mode changed");
        self.settings.set_mode(mode);
    }

    /// Select the probe attenuation. Takes effect from the next frame.
    pub fn set_attenuation(&mut self, attenuation: Attenuation) {
        self.settings.set_attenuation(attenuation);
    }

    /// Current control state.
    #[must_use]
    pub fn settings(&self) -> &InstrumentSettings {
        &self.settings
    }

    /// Current connection state, for a status indicator.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.client.connection_state()
    }

    /// Receiver holding the latest connection state.
    #[must_use]
    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.client.watch_state()
    }

    /// Receiver of every connection state transition.
    #[must_use]
    pub fn subscribe_connection_events(&self) -> broadcast::Receiver<ConnectionState> {
        self.client.subscribe_state_changes()
    }

    /// Acquisition counters.
    #[must_use]
    pub fn stats(&self) -> StreamStats {
        self.client.stats()
    }

    /// Stop acquisition and wait for the background task.
    pub async fn shutdown(self) {
        self.client.shutdown().await;
    }
}
