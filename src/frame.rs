//! Frame types passed between the acquisition task and the consumer.

use std::sync::Arc;

/// One fixed-size batch of raw wire codes, in transport order.
///
/// Immutable once read. The codec only emits frames of exactly the configured size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    codes: Vec<u16>,
}

impl RawFrame {
    /// Wraps a sequence of wire codes.
    #[must_use]
    pub fn new(codes: Vec<u16>) -> Self {
        Self { codes }
    }

    /// The wire codes.
    #[must_use]
    pub fn codes(&self) -> &[u16] {
        &self.codes
    }

    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// True when the frame holds no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

/// Time and voltage coordinates of one calibrated frame.
///
/// Both sequences always have the same length. Frames are shared behind an `Arc` and
/// replaced wholesale each update, never edited in place.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CalibratedFrame {
    time: Vec<f64>,
    volts: Vec<f64>,
}

/// Shared handle given to frame listeners.
pub type SharedFrame = Arc<CalibratedFrame>;

impl CalibratedFrame {
    /// Pairs a time axis with voltages. Returns `None` when the lengths differ.
    #[must_use]
    pub fn new(time: Vec<f64>, volts: Vec<f64>) -> Option<Self> {
        (time.len() == volts.len()).then_some(Self { time, volts })
    }

    /// Pairs sequences already known to have equal length.
    pub(crate) fn from_parts(time: Vec<f64>, volts: Vec<f64>) -> Self {
        debug_assert_eq!(time.len(), volts.len());
        Self { time, volts }
    }

    /// Time coordinates in seconds, monotonically increasing.
    #[must_use]
    pub fn time(&self) -> &[f64] {
        &self.time
    }

    /// Calibrated voltages.
    #[must_use]
    pub fn volts(&self) -> &[f64] {
        &self.volts
    }

    /// Number of points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.volts.len()
    }

    /// True when the frame holds no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.volts.is_empty()
    }
}
