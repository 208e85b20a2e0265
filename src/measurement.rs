//! Waveform statistics over a calibrated frame.
//!
//! Frequency comes from rising zero crossings of the mean-removed signal rather than a
//! spectrum: it tolerates non-sinusoidal shapes and the filtering done by calibration.

use crate::frame::CalibratedFrame;
use serde::Serialize;

/// One readout of [`Measurements`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeasurementKind {
    /// Peak-to-peak voltage
    Vpp,
    /// Maximum voltage
    Max,
    /// Minimum voltage
    Min,
    /// Mean voltage
    Mean,
    /// Estimated frequency in Hz
    Frequency,
}

impl MeasurementKind {
    /// Every readout, in display order.
    pub const ALL: [MeasurementKind; 5] = [
        MeasurementKind::Vpp,
        MeasurementKind::Max,
        MeasurementKind::Min,
        MeasurementKind::Mean,
        MeasurementKind::Frequency,
    ];

    /// Short display name.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Vpp => "Vpp",
            Self::Max => "Max",
            Self::Min => "Min",
            Self::Mean => "Mean",
            Self::Frequency => "Freq",
        }
    }

    /// Display unit.
    #[must_use]
    pub fn unit(&self) -> &'static str {
        match self {
            Self::Frequency => "Hz",
            _ => "V",
        }
    }
}

/// Statistics of one frame. All zero for an empty frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Measurements {
    /// Peak-to-peak voltage
    pub vpp: f64,
    /// Maximum voltage
    pub max: f64,
    /// Minimum voltage
    pub min: f64,
    /// Mean voltage
    pub mean: f64,
    /// Estimated frequency in Hz, zero when fewer than two rising crossings exist
    pub frequency: f64,
}

impl Measurements {
    /// Compute every readout for paired time and voltage samples.
    ///
    /// `x` and `y` must have the same length.
    #[must_use]
    pub fn compute(x: &[f64], y: &[f64]) -> Self {
        debug_assert_eq!(x.len(), y.len(), "time and voltage lengths differ");
        if y.is_empty() {
            return Self::default();
        }

        let mean = y.iter().sum::<f64>() / y.len() as f64;
        let min = y.iter().copied().fold(f64::INFINITY, f64::min);
        let max = y.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        Self {
            vpp: max - min,
            max,
            min,
            mean,
            frequency: estimate_frequency(x, y, mean),
        }
    }

    /// Compute every readout for a calibrated frame.
    #[must_use]
    pub fn of_frame(frame: &CalibratedFrame) -> Self {
        Self::compute(frame.time(), frame.volts())
    }

    /// Select a single readout.
    #[must_use]
    pub fn get(&self, kind: MeasurementKind) -> f64 {
        match kind {
            MeasurementKind::Vpp => self.vpp,
            MeasurementKind::Max => self.max,
            MeasurementKind::Min => self.min,
            MeasurementKind::Mean => self.mean,
            MeasurementKind::Frequency => self.frequency,
        }
    }
}

fn estimate_frequency(x: &[f64], y: &[f64], mean: f64) -> f64 {
    let crossings: Vec<f64> = y
        .windows(2)
        .zip(x)
        .filter(|(pair, _)| pair[0] - mean <= 0.0 && pair[1] - mean > 0.0)
        .map(|(_, &t)| t)
        .collect();

    if crossings.len() < 2 {
        return 0.0;
    }

    let period = crossings.windows(2).map(|w| w[1] - w[0]).sum::<f64>()
        / (crossings.len() - 1) as f64;
    if period > 0.0 {
        1.0 / period
    } else {
        0.0
    }
}
