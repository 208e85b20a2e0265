//! Analog front-end calibration.
//!
//! Turns decoded ADC voltages into probe-tip voltages. The steps run in a fixed order
//! and are never reassociated:
//!
//! 1. undo the differential amplifier: `v = (v + bias) * scale`
//! 2. subtract the offset model evaluated at the vertical offset control position
//! 3. divide by the gain multiplier of the selected range, then apply the base gain
//! 4. apply the probe attenuation factor (display only)
//! 5. suppress outliers (median window, percentile clip, or nothing)
//!
//! Hardware revisions differ in both the offset model and the outlier step, so both
//! are strategies chosen in configuration.
//!
//! # Example Configuration (`.toml`)
//!
//! ```toml
//! [calibration]
//! bias = 0.575
//! scale = 0.5
//! base_gain = 16.666
//!
//! [calibration.offset]
//! model = "linear"
//! slope = 0.015
//! intercept = 0.0
//!
//! [calibration.outlier_filter]
//! mode = "median"
//! window = 4
//! ```

use crate::config::CalibrationConfig;
use crate::frame::CalibratedFrame;
use crate::settings::{InstrumentSettings, HORIZONTAL_DIVISIONS};
use serde::{Deserialize, Serialize};

/// Offset subtracted in step 2, as a function of the offset control position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum OffsetModel {
    /// `code * slope + intercept`
    Linear {
        /// Volts per control step
        #[serde(default = "default_offset_slope")]
        slope: f64,
        /// Offset at control position zero
        #[serde(default)]
        intercept: f64,
    },
    /// `c0 + c1*code + c2*code^2 + c3*code^3`
    Cubic {
        /// Polynomial coefficients, constant term first
        coefficients: [f64; 4],
    },
}

impl Default for OffsetModel {
    fn default() -> Self {
        OffsetModel::Linear {
            slope: default_offset_slope(),
            intercept: 0.0,
        }
    }
}

fn default_offset_slope() -> f64 {
    0.015
}

impl OffsetModel {
    /// Offset in volts at the given control position.
    #[must_use]
    pub fn evaluate(&self, code: i32) -> f64 {
        let k = f64::from(code);
        match self {
            OffsetModel::Linear { slope, intercept } => k * slope + intercept,
            OffsetModel::Cubic { coefficients: c } => c[0] + k * (c[1] + k * (c[2] + k * c[3])),
        }
    }

    pub(crate) fn validate(&self) -> Option<String> {
        let finite = match self {
            OffsetModel::Linear { slope, intercept } => slope.is_finite() && intercept.is_finite(),
            OffsetModel::Cubic { coefficients } => coefficients.iter().all(|c| c.is_finite()),
        };
        (!finite).then(|| "calibration.offset coefficients must be finite".to_string())
    }
}

/// Outlier suppression applied as the last step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum OutlierFilter {
    /// Sliding-window median, truncated at the frame edges
    Median {
        /// Window length in samples
        #[serde(default = "default_median_window")]
        window: usize,
    },
    /// Clip to the `low`/`high` percentiles of the frame
    Percentile {
        /// Lower percentile, 0-100
        #[serde(default = "default_percentile_low")]
        low: f64,
        /// Upper percentile, 0-100
        #[serde(default = "default_percentile_high")]
        high: f64,
    },
    /// Leave samples untouched
    Disabled,
}

impl Default for OutlierFilter {
    fn default() -> Self {
        OutlierFilter::Percentile {
            low: default_percentile_low(),
            high: default_percentile_high(),
        }
    }
}

/// Largest accepted median window, in samples.
pub const MAX_MEDIAN_WINDOW: usize = 4096;

fn default_median_window() -> usize {
    4
}

fn default_percentile_low() -> f64 {
    1.0
}

fn default_percentile_high() -> f64 {
    99.0
}

impl OutlierFilter {
    /// Filter a frame in place.
    pub fn apply(&self, samples: &mut [f64]) {
        match *self {
            OutlierFilter::Median { window } => median_filter(samples, window),
            OutlierFilter::Percentile { low, high } => percentile_clip(samples, low, high),
            OutlierFilter::Disabled => {}
        }
    }

    pub(crate) fn validate(&self) -> Option<String> {
        match *self {
            OutlierFilter::Median { window } if window == 0 || window > MAX_MEDIAN_WINDOW => {
                Some(format!(
                    "calibration.outlier_filter.window must be between 1 and {MAX_MEDIAN_WINDOW} (got {window})"
                ))
            }
            OutlierFilter::Percentile { low, high }
                if !(0.0..=100.0).contains(&low) || !(0.0..=100.0).contains(&high) || low >= high =>
            {
                Some(format!(
                    "calibration.outlier_filter percentile bounds must satisfy 0 <= low < high <= 100 (got {low}, {high})"
                ))
            }
            _ => None,
        }
    }
}

fn median_filter(samples: &mut [f64], window: usize) {
    let len = samples.len();
    // A window wider than the frame sees the same truncated slices as one frame wide.
    let window = window.min(len);
    if window <= 1 {
        return;
    }
    let source = samples.to_vec();
    let before = window / 2;
    let mut scratch = Vec::with_capacity(window);

    for (i, out) in samples.iter_mut().enumerate() {
        let start = i.saturating_sub(before);
        let end = (i + window - before).min(len);
        scratch.clear();
        scratch.extend_from_slice(&source[start..end]);
        scratch.sort_by(f64::total_cmp);
        let mid = scratch.len() / 2;
        *out = if scratch.len() % 2 == 0 {
            (scratch[mid - 1] + scratch[mid]) / 2.0
        } else {
            scratch[mid]
        };
    }
}

fn percentile_clip(samples: &mut [f64], low: f64, high: f64) {
    if samples.is_empty() {
        return;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);
    let lo = percentile(&sorted, low);
    let hi = percentile(&sorted, high);
    // Infinite samples interpolate to NaN bounds.
    if lo.is_nan() || hi.is_nan() {
        return;
    }
    for v in samples.iter_mut() {
        *v = v.clamp(lo, hi);
    }
}

/// Linearly interpolated percentile of an ascending, non-empty slice.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let below = rank.floor() as usize;
    let above = rank.ceil() as usize;
    sorted[below] + (sorted[above] - sorted[below]) * (rank - below as f64)
}

/// Evenly spaced sample times over the ten horizontal divisions.
#[must_use]
pub fn time_axis(len: usize, seconds_per_div: f64) -> Vec<f64> {
    let span = seconds_per_div * f64::from(HORIZONTAL_DIVISIONS);
    match len {
        0 => Vec::new(),
        1 => vec![0.0],
        _ => {
            let step = span / (len - 1) as f64;
            (0..len).map(|i| i as f64 * step).collect()
        }
    }
}

/// The calibration steps with their constants.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationPipeline {
    bias: f64,
    scale: f64,
    base_gain: f64,
    offset: OffsetModel,
    outlier_filter: OutlierFilter,
}

impl CalibrationPipeline {
    /// Build the pipeline from the `[calibration]` section.
    #[must_use]
    pub fn from_config(config: &CalibrationConfig) -> Self {
        Self {
            bias: config.bias,
            scale: config.scale,
            base_gain: config.base_gain,
            offset: config.offset.clone(),
            outlier_filter: config.outlier_filter.clone(),
        }
    }

    /// Replace the outlier step.
    #[must_use]
    pub fn with_outlier_filter(mut self, filter: OutlierFilter) -> Self {
        self.outlier_filter = filter;
        self
    }

    /// The active outlier step.
    #[must_use]
    pub fn outlier_filter(&self) -> &OutlierFilter {
        &self.outlier_filter
    }

    /// Step 1 on its own.
    #[inline]
    #[must_use]
    pub fn differential_inverse(&self, v: f64) -> f64 {
        (v + self.bias) * self.scale
    }

    /// Run every step over one frame of decoded samples.
    ///
    /// Output has the same length as the input; an empty input yields an empty output.
    #[must_use]
    pub fn calibrate(&self, samples: &[f64], settings: &InstrumentSettings) -> Vec<f64> {
        let offset = self.offset.evaluate(settings.vertical_offset_code());
        let inverse_multiplier = 1.0 / settings.voltage_multiplier();
        // Multiplied: x10 attenuation divides the signal by ten ahead of the input.
        let attenuation = settings.attenuation().factor();

        let mut out: Vec<f64> = samples
            .iter()
            .map(|&v| {
                let v = self.differential_inverse(v);
                let v = v - offset;
                let v = v * inverse_multiplier * self.base_gain;
                v * attenuation
            })
            .collect();

        self.outlier_filter.apply(&mut out);
        out
    }

    /// Calibrate and attach the time axis for the current timebase.
    #[must_use]
    pub fn calibrate_frame(
        &self,
        samples: &[f64],
        settings: &InstrumentSettings,
    ) -> CalibratedFrame {
        let volts = self.calibrate(samples, settings);
        let time = time_axis(volts.len(), settings.seconds_per_div());
        CalibratedFrame::from_parts(time, volts)
    }
}

impl Default for CalibrationPipeline {
    fn default() -> Self {
        Self::from_config(&CalibrationConfig::default())
    }
}
