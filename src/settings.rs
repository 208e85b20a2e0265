//! Instrument settings record and the fixed division tables.
//!
//! The control surface writes [`InstrumentSettings`]; calibration and command encoding
//! read it. Indices and offset codes are validated on write, so a stored settings
//! record always indexes the tables below.

use crate::error::{ProbeError, ProbeResult};
use std::ops::RangeInclusive;

/// Volts-per-division choices as (label, millivolts).
pub const VOLTS_PER_DIV: [(&str, u32); 10] = [
    ("10mV", 10),
    ("20mV", 20),
    ("50mV", 50),
    ("100mV", 100),
    ("200mV", 200),
    ("500mV", 500),
    ("1V", 1000),
    ("2V", 2000),
    ("5V", 5000),
    ("10V", 10_000),
];

/// Time-per-division choices as (label, microseconds).
pub const TIME_PER_DIV: [(&str, u32); 8] = [
    ("1µs", 1),
    ("2µs", 2),
    ("5µs", 5),
    ("10µs", 10),
    ("20µs", 20),
    ("50µs", 50),
    ("100µs", 100),
    ("200µs", 200),
];

/// Default index into [`VOLTS_PER_DIV`] (500mV).
pub const DEFAULT_VERTICAL_DIV_INDEX: usize = 5;
/// Default index into [`TIME_PER_DIV`] (5µs).
pub const DEFAULT_TIMEBASE_DIV_INDEX: usize = 2;

/// Horizontal grid divisions on the display.
pub const HORIZONTAL_DIVISIONS: u32 = 10;
/// Vertical grid divisions on the display.
pub const VERTICAL_DIVISIONS: u32 = 8;

/// Positions of the vertical offset control.
pub const VERTICAL_OFFSET_RANGE: RangeInclusive<i32> = -40..=40;
/// Positions of the horizontal offset control.
pub const HORIZONTAL_OFFSET_RANGE: RangeInclusive<i32> = -1..=1;
/// The vertical offset voltage saturates at this magnitude.
pub const MAX_OFFSET_VOLTS: f64 = 4.0;

/// Parse a volts label such as `"100mV"` or `"1V"` into integer millivolts.
pub fn label_to_millivolts(label: &str) -> ProbeResult<u32> {
    let label = label.trim();
    let (number, scale) = if let Some(n) = label.strip_suffix("mV") {
        (n, 1.0)
    } else if let Some(n) = label.strip_suffix('V') {
        (n, 1000.0)
    } else {
        return Err(ProbeError::InvalidLabel(label.to_string()));
    };
    parse_scaled(label, number, scale).map(|mv| mv.round() as u32)
}

/// Parse a time label such as `"5µs"`, `"5us"` or `"1ms"` into microseconds.
pub fn label_to_microseconds(label: &str) -> ProbeResult<f64> {
    let label = label.trim();
    // Both MICRO SIGN and GREEK SMALL LETTER MU appear in the wild.
    let (number, scale) = if let Some(n) = label
        .strip_suffix("µs")
        .or_else(|| label.strip_suffix("μs"))
        .or_else(|| label.strip_suffix("us"))
    {
        (n, 1.0)
    } else if let Some(n) = label.strip_suffix("ms") {
        (n, 1_000.0)
    } else if let Some(n) = label.strip_suffix("ns") {
        (n, 0.001)
    } else if let Some(n) = label.strip_suffix('s') {
        (n, 1_000_000.0)
    } else {
        return Err(ProbeError::InvalidLabel(label.to_string()));
    };
    parse_scaled(label, number, scale)
}

fn parse_scaled(label: &str, number: &str, scale: f64) -> ProbeResult<f64> {
    match number.trim().parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => Ok(value * scale),
        _ => Err(ProbeError::InvalidLabel(label.to_string())),
    }
}

/// Hardware gain selected automatically from the volts-per-division setting.
#[must_use]
pub fn voltage_multiplier(millivolts_per_div: u32) -> f64 {
    match millivolts_per_div {
        0..=100 => 10.0,
        101..=500 => 5.0,
        501..=2000 => 2.0,
        _ => 1.0,
    }
}

/// Probe attenuation. A local display multiplier, never sent to the instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Attenuation {
    /// 1x probe
    #[default]
    X1,
    /// 10x probe
    X10,
}

impl Attenuation {
    /// Multiplier applied to displayed voltages.
    #[must_use]
    pub fn factor(self) -> f64 {
        match self {
            Attenuation::X1 => 1.0,
            Attenuation::X10 => 10.0,
        }
    }
}

/// Whether the consumer pulls new frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcquisitionMode {
    /// Consume and display new frames
    #[default]
    Run,
    /// Freeze the display on the last frame
    Stop,
}

/// A single control-surface change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingChange {
    /// New index into [`VOLTS_PER_DIV`]
    VerticalDiv(usize),
    /// New index into [`TIME_PER_DIV`]
    TimebaseDiv(usize),
    /// New vertical offset control position
    VerticalOffset(i32),
    /// New horizontal offset control position
    HorizontalOffset(i32),
}

/// Current state of the instrument controls.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentSettings {
    vertical_div_index: usize,
    timebase_div_index: usize,
    vertical_offset_code: i32,
    horizontal_offset_code: i32,
    attenuation: Attenuation,
    mode: AcquisitionMode,
}

impl Default for InstrumentSettings {
    fn default() -> Self {
        Self {
            vertical_div_index: DEFAULT_VERTICAL_DIV_INDEX,
            timebase_div_index: DEFAULT_TIMEBASE_DIV_INDEX,
            vertical_offset_code: 0,
            horizontal_offset_code: 0,
            attenuation: Attenuation::X1,
            mode: AcquisitionMode::Run,
        }
    }
}

impl InstrumentSettings {
    /// Apply one control change, rejecting out-of-range values.
    pub fn apply(&mut self, change: SettingChange) -> ProbeResult<()> {
        match change {
            SettingChange::VerticalDiv(index) => self.set_vertical_div_index(index),
            SettingChange::TimebaseDiv(index) => self.set_timebase_div_index(index),
            SettingChange::VerticalOffset(code) => self.set_vertical_offset_code(code),
            SettingChange::HorizontalOffset(code) => self.set_horizontal_offset_code(code),
        }
    }

    /// Select a volts-per-division entry.
    pub fn set_vertical_div_index(&mut self, index: usize) -> ProbeResult<()> {
        if index >= VOLTS_PER_DIV.len() {
            return Err(ProbeError::InvalidSetting(format!(
                "vertical division index {index} out of range 0..{}",
                VOLTS_PER_DIV.len()
            )));
        }
        self.vertical_div_index = index;
        Ok(())
    }

    /// Select a time-per-division entry.
    pub fn set_timebase_div_index(&mut self, index: usize) -> ProbeResult<()> {
        if index >= TIME_PER_DIV.len() {
            return Err(ProbeError::InvalidSetting(format!(
                "timebase division index {index} out of range 0..{}",
                TIME_PER_DIV.len()
            )));
        }
        self.timebase_div_index = index;
        Ok(())
    }

    /// Move the vertical offset control.
    pub fn set_vertical_offset_code(&mut self, code: i32) -> ProbeResult<()> {
        if !VERTICAL_OFFSET_RANGE.contains(&code) {
            return Err(ProbeError::InvalidSetting(format!(
                "vertical offset {code} outside {VERTICAL_OFFSET_RANGE:?}"
            )));
        }
        self.vertical_offset_code = code;
        Ok(())
    }

    /// Move the horizontal offset control.
    pub fn set_horizontal_offset_code(&mut self, code: i32) -> ProbeResult<()> {
        if !HORIZONTAL_OFFSET_RANGE.contains(&code) {
            return Err(ProbeError::InvalidSetting(format!(
                "horizontal offset {code} outside {HORIZONTAL_OFFSET_RANGE:?}"
            )));
        }
        self.horizontal_offset_code = code;
        Ok(())
    }

    /// Select the probe attenuation.
    pub fn set_attenuation(&mut self, attenuation: Attenuation) {
        self.attenuation = attenuation;
    }

    /// Switch between run and stop.
    pub fn set_mode(&mut self, mode: AcquisitionMode) {
        self.mode = mode;
    }

    /// Index into [`VOLTS_PER_DIV`].
    #[must_use]
    pub fn vertical_div_index(&self) -> usize {
        self.vertical_div_index
    }

    /// Index into [`TIME_PER_DIV`].
    #[must_use]
    pub fn timebase_div_index(&self) -> usize {
        self.timebase_div_index
    }

    /// Vertical offset control position.
    #[must_use]
    pub fn vertical_offset_code(&self) -> i32 {
        self.vertical_offset_code
    }

    /// Horizontal offset control position.
    #[must_use]
    pub fn horizontal_offset_code(&self) -> i32 {
        self.horizontal_offset_code
    }

    /// Probe attenuation.
    #[must_use]
    pub fn attenuation(&self) -> Attenuation {
        self.attenuation
    }

    /// Run or stop.
    #[must_use]
    pub fn mode(&self) -> AcquisitionMode {
        self.mode
    }

    /// Label of the selected volts-per-division entry.
    #[must_use]
    pub fn vertical_div_label(&self) -> &'static str {
        VOLTS_PER_DIV[self.vertical_div_index].0
    }

    /// Selected volts per division, in millivolts.
    #[must_use]
    pub fn millivolts_per_div(&self) -> u32 {
        VOLTS_PER_DIV[self.vertical_div_index].1
    }

    /// Selected volts per division.
    #[must_use]
    pub fn volts_per_div(&self) -> f64 {
        f64::from(self.millivolts_per_div()) / 1000.0
    }

    /// Label of the selected time-per-division entry.
    #[must_use]
    pub fn timebase_label(&self) -> &'static str {
        TIME_PER_DIV[self.timebase_div_index].0
    }

    /// Selected time per division, in microseconds.
    #[must_use]
    pub fn microseconds_per_div(&self) -> u32 {
        TIME_PER_DIV[self.timebase_div_index].1
    }

    /// Selected time per division, in seconds.
    #[must_use]
    pub fn seconds_per_div(&self) -> f64 {
        f64::from(self.microseconds_per_div()) * 1e-6
    }

    /// Gain factor implied by the volts-per-division selection.
    #[must_use]
    pub fn voltage_multiplier(&self) -> f64 {
        voltage_multiplier(self.millivolts_per_div())
    }

    /// Physical offset represented by the vertical offset control.
    ///
    /// One control step is a tenth of a division, saturating at ±[`MAX_OFFSET_VOLTS`].
    #[must_use]
    pub fn vertical_offset_volts(&self) -> f64 {
        (f64::from(self.vertical_offset_code) * self.volts_per_div() / 10.0)
            .clamp(-MAX_OFFSET_VOLTS, MAX_OFFSET_VOLTS)
    }
}
