//! Outbound instrument commands.
//!
//! Every command is six bytes: a little-endian `u16` opcode followed by a little-endian
//! `u32` value. Values are physical units converted to the instrument's own codes:
//!
//! | Opcode | Value |
//! |---|---|
//! | `VerticalDiv` (1) | volts per division in integer millivolts |
//! | `TimebaseDiv` (2) | prescaler: `1` up to 5 µs/div, else `floor(µs / 5)` |
//! | `VerticalOffset` (3) | `round(volts * 1000 + 4000)` |
//! | `HorizontalOffset` (4) | control position, two's complement when negative |
//!
//! [`CommandEncoder`] remembers the last value sent per opcode and only produces a
//! command when the value actually changes.

use crate::error::ProbeResult;
use crate::settings::{label_to_microseconds, label_to_millivolts, InstrumentSettings, SettingChange};

/// Length of an encoded command.
pub const COMMAND_LEN: usize = 6;

/// Bias added to the vertical offset code so the wire value stays unsigned.
pub const VERTICAL_OFFSET_BIAS: f64 = 4000.0;

/// Timebases at or below this many microseconds share prescaler code 1.
const TIMEBASE_PRESCALE_US: f64 = 5.0;

/// Command identifiers understood by the instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Opcode {
    /// Volts per division
    VerticalDiv = 1,
    /// Time per division
    TimebaseDiv = 2,
    /// Vertical offset
    VerticalOffset = 3,
    /// Horizontal offset
    HorizontalOffset = 4,
}

impl Opcode {
    /// Every opcode in wire order.
    pub const ALL: [Opcode; 4] = [
        Opcode::VerticalDiv,
        Opcode::TimebaseDiv,
        Opcode::VerticalOffset,
        Opcode::HorizontalOffset,
    ];

    /// Wire value.
    #[must_use]
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Parse a wire value.
    #[must_use]
    pub fn from_code(code: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.code() == code)
    }

    fn slot(self) -> usize {
        usize::from(self.code() - 1)
    }
}

/// One outbound command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    /// What to change
    pub opcode: Opcode,
    /// Instrument-unit value
    pub value: u32,
}

/// Encode an opcode and value into the six-byte wire layout.
#[must_use]
pub fn encode(opcode: Opcode, value: u32) -> [u8; COMMAND_LEN] {
    Command { opcode, value }.to_bytes()
}

impl Command {
    /// Volts-per-division command from a label such as `"100mV"`.
    pub fn vertical_div(label: &str) -> ProbeResult<Self> {
        Ok(Self {
            opcode: Opcode::VerticalDiv,
            value: label_to_millivolts(label)?,
        })
    }

    /// Time-per-division command from a label such as `"20µs"`.
    pub fn timebase_div(label: &str) -> ProbeResult<Self> {
        let micros = label_to_microseconds(label)?;
        let value = if micros <= TIMEBASE_PRESCALE_US {
            1
        } else {
            (micros / TIMEBASE_PRESCALE_US).floor() as u32
        };
        Ok(Self {
            opcode: Opcode::TimebaseDiv,
            value,
        })
    }

    /// Vertical offset command from an offset in volts.
    #[must_use]
    pub fn vertical_offset(volts: f64) -> Self {
        let code = (volts * 1000.0 + VERTICAL_OFFSET_BIAS).round().max(0.0);
        Self {
            opcode: Opcode::VerticalOffset,
            value: code as u32,
        }
    }

    /// Horizontal offset command from the raw control position.
    #[must_use]
    pub fn horizontal_offset(position: i32) -> Self {
        Self {
            opcode: Opcode::HorizontalOffset,
            value: position as u32,
        }
    }

    /// Six-byte wire form.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; COMMAND_LEN] {
        let mut out = [0u8; COMMAND_LEN];
        out[..2].copy_from_slice(&self.opcode.code().to_le_bytes());
        out[2..].copy_from_slice(&self.value.to_le_bytes());
        out
    }

    /// Parse the six-byte wire form. `None` for an unknown opcode.
    #[must_use]
    pub fn from_bytes(bytes: &[u8; COMMAND_LEN]) -> Option<Self> {
        let opcode = Opcode::from_code(u16::from_le_bytes([bytes[0], bytes[1]]))?;
        let value = u32::from_le_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]);
        Some(Self { opcode, value })
    }
}

/// Maps setting changes to commands, suppressing repeats.
#[derive(Debug, Default, Clone)]
pub struct CommandEncoder {
    last_sent: [Option<u32>; 4],
}

impl CommandEncoder {
    /// A fresh encoder; the first change for every opcode produces a command.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An encoder that treats `settings` as already sent.
    ///
    /// The instrument powers up with the front-panel defaults, so seeding from
    /// [`InstrumentSettings::default`] suppresses commands that would not change it.
    pub fn from_settings(settings: &InstrumentSettings) -> ProbeResult<Self> {
        let mut encoder = Self::new();
        for change in [
            SettingChange::VerticalDiv(0),
            SettingChange::TimebaseDiv(0),
            SettingChange::VerticalOffset(0),
            SettingChange::HorizontalOffset(0),
        ] {
            let command = Self::command_for(change, settings)?;
            encoder.last_sent[command.opcode.slot()] = Some(command.value);
        }
        Ok(encoder)
    }

    /// The command describing the current value of the setting `change` touched.
    ///
    /// `settings` must already have `change` applied.
    pub fn command_for(change: SettingChange, settings: &InstrumentSettings) -> ProbeResult<Command> {
        match change {
            SettingChange::VerticalDiv(_) => Command::vertical_div(settings.vertical_div_label()),
            SettingChange::TimebaseDiv(_) => Command::timebase_div(settings.timebase_label()),
            SettingChange::VerticalOffset(_) => {
                Ok(Command::vertical_offset(settings.vertical_offset_volts()))
            }
            SettingChange::HorizontalOffset(_) => {
                Ok(Command::horizontal_offset(settings.horizontal_offset_code()))
            }
        }
    }

    /// Encode `change` if its wire value differs from the last one sent.
    pub fn encode_change(
        &mut self,
        change: SettingChange,
        settings: &InstrumentSettings,
    ) -> ProbeResult<Option<Command>> {
        let command = Self::command_for(change, settings)?;
        Ok(self.filter(command))
    }

    /// Pass `command` through unless it repeats the last value for its opcode.
    pub fn filter(&mut self, command: Command) -> Option<Command> {
        let slot = &mut self.last_sent[command.opcode.slot()];
        if *slot == Some(command.value) {
            return None;
        }
        *slot = Some(command.value);
        Some(command)
    }

    /// Forget the last value for `opcode`, e.g. after the send failed.
    pub fn invalidate(&mut self, opcode: Opcode) {
        self.last_sent[opcode.slot()] = None;
    }

    /// Last value recorded for `opcode`.
    #[must_use]
    pub fn last_sent(&self, opcode: Opcode) -> Option<u32> {
        self.last_sent[opcode.slot()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_layout_is_little_endian() {
        assert_eq!(encode(Opcode::VerticalDiv, 100), [1, 0, 100, 0, 0, 0]);
        assert_eq!(
            encode(Opcode::VerticalOffset, 0x0102_0304),
            [3, 0, 0x04, 0x03, 0x02, 0x01]
        );
    }

    #[test]
    fn vertical_div_in_millivolts() {
        assert_eq!(Command::vertical_div("100mV").unwrap().value, 100);
        assert_eq!(Command::vertical_div("1V").unwrap().value, 1000);
        assert_eq!(Command::vertical_div("10V").unwrap().value, 10_000);
        assert!(Command::vertical_div("loud").is_err());
    }

    #[test]
    fn timebase_prescaler() {
        let value = |label| Command::timebase_div(label).unwrap().value;
        assert_eq!(value("1µs"), 1);
        assert_eq!(value("2µs"), 1);
        assert_eq!(value("5µs"), 1);
        assert_eq!(value("10µs"), 2);
        assert_eq!(value("20µs"), 4);
        assert_eq!(value("200µs"), 40);
    }

    #[test]
    fn vertical_offset_is_biased() {
        assert_eq!(Command::vertical_offset(0.0).value, 4000);
        assert_eq!(Command::vertical_offset(1.25).value, 5250);
        assert_eq!(Command::vertical_offset(-4.0).value, 0);
        assert_eq!(Command::vertical_offset(0.0004).value, 4000);
    }

    #[test]
    fn horizontal_offset_is_raw() {
        assert_eq!(Command::horizontal_offset(1).value, 1);
        assert_eq!(Command::horizontal_offset(-1).value, u32::MAX);
    }

    #[test]
    fn bytes_parse_back() {
        let command = Command::horizontal_offset(-1);
        assert_eq!(Command::from_bytes(&command.to_bytes()), Some(command));
        assert_eq!(Command::from_bytes(&[9, 0, 0, 0, 0, 0]), None);
    }

    #[test]
    fn repeats_are_suppressed() {
        let mut encoder = CommandEncoder::new();
        let mut settings = InstrumentSettings::default();

        settings.apply(SettingChange::VerticalDiv(3)).unwrap();
        let first = encoder
            .encode_change(SettingChange::VerticalDiv(3), &settings)
            .unwrap();
        assert_eq!(
            first,
            Some(Command {
                opcode: Opcode::VerticalDiv,
                value: 100
            })
        );

        let repeat = encoder
            .encode_change(SettingChange::VerticalDiv(3), &settings)
            .unwrap();
        assert_eq!(repeat, None);

        // Another opcode is tracked independently.
        settings.apply(SettingChange::VerticalOffset(0)).unwrap();
        let offset = encoder
            .encode_change(SettingChange::VerticalOffset(0), &settings)
            .unwrap();
        assert_eq!(offset.map(|c| c.value), Some(4000));
    }

    #[test]
    fn distinct_labels_with_equal_codes_are_suppressed() {
        let mut encoder = CommandEncoder::new();
        let mut settings = InstrumentSettings::default();
        settings.apply(SettingChange::TimebaseDiv(0)).unwrap();
        assert!(encoder
            .encode_change(SettingChange::TimebaseDiv(0), &settings)
            .unwrap()
            .is_some());
        // 2µs also maps to prescaler 1.
        settings.apply(SettingChange::TimebaseDiv(1)).unwrap();
        assert!(encoder
            .encode_change(SettingChange::TimebaseDiv(1), &settings)
            .unwrap()
            .is_none());
    }

    #[test]
    fn seeded_encoder_suppresses_front_panel_defaults() {
        let defaults = InstrumentSettings::default();
        let mut encoder = CommandEncoder::from_settings(&defaults).unwrap();
        assert_eq!(encoder.last_sent(Opcode::VerticalDiv), Some(500));
        assert_eq!(encoder.last_sent(Opcode::TimebaseDiv), Some(1));
        assert_eq!(encoder.last_sent(Opcode::VerticalOffset), Some(4000));
        assert_eq!(encoder.last_sent(Opcode::HorizontalOffset), Some(0));

        let mut settings = defaults.clone();
        settings.apply(SettingChange::VerticalDiv(5)).unwrap();
        assert_eq!(
            encoder
                .encode_change(SettingChange::VerticalDiv(5), &settings)
                .unwrap(),
            None
        );
        settings.apply(SettingChange::VerticalDiv(3)).unwrap();
        assert!(encoder
            .encode_change(SettingChange::VerticalDiv(3), &settings)
            .unwrap()
            .is_some());
    }

    #[test]
    fn invalidate_allows_resend() {
        let mut encoder = CommandEncoder::new();
        let command = Command::horizontal_offset(1);
        assert!(encoder.filter(command).is_some());
        assert!(encoder.filter(command).is_none());
        encoder.invalidate(Opcode::HorizontalOffset);
        assert_eq!(encoder.last_sent(Opcode::HorizontalOffset), None);
        assert!(encoder.filter(command).is_some());
    }
}
