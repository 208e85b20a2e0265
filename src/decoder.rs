//! Raw wire code to sample voltage.
//!
//! The instrument's ADC produces 12-bit codes. Two encodings are seen on the wire:
//!
//! - [`SampleEncoding::BitReversedTwosComplement`] (network variant): the ADC register is
//!   read with its bit order swapped, so the 12 bits must be reversed before they are
//!   read as two's complement. The resulting voltage is a bijection over the 4096 codes
//!   but is not monotonic in the raw code. Adjacent raw codes routinely decode to
//!   distant voltages.
//! - [`SampleEncoding::OffsetBinary`] (serial variant): code 2048 is zero volts.
//!
//! In both cases bits above the low 12 are ignored, so every `u16` decodes.

use crate::config::DecoderConfig;
use crate::frame::RawFrame;
use serde::{Deserialize, Serialize};

/// Mask selecting the 12 ADC bits of a wire code.
pub const CODE_MASK: u16 = 0x0FFF;

/// Half the 12-bit code range; the divisor that maps codes onto `[-1, 1)`.
pub const HALF_SCALE: f64 = 2048.0;

const FULL_SCALE: i32 = 4096;

/// How the 12 ADC bits are laid out in a wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleEncoding {
    /// Bit-reversed 12-bit two's complement
    #[default]
    BitReversedTwosComplement,
    /// Offset binary, midscale is zero
    OffsetBinary,
}

/// Reverse the order of the low 12 bits.
#[inline]
#[must_use]
pub fn reverse_12(code: u16) -> u16 {
    (code & CODE_MASK).reverse_bits() >> 4
}

/// Pure code-to-voltage transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleDecoder {
    reference_voltage: f64,
    encoding: SampleEncoding,
}

impl SampleDecoder {
    /// Creates a decoder for the given reference voltage and encoding.
    #[must_use]
    pub fn new(reference_voltage: f64, encoding: SampleEncoding) -> Self {
        Self {
            reference_voltage,
            encoding,
        }
    }

    /// Creates a decoder from the `[decoder]` configuration section.
    #[must_use]
    pub fn from_config(config: &DecoderConfig) -> Self {
        Self::new(config.reference_voltage, config.encoding)
    }

    /// The configured reference voltage.
    #[must_use]
    pub fn reference_voltage(&self) -> f64 {
        self.reference_voltage
    }

    /// The configured wire encoding.
    #[must_use]
    pub fn encoding(&self) -> SampleEncoding {
        self.encoding
    }

    /// Decode one wire code. Total over `u16`; high bits are masked off.
    #[inline]
    #[must_use]
    pub fn decode(&self, raw: u16) -> f64 {
        let signed = match self.encoding {
            SampleEncoding::BitReversedTwosComplement => {
                let value = i32::from(reverse_12(raw));
                if value >= FULL_SCALE / 2 {
                    value - FULL_SCALE
                } else {
                    value
                }
            }
            SampleEncoding::OffsetBinary => i32::from(raw & CODE_MASK) - FULL_SCALE / 2,
        };
        f64::from(signed) / HALF_SCALE * self.reference_voltage
    }

    /// Decode every code of a frame, preserving order.
    #[must_use]
    pub fn decode_frame(&self, frame: &RawFrame) -> Vec<f64> {
        frame.codes().iter().map(|&raw| self.decode(raw)).collect()
    }

    /// Nearest wire code for a voltage, saturating at the ends of the code range.
    ///
    /// Used by the simulated instrument to produce frames the real decoder accepts.
    #[must_use]
    pub fn encode_volts(&self, volts: f64) -> u16 {
        let half = FULL_SCALE / 2;
        let scaled = (volts / self.reference_voltage * HALF_SCALE).round();
        let signed = if scaled.is_nan() {
            0
        } else {
            (scaled as i32).clamp(-half, half - 1)
        };
        match self.encoding {
            SampleEncoding::BitReversedTwosComplement => {
                let field = (signed.rem_euclid(FULL_SCALE)) as u16;
                reverse_12(field)
            }
            SampleEncoding::OffsetBinary => (signed + half) as u16,
        }
    }
}

impl Default for SampleDecoder {
    fn default() -> Self {
        Self::from_config(&DecoderConfig::default())
    }
}
