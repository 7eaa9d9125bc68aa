//! Fixed-point formats and two's-complement words
//!
//! A `FixedFormat` splits a word into one sign bit, `integer_bits` magnitude
//! bits and `fraction_bits` fractional bits. A `FixedPoint` is a word of that
//! width stored in the low bits of a `u64`; the upper bits are always clear.

use crate::{FixedError, FixedResult, MAX_WIDTH};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Integer/fraction split of a signed fixed-point word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FixedFormat {
    /// Magnitude bits left of the binary point
    pub integer_bits: u32,
    /// Bits right of the binary point
    pub fraction_bits: u32,
}

impl Default for FixedFormat {
    fn default() -> Self {
        Self::Q4_11
    }
}

impl FixedFormat {
    /// 16-bit word used by the full-precision layers
    pub const Q4_11: FixedFormat = FixedFormat {
        integer_bits: 4,
        fraction_bits: 11,
    };

    /// 8-bit word used by the reduced-precision layers
    pub const Q3_4: FixedFormat = FixedFormat {
        integer_bits: 3,
        fraction_bits: 4,
    };

    pub fn new(integer_bits: u32, fraction_bits: u32) -> FixedResult<Self> {
        let format = Self {
            integer_bits,
            fraction_bits,
        };
        format.validate()?;
        Ok(format)
    }

    /// Check the width against the supported range
    pub fn validate(&self) -> FixedResult<()> {
        let width = self.width();
        if !(2..=MAX_WIDTH).contains(&width) {
            return Err(FixedError::UnsupportedWidth {
                width,
                max: MAX_WIDTH,
            });
        }
        Ok(())
    }

    /// Total word width including the sign bit
    pub fn width(&self) -> u32 {
        1 + self.integer_bits + self.fraction_bits
    }

    /// Width of the magnitude field (everything but the sign bit)
    pub fn magnitude_bits(&self) -> u32 {
        self.width() - 1
    }

    pub fn word_mask(&self) -> u64 {
        (1u64 << self.width()) - 1
    }

    pub fn magnitude_mask(&self) -> u64 {
        (1u64 << self.magnitude_bits()) - 1
    }

    pub fn sign_bit(&self) -> u64 {
        1u64 << self.magnitude_bits()
    }

    /// Largest raw integer the format encodes
    pub fn max_raw(&self) -> i64 {
        self.magnitude_mask() as i64
    }

    /// Most negative raw integer produced by saturation (symmetric range)
    pub fn min_raw(&self) -> i64 {
        -self.max_raw()
    }

    /// Value of one least significant bit
    pub fn lsb(&self) -> f64 {
        (-(self.fraction_bits as f64)).exp2()
    }

    pub fn max_value(&self) -> f64 {
        self.max_raw() as f64 * self.lsb()
    }

    pub fn min_value(&self) -> f64 {
        self.min_raw() as f64 * self.lsb()
    }
}

impl fmt::Display for FixedFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Q{}.{}", self.integer_bits, self.fraction_bits)
    }
}

/// A signed fixed-point word in two's complement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FixedPoint {
    bits: u64,
    format: FixedFormat,
}

impl FixedPoint {
    pub fn zero(format: FixedFormat) -> Self {
        Self { bits: 0, format }
    }

    /// Reinterpret the low `width` bits of `bits` as a word
    pub fn from_bits(bits: u64, format: FixedFormat) -> Self {
        Self {
            bits: bits & format.word_mask(),
            format,
        }
    }

    /// Encode a raw integer, wrapping like a hardware bus of the format width
    pub fn from_raw(raw: i64, format: FixedFormat) -> Self {
        Self::from_bits(raw as u64, format)
    }

    /// Encode a raw integer, clamping to the symmetric representable range
    pub fn saturating_from_raw(raw: i64, format: FixedFormat) -> Self {
        Self::from_raw(raw.clamp(format.min_raw(), format.max_raw()), format)
    }

    /// Assemble a word from its sign bit and magnitude field
    pub fn from_parts(sign: bool, field: u64, format: FixedFormat) -> Self {
        let sign_bit = if sign { format.sign_bit() } else { 0 };
        Self {
            bits: sign_bit | (field & format.magnitude_mask()),
            format,
        }
    }

    /// Split the word into its sign bit and magnitude field
    pub fn parts(&self) -> (bool, u64) {
        (self.is_negative(), self.bits & self.format.magnitude_mask())
    }

    pub fn bits(&self) -> u64 {
        self.bits
    }

    pub fn format(&self) -> FixedFormat {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.format.width()
    }

    /// Sign-extended integer value of the word
    pub fn raw(&self) -> i64 {
        let (sign, field) = self.parts();
        if sign {
            field as i64 - self.format.sign_bit() as i64
        } else {
            field as i64
        }
    }

    pub fn is_negative(&self) -> bool {
        self.bits & self.format.sign_bit() != 0
    }

    pub fn is_zero(&self) -> bool {
        self.bits == 0
    }

    /// Unsigned magnitude, saturated to the magnitude field
    pub fn magnitude(&self) -> u64 {
        self.raw().unsigned_abs().min(self.format.magnitude_mask())
    }

    pub fn to_f64(&self) -> f64 {
        self.raw() as f64 * self.format.lsb()
    }

    pub fn saturating_add(&self, other: &FixedPoint) -> FixedPoint {
        Self::saturating_from_raw(self.raw() + other.raw(), self.format)
    }

    pub fn saturating_neg(&self) -> FixedPoint {
        Self::saturating_from_raw(-self.raw(), self.format)
    }
}

impl fmt::Display for FixedPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:0width$b})",
            self.to_f64(),
            self.bits,
            width = self.width() as usize
        )
    }
}
