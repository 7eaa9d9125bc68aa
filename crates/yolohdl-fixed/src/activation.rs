//! Leaky activation stage
//!
//! Negative words are scaled by `2^-shift` with an arithmetic right shift:
//! the word is shifted and its top `shift` bits are filled with ones. Positive
//! and zero words pass through unchanged.

use crate::format::{FixedFormat, FixedPoint};
use crate::{FixedError, FixedResult};

/// Default leak factor of 1/8
pub const DEFAULT_LEAK_SHIFT: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeakyRelu {
    shift: u32,
    format: FixedFormat,
    fill: u64,
}

impl LeakyRelu {
    pub fn new(shift: u32, format: FixedFormat) -> FixedResult<Self> {
        let limit = format.magnitude_bits();
        if shift == 0 || shift > limit {
            return Err(FixedError::InvalidShift {
                shift,
                limit,
                width: format.width(),
            });
        }

        let fill = format.word_mask() & !(format.word_mask() >> shift);
        Ok(Self {
            shift,
            format,
            fill,
        })
    }

    pub fn with_default_shift(format: FixedFormat) -> FixedResult<Self> {
        Self::new(DEFAULT_LEAK_SHIFT, format)
    }

    pub fn shift(&self) -> u32 {
        self.shift
    }

    pub fn apply(&self, value: FixedPoint) -> FixedPoint {
        let value = FixedPoint::from_bits(value.bits(), self.format);
        if !value.is_negative() {
            return value;
        }
        FixedPoint::from_bits((value.bits() >> self.shift) | self.fill, self.format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quantize::quantize;

    #[test]
    fn test_leaky_passes_non_negative() {
        let leaky = LeakyRelu::with_default_shift(FixedFormat::Q4_11).unwrap();
        let zero = FixedPoint::zero(FixedFormat::Q4_11);
        assert_eq!(leaky.apply(zero), zero);

        let positive = quantize(3.75, FixedFormat::Q4_11);
        assert_eq!(leaky.apply(positive), positive);
    }

    #[test]
    fn test_leaky_scales_negative_by_eighth() {
        let format = FixedFormat::Q4_11;
        let leaky = LeakyRelu::with_default_shift(format).unwrap();
        for value in [-0.001, -0.5, -1.0, -3.3, -15.9] {
            let out = leaky.apply(quantize(value, format));
            assert!(out.is_negative(), "value={value}");
            assert!((out.to_f64() - value / 8.0).abs() <= format.lsb(), "value={value}");
        }
    }

    #[test]
    fn test_leaky_fill_bits() {
        let format = FixedFormat::Q3_4;
        let leaky = LeakyRelu::new(3, format).unwrap();
        // -2.0 = 0b1110_0000 >> 3 = 0b0001_1100, fill 0b1110_0000
        let out = leaky.apply(FixedPoint::from_raw(-32, format));
        assert_eq!(out.bits(), 0b1111_1100);
        assert_eq!(out.raw(), -4);
    }

    #[test]
    fn test_leaky_rejects_bad_shift() {
        assert!(LeakyRelu::new(0, FixedFormat::Q3_4).is_err());
        assert!(LeakyRelu::new(8, FixedFormat::Q3_4).is_err());
        assert!(LeakyRelu::new(7, FixedFormat::Q3_4).is_ok());
    }

    #[test]
    fn test_default_shift_checks_narrow_formats() {
        // Q1.0 has a single magnitude bit
        let narrow = FixedFormat::new(1, 0).unwrap();
        assert!(matches!(
            LeakyRelu::with_default_shift(narrow),
            Err(FixedError::InvalidShift { shift: 3, limit: 1, .. })
        ));
        let three_bits = FixedFormat::new(1, 1).unwrap();
        assert!(LeakyRelu::with_default_shift(three_bits).is_err());
        assert_eq!(
            LeakyRelu::with_default_shift(FixedFormat::Q3_4).unwrap().shift(),
            DEFAULT_LEAK_SHIFT
        );
    }
}
