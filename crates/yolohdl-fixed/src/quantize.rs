//! Real-to-fixed-point quantizer
//!
//! The fraction is expanded by repeated doubling, one bit per step, so every
//! dyadic value the format can hold is reproduced exactly. Values outside the
//! representable range saturate instead of wrapping.

use crate::format::{FixedFormat, FixedPoint};

/// Quantize a real value into `format`
///
/// The integer part is truncated, the fraction is truncated after
/// `fraction_bits` binary digits, and negative values are stored as the
/// two's complement of their magnitude field.
pub fn quantize(value: f64, format: FixedFormat) -> FixedPoint {
    if value.is_nan() {
        return FixedPoint::zero(format);
    }

    let negative = value < 0.0;
    let magnitude = value.abs();
    let integer = magnitude.trunc();

    if integer >= (format.integer_bits as f64).exp2() {
        let raw = if negative {
            format.min_raw()
        } else {
            format.max_raw()
        };
        tracing::trace!("Quantizer saturated {} to {} in {}", value, raw, format);
        return FixedPoint::from_raw(raw, format);
    }

    let mut remainder = magnitude - integer;
    let mut fraction = 0u64;
    for _ in 0..format.fraction_bits {
        remainder *= 2.0;
        fraction <<= 1;
        if remainder >= 1.0 {
            fraction |= 1;
            remainder -= 1.0;
        }
    }

    let field = ((integer as u64) << format.fraction_bits) | fraction;
    if !negative || field == 0 {
        return FixedPoint::from_parts(false, field, format);
    }

    // invert and add one over the magnitude field, then prefix the sign
    let complement = (!field).wrapping_add(1) & format.magnitude_mask();
    FixedPoint::from_parts(true, complement, format)
}

/// Quantize a slice of values into `format`
pub fn quantize_all(values: &[f64], format: FixedFormat) -> Vec<FixedPoint> {
    values.iter().map(|&v| quantize(v, format)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_quantize_reference_values() {
        let q = quantize(2.58, FixedFormat::Q3_4);
        // 2 + 0.5625 (0b1001): truncated binary expansion of 0.58
        assert_eq!(q.bits(), 0b0010_1001);
        assert_eq!(q.to_f64(), 2.5625);

        let q = quantize(-2.58, FixedFormat::Q3_4);
        assert_eq!(q.raw(), -41);
        assert_eq!(q.bits(), 0b1101_0111);

        assert_eq!(quantize(0.125, FixedFormat::Q4_11).raw(), 256);
        assert_eq!(quantize(-0.125, FixedFormat::Q4_11).raw(), -256);
    }

    #[test]
    fn test_quantize_exact_binary_fractions() {
        // 0.1 would lose precision with a decimal-shift expansion
        let q = quantize(0.1, FixedFormat::Q4_11);
        assert_eq!(q.raw(), 204);
        assert!((q.to_f64() - 0.1).abs() < FixedFormat::Q4_11.lsb());
    }

    #[test]
    fn test_quantize_saturates_positive_overflow() {
        let format = FixedFormat::Q3_4;
        assert_eq!(quantize(8.0, format).raw(), 127);
        assert_eq!(quantize(1.0e9, format).raw(), 127);
        assert_eq!(quantize(f64::INFINITY, format).raw(), 127);
        assert_eq!(quantize(7.99, format).raw(), 127);
    }

    #[test]
    fn test_quantize_saturates_negative_overflow() {
        let format = FixedFormat::Q3_4;
        assert_eq!(quantize(-8.0, format).raw(), -127);
        assert_eq!(quantize(-1.0e9, format).raw(), -127);
        assert_eq!(quantize(f64::NEG_INFINITY, format).raw(), -127);
        assert_eq!(quantize(-8.0, format).bits(), 0b1000_0001);
    }

    #[test]
    fn test_quantize_tiny_negative_is_zero() {
        let q = quantize(-0.01, FixedFormat::Q3_4);
        assert!(q.is_zero());
        assert!(!q.is_negative());
        assert!(quantize(f64::NAN, FixedFormat::Q3_4).is_zero());
    }

    proptest! {
        #[test]
        fn quantize_error_within_one_lsb(
            integer_bits in 0u32..8,
            fraction_bits in 1u32..16,
            unit in -1.0f64..1.0,
        ) {
            let format = FixedFormat::new(integer_bits, fraction_bits).unwrap();
            let value = unit * format.max_value();
            let q = quantize(value, format);
            prop_assert!((q.to_f64() - value).abs() < format.lsb());
        }

        #[test]
        fn quantize_is_idempotent(
            integer_bits in 1u32..8,
            fraction_bits in 0u32..16,
            value in -300.0f64..300.0,
        ) {
            let format = FixedFormat::new(integer_bits, fraction_bits).unwrap();
            let q = quantize(value, format);
            prop_assert_eq!(quantize(q.to_f64(), format), q);
        }
    }
}
