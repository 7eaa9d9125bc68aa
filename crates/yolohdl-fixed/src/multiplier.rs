//! Shift-add fixed-point multiplier
//!
//! The product is assembled from explicit partial products instead of a
//! multiplier primitive, so every instantiation has the same adder-tree
//! structure and pipeline boundaries:
//!
//! ```text
//!   |a| bit i ──► pp[i] = |b| << i      (2w-2 bit field, zero when bit clear)
//!   pp[0..w-1] ──► balanced adder tree ──► >> fraction_bits ──► magnitude
//!   sign(a) ^ sign(b), gated by |a| != 0 && |b| != 0 ──► sign
//! ```
//!
//! Magnitudes are full two's-complement magnitudes of the operand words, so
//! a partial product is `|b| << i` with no fill pattern when the top bit of
//! `|b|` is set. The summed partial products equal the exact integer product
//! before truncation.

use crate::adder_tree::AdderTree;
use crate::format::{FixedFormat, FixedPoint};

/// Sign and magnitude leaving the multiplier before re-encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProductParts {
    pub sign: bool,
    pub magnitude: u64,
}

/// Fixed-point multiplier for one format
#[derive(Debug, Clone)]
pub struct ShiftAddMultiplier {
    format: FixedFormat,
    tree: AdderTree,
}

impl ShiftAddMultiplier {
    pub fn new(format: FixedFormat) -> Self {
        Self {
            format,
            tree: AdderTree::balanced(format.magnitude_bits() as usize),
        }
    }

    pub fn format(&self) -> FixedFormat {
        self.format
    }

    /// Adder levels in the partial-product tree
    pub fn depth(&self) -> usize {
        self.tree.depth()
    }

    /// Width of each partial-product field
    pub fn partial_width(&self) -> u32 {
        2 * self.format.width() - 2
    }

    /// Partial products of two unsigned magnitudes, one per bit of `a`
    pub fn partial_products(&self, a: u64, b: u64) -> Vec<u64> {
        let field_mask = (1u64 << self.partial_width()) - 1;
        (0..self.format.magnitude_bits())
            .map(|i| {
                if (a >> i) & 1 == 1 {
                    (b << i) & field_mask
                } else {
                    0
                }
            })
            .collect()
    }

    /// Multiply two words and return the sign and magnitude separately
    ///
    /// Operand words are read at the multiplier's width.
    pub fn multiply_parts(&self, a: FixedPoint, b: FixedPoint) -> ProductParts {
        let a = FixedPoint::from_bits(a.bits(), self.format);
        let b = FixedPoint::from_bits(b.bits(), self.format);
        let (mag_a, mag_b) = (a.magnitude(), b.magnitude());

        let partials: Vec<i64> = self
            .partial_products(mag_a, mag_b)
            .into_iter()
            .map(|p| p as i64)
            .collect();
        let total = self.tree.sum(&partials).unwrap_or(0) as u64;

        let magnitude = (total >> self.format.fraction_bits).min(self.format.magnitude_mask());
        let sign = (a.is_negative() ^ b.is_negative()) && mag_a != 0 && mag_b != 0;
        ProductParts { sign, magnitude }
    }

    /// Multiply two words, saturating the magnitude to the format
    pub fn multiply(&self, a: FixedPoint, b: FixedPoint) -> FixedPoint {
        let parts = self.multiply_parts(a, b);
        let raw = parts.magnitude as i64;
        FixedPoint::from_raw(if parts.sign { -raw } else { raw }, self.format)
    }
}
