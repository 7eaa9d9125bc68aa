//! yolohdl fixed-point arithmetic
//!
//! This crate provides the numeric building blocks shared by every
//! convolution datapath unit:
//! - Fixed-point formats and two's-complement words (`FixedFormat`, `FixedPoint`)
//! - The binary-expansion quantizer (`quantize`)
//! - The shift-add multiplier built from a partial-product adder tree
//! - Balanced and mirrored adder trees with arbitrary fan-in
//! - The leaky activation stage (arithmetic right shift on negatives)

pub mod activation;
pub mod adder_tree;
pub mod format;
pub mod multiplier;
pub mod quantize;

pub use activation::{LeakyRelu, DEFAULT_LEAK_SHIFT};
pub use adder_tree::{AdderTree, TreeNode, TreeShape};
pub use format::{FixedFormat, FixedPoint};
pub use multiplier::{ProductParts, ShiftAddMultiplier};
pub use quantize::{quantize, quantize_all};

use thiserror::Error;

/// Widest fixed-point word supported. Partial products need `2w-2` bits and
/// must fit in a `u64` lane.
pub const MAX_WIDTH: u32 = 32;

/// Errors raised while configuring fixed-point arithmetic
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FixedError {
    #[error("Fixed-point width {width} is outside 2..={max} bits")]
    UnsupportedWidth { width: u32, max: u32 },

    #[error("Leak shift {shift} must be between 1 and {limit} for a {width}-bit word")]
    InvalidShift { shift: u32, limit: u32, width: u32 },
}

pub type FixedResult<T> = Result<T, FixedError>;
