//! yolohdl datapath units
//!
//! Each unit is a cycle model advanced by `step` (one rising clock edge with
//! the given enables) and elaborates into a structural `Entity`:
//! - `ConvUnit`: one channel window against one kernel, value or binary
//! - `MultiChannelConvUnit`: channel accumulation, fused batch norm, leaky
//!   activation
//! - `ScatterUnit` / `BufferLayer`: line buffers producing sliding windows
//! - `MaxPoolUnit` / `MaxPoolLayer`: 2x2 max pooling
//! - `ConvLayerPart` / `ConvLayer`: filter groups sharing one input bus
//!
//! Registers sample pre-edge values: every register updated in a `step`
//! sees the state from before that step.

pub mod buffer_layer;
pub mod config;
pub mod conv_layer;
pub mod conv_unit;
pub mod max_pool;
pub mod multi_channel;
pub mod scatter;

pub use buffer_layer::BufferLayer;
pub use config::{ConvConfig, ConvEnables, Normalization};
pub use conv_layer::{conv_layer_entity, ConvLayer, ConvLayerPart};
pub use conv_unit::{ConvStrategy, ConvUnit};
pub use max_pool::{MaxPoolLayer, MaxPoolUnit};
pub use multi_channel::MultiChannelConvUnit;
pub use scatter::{ScatterControl, ScatterUnit};

use thiserror::Error;
use yolohdl_fixed::FixedError;
use yolohdl_mir::{Entity, UnitCoord};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum UnitError {
    #[error("{unit}: expected {expected} weights, found {found}")]
    WeightCount {
        unit: String,
        expected: usize,
        found: usize,
    },

    #[error("{unit}: expected {expected} normalization entries, found {found}")]
    NormCount {
        unit: String,
        expected: usize,
        found: usize,
    },

    #[error("{unit}: expected {expected} input words, found {found}")]
    InputCount {
        unit: String,
        expected: usize,
        found: usize,
    },

    #[error("{unit}: {reason}")]
    InvalidConfig { unit: String, reason: String },

    #[error(transparent)]
    Fixed(#[from] FixedError),
}

pub type UnitResult<T> = Result<T, UnitError>;

/// Structural elaboration shared by every unit
pub trait Elaborate {
    fn coord(&self) -> UnitCoord;

    /// Entity name derived from the coordinate
    fn name(&self) -> String;

    /// Entity of this unit alone
    fn entity(&self) -> Entity;

    /// Entity of this unit followed by every descendant entity
    fn elaborate(&self) -> Vec<Entity> {
        vec![self.entity()]
    }
}

/// Check that a unit received exactly `expected` input words
pub(crate) fn check_inputs(unit: &str, expected: usize, found: usize) -> UnitResult<()> {
    if expected != found {
        return Err(UnitError::InputCount {
            unit: unit.to_string(),
            expected,
            found,
        });
    }
    Ok(())
}

/// Mask of the low `width` bits
pub(crate) fn word_mask(width: usize) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// Net expression selecting bits `[lo + width - 1 : lo]` of `bus`
pub(crate) fn bus_slice(bus: &str, index: usize, width: usize) -> String {
    let lo = index * width;
    format!("{bus}[{}:{lo}]", lo + width - 1)
}
