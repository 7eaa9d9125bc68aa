//! Shared convolution parameters

use serde::{Deserialize, Serialize};
use yolohdl_fixed::{FixedFormat, DEFAULT_LEAK_SHIFT};

/// Shape and arithmetic of a convolution datapath
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvConfig {
    /// Kernel side; a window holds `size * size` samples
    pub size: usize,
    /// Input channels
    pub channels: usize,
    /// Word format of kernels, registers and full-width outputs
    pub format: FixedFormat,
    /// Binary (XNOR) arithmetic instead of shift-add products
    pub binary: bool,
    /// Input samples are 1-bit signs
    pub bin_input: bool,
    /// Output is the 1-bit sign of the normalized value
    pub bin_output: bool,
    /// Leak factor `2^-leak_shift` of the activation stage
    pub leak_shift: u32,
}

impl Default for ConvConfig {
    fn default() -> Self {
        Self {
            size: 3,
            channels: 3,
            format: FixedFormat::Q4_11,
            binary: false,
            bin_input: false,
            bin_output: false,
            leak_shift: DEFAULT_LEAK_SHIFT,
        }
    }
}

impl ConvConfig {
    /// Samples per channel window
    pub fn window_len(&self) -> usize {
        self.size * self.size
    }

    /// Weights per filter across all channels
    pub fn filter_len(&self) -> usize {
        self.window_len() * self.channels
    }

    pub fn input_width(&self) -> usize {
        if self.bin_input {
            1
        } else {
            self.format.width() as usize
        }
    }

    pub fn output_width(&self) -> usize {
        if self.bin_output {
            1
        } else {
            self.format.width() as usize
        }
    }
}

/// Enable pulses of the convolution pipeline stages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConvEnables {
    pub mult: bool,
    pub sum: bool,
    pub channel: bool,
    pub batch: bool,
    pub act: bool,
}

impl ConvEnables {
    pub fn all() -> Self {
        Self {
            mult: true,
            sum: true,
            channel: true,
            batch: true,
            act: true,
        }
    }
}

/// Per-filter coefficients folded into the batch stage
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Normalization {
    /// Fused batch normalization
    Batch {
        gamma: f64,
        beta: f64,
        mean: f64,
        variance: f64,
        epsilon: f64,
    },
    /// Plain convolution bias with unit scale
    Bias(f64),
}

impl Normalization {
    /// Fold into `(scale, bias)` so that `y = acc * scale + bias`
    pub fn fold(&self) -> (f64, f64) {
        match *self {
            Normalization::Batch {
                gamma,
                beta,
                mean,
                variance,
                epsilon,
            } => {
                let scale = gamma / (variance + epsilon).sqrt();
                (scale, beta - mean * scale)
            }
            Normalization::Bias(bias) => (1.0, bias),
        }
    }
}
