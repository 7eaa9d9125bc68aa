//! Manifest structure definitions

use crate::error::{ManifestError, Result};
use serde::{Deserialize, Serialize};
use yolohdl_fixed::{FixedFormat, DEFAULT_LEAK_SHIFT};

/// Generator configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    /// Fixed-point format of kernels and registers
    #[serde(default)]
    pub format: FormatConfig,

    /// Leaky activation
    #[serde(default)]
    pub activation: ActivationConfig,

    /// Batch-norm folding
    #[serde(default)]
    pub batch_norm: BatchNormConfig,

    /// Elaboration thread pool
    #[serde(default)]
    pub parallel: ParallelConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FormatConfig {
    #[serde(default = "default_integer_bits")]
    pub integer_bits: u32,
    #[serde(default = "default_fraction_bits")]
    pub fraction_bits: u32,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            integer_bits: default_integer_bits(),
            fraction_bits: default_fraction_bits(),
        }
    }
}

fn default_integer_bits() -> u32 {
    FixedFormat::Q4_11.integer_bits
}

fn default_fraction_bits() -> u32 {
    FixedFormat::Q4_11.fraction_bits
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActivationConfig {
    /// Negative values are scaled by `2^-leak_shift`
    #[serde(default = "default_leak_shift")]
    pub leak_shift: u32,
}

impl Default for ActivationConfig {
    fn default() -> Self {
        Self {
            leak_shift: default_leak_shift(),
        }
    }
}

fn default_leak_shift() -> u32 {
    DEFAULT_LEAK_SHIFT
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchNormConfig {
    /// Added to the variance before the square root
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
}

impl Default for BatchNormConfig {
    fn default() -> Self {
        Self {
            epsilon: default_epsilon(),
        }
    }
}

fn default_epsilon() -> f64 {
    1e-5
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParallelConfig {
    /// Worker threads, 0 for one per CPU
    #[serde(default)]
    pub worker_threads: usize,
}

impl Manifest {
    /// Validate the manifest
    pub fn validate(&self) -> Result<()> {
        let format = self.fixed_format()?;

        let limit = format.magnitude_bits();
        if self.activation.leak_shift == 0 || self.activation.leak_shift > limit {
            return Err(ManifestError::Validation(format!(
                "activation.leak_shift must be between 1 and {} for {}",
                limit, format
            )));
        }

        if !self.batch_norm.epsilon.is_finite() || self.batch_norm.epsilon < 0.0 {
            return Err(ManifestError::Validation(format!(
                "batch_norm.epsilon must be a non-negative number, got {}",
                self.batch_norm.epsilon
            )));
        }

        Ok(())
    }

    /// Fixed-point format described by `[format]`
    pub fn fixed_format(&self) -> Result<FixedFormat> {
        FixedFormat::new(self.format.integer_bits, self.format.fraction_bits)
            .map_err(|e| ManifestError::InvalidFormat(e.to_string()))
    }

    /// Resolved worker thread count
    pub fn worker_threads(&self) -> usize {
        match self.parallel.worker_threads {
            0 => num_cpus::get(),
            n => n,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_leak_shift() {
        let mut manifest = Manifest::default();
        assert!(manifest.validate().is_ok());

        manifest.activation.leak_shift = 0;
        assert!(matches!(manifest.validate(), Err(ManifestError::Validation(_))));

        manifest.activation.leak_shift = 16;
        assert!(manifest.validate().is_err());

        manifest.activation.leak_shift = 15;
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_validate_format() {
        let manifest = Manifest {
            format: FormatConfig {
                integer_bits: 20,
                fraction_bits: 20,
            },
            ..Manifest::default()
        };
        assert!(matches!(manifest.validate(), Err(ManifestError::InvalidFormat(_))));
    }

    #[test]
    fn test_validate_epsilon() {
        let mut manifest = Manifest::default();
        manifest.batch_norm.epsilon = -1.0;
        assert!(manifest.validate().is_err());
        manifest.batch_norm.epsilon = f64::NAN;
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_worker_threads() {
        let mut manifest = Manifest::default();
        assert_eq!(manifest.worker_threads(), num_cpus::get());
        manifest.parallel.worker_threads = 3;
        assert_eq!(manifest.worker_threads(), 3);
    }
}
