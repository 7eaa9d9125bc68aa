//! Single-channel convolution unit
//!
//! One window of `size * size` samples is reduced against one kernel in two
//! pipeline stages:
//!
//! ```text
//!   window ──► per-pixel term ──► balanced tree ──► [en_mult] pipeline reg
//!   pipeline reg ──► [en_sum] output reg
//! ```
//!
//! The per-pixel term depends on the strategy. Value units multiply each
//! sample by its quantized weight with the shift-add multiplier. Binary units
//! compare sample and weight signs (+1 on agreement, -1 otherwise) and the
//! output stage emits `+alpha` or `-alpha` from the sign of the agreement.

use crate::config::ConvConfig;
use crate::{check_inputs, Elaborate, UnitError, UnitResult};
use yolohdl_fixed::{quantize, quantize_all, AdderTree, FixedPoint, ShiftAddMultiplier};
use yolohdl_mir::{Entity, UnitCoord, UnitKind};

/// Arithmetic strategy of a convolution unit
#[derive(Debug, Clone)]
pub enum ConvStrategy {
    Value {
        kernel: Vec<FixedPoint>,
        multiplier: ShiftAddMultiplier,
    },
    /// Sign-agreement convolution scaled by `alpha`
    ///
    /// `alpha` is the mean magnitude of the kernel, not its signed mean:
    /// per-pixel signs live in `signs`, so `alpha` is always non-negative.
    Binary {
        /// Quantized mean magnitude of the kernel
        alpha: FixedPoint,
        /// Per-pixel weight sign, true when negative
        signs: Vec<bool>,
    },
}

#[derive(Debug, Clone)]
pub struct ConvUnit {
    coord: UnitCoord,
    config: ConvConfig,
    strategy: ConvStrategy,
    tree: AdderTree,
    pipeline: i64,
    output: FixedPoint,
}

impl ConvUnit {
    /// Build a unit from `size * size` real kernel weights
    pub fn new(coord: UnitCoord, config: ConvConfig, weights: &[f64]) -> UnitResult<Self> {
        config.format.validate()?;
        let kind = if config.binary {
            UnitKind::BinConvUnit
        } else {
            UnitKind::ConvUnit
        };
        let unit = coord.entity_name(kind);

        if config.size == 0 {
            return Err(UnitError::InvalidConfig {
                unit,
                reason: "kernel size must be at least 1".to_string(),
            });
        }
        if !config.binary && config.bin_input {
            return Err(UnitError::InvalidConfig {
                unit,
                reason: "value convolution needs full-width input samples".to_string(),
            });
        }
        if weights.len() != config.window_len() {
            return Err(UnitError::WeightCount {
                unit,
                expected: config.window_len(),
                found: weights.len(),
            });
        }

        let strategy = if config.binary {
            let mean = weights.iter().map(|w| w.abs()).sum::<f64>() / weights.len() as f64;
            ConvStrategy::Binary {
                alpha: quantize(mean, config.format),
                signs: weights.iter().map(|&w| w < 0.0).collect(),
            }
        } else {
            ConvStrategy::Value {
                kernel: quantize_all(weights, config.format),
                multiplier: ShiftAddMultiplier::new(config.format),
            }
        };

        Ok(Self {
            coord,
            config,
            strategy,
            tree: AdderTree::balanced(config.window_len()),
            pipeline: 0,
            output: FixedPoint::zero(config.format),
        })
    }

    pub fn config(&self) -> &ConvConfig {
        &self.config
    }

    pub fn strategy(&self) -> &ConvStrategy {
        &self.strategy
    }

    pub fn is_binary(&self) -> bool {
        matches!(self.strategy, ConvStrategy::Binary { .. })
    }

    /// Output register
    pub fn output(&self) -> FixedPoint {
        self.output
    }

    /// Value latched by the multiply stage (raw units, or agreement count)
    pub fn pipeline_register(&self) -> i64 {
        self.pipeline
    }

    pub fn reset(&mut self) {
        self.pipeline = 0;
        self.output = FixedPoint::zero(self.config.format);
    }

    /// Advance one clock edge
    ///
    /// `window` holds `size * size` words at the input width, row-major.
    pub fn step(&mut self, window: &[u64], en_mult: bool, en_sum: bool) -> UnitResult<()> {
        check_inputs(&self.name(), self.config.window_len(), window.len())?;
        let latched = self.pipeline;

        if en_sum {
            self.output = match &self.strategy {
                ConvStrategy::Value { .. } => {
                    FixedPoint::saturating_from_raw(latched, self.config.format)
                }
                ConvStrategy::Binary { alpha, .. } => {
                    if latched >= 0 {
                        *alpha
                    } else {
                        alpha.saturating_neg()
                    }
                }
            };
        }

        if en_mult {
            let format = self.config.format;
            self.pipeline = self
                .window_sum(window)
                .clamp(format.min_raw(), format.max_raw());
        }
        Ok(())
    }

    /// Exact tree sum of the per-pixel terms of `window`
    fn window_sum(&self, window: &[u64]) -> i64 {
        let terms: Vec<i64> = match &self.strategy {
            ConvStrategy::Value { kernel, multiplier } => window
                .iter()
                .zip(kernel)
                .map(|(&sample, &weight)| {
                    let sample = FixedPoint::from_bits(sample, self.config.format);
                    multiplier.multiply(sample, weight).raw()
                })
                .collect(),
            ConvStrategy::Binary { signs, .. } => {
                let sign_bit = self.config.input_width() - 1;
                window
                    .iter()
                    .zip(signs)
                    .map(|(&sample, &negative)| {
                        let sample_negative = (sample >> sign_bit) & 1 == 1;
                        if sample_negative == negative {
                            1
                        } else {
                            -1
                        }
                    })
                    .collect()
            }
        };
        self.tree.sum(&terms).unwrap_or(0)
    }
}

impl Elaborate for ConvUnit {
    fn coord(&self) -> UnitCoord {
        self.coord
    }

    fn name(&self) -> String {
        let kind = if self.is_binary() {
            UnitKind::BinConvUnit
        } else {
            UnitKind::ConvUnit
        };
        self.coord.entity_name(kind)
    }

    fn entity(&self) -> Entity {
        let width = self.config.format.width() as usize;
        let entity = Entity::new(self.name())
            .with_clock_reset()
            .enables(&["en_mult", "en_sum"])
            .input("input", self.config.window_len() * self.config.input_width())
            .output("output", width);

        match &self.strategy {
            ConvStrategy::Value { kernel, .. } => kernel
                .iter()
                .fold(entity, |e, weight| e.constant("kernel", width, weight.bits())),
            ConvStrategy::Binary { alpha, signs } => signs.iter().fold(
                entity.constant("alpha", width, alpha.bits()),
                |e, &negative| e.constant("sign", 1, negative as u64),
            ),
        }
    }
}
