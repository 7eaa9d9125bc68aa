//! Multi-channel convolution unit
//!
//! One filter across every input channel. Per-channel `ConvUnit`s feed three
//! registered stages, each with its own enable:
//! - `en_channel`: mirrored adder tree over the channel outputs into
//!   `reg_accumulator`
//! - `en_batch`: `reg_batch = reg_accumulator * scale + bias` with the
//!   batch-norm coefficients folded and quantized at construction
//! - `en_act`: leaky activation into the output register, or only the sign
//!   bit of `reg_batch` for 1-bit outputs

use crate::config::{ConvConfig, ConvEnables, Normalization};
use crate::conv_unit::ConvUnit;
use crate::{bus_slice, check_inputs, Elaborate, UnitError, UnitResult};
use tracing::debug;
use yolohdl_fixed::{quantize, AdderTree, FixedPoint, LeakyRelu, ShiftAddMultiplier};
use yolohdl_mir::{Entity, Instance, UnitCoord, UnitKind};

#[derive(Debug, Clone)]
pub struct MultiChannelConvUnit {
    coord: UnitCoord,
    config: ConvConfig,
    units: Vec<ConvUnit>,
    tree: AdderTree,
    multiplier: ShiftAddMultiplier,
    leaky: LeakyRelu,
    scale: FixedPoint,
    bias: FixedPoint,
    reg_accumulator: FixedPoint,
    reg_batch: FixedPoint,
    output: u64,
}

impl MultiChannelConvUnit {
    /// Build one filter from `size * size * channels` weights, channel-major
    pub fn new(
        coord: UnitCoord,
        config: ConvConfig,
        weights: &[f64],
        norm: Normalization,
    ) -> UnitResult<Self> {
        let name = coord.entity_name(UnitKind::MultiChannelConvUnit);
        if config.channels == 0 || config.size == 0 {
            return Err(UnitError::InvalidConfig {
                unit: name,
                reason: "channels and kernel size must be at least 1".to_string(),
            });
        }
        if weights.len() != config.filter_len() {
            return Err(UnitError::WeightCount {
                unit: name,
                expected: config.filter_len(),
                found: weights.len(),
            });
        }

        let units = weights
            .chunks(config.window_len())
            .enumerate()
            .map(|(channel, bucket)| ConvUnit::new(coord.with_channel(channel), config, bucket))
            .collect::<UnitResult<Vec<_>>>()?;

        let (scale, bias) = norm.fold();
        debug!(
            "{}: {} channels, scale {:.6}, bias {:.6}",
            name, config.channels, scale, bias
        );

        Ok(Self {
            coord,
            config,
            units,
            tree: AdderTree::mirrored(config.channels),
            multiplier: ShiftAddMultiplier::new(config.format),
            leaky: LeakyRelu::new(config.leak_shift, config.format)?,
            scale: quantize(scale, config.format),
            bias: quantize(bias, config.format),
            reg_accumulator: FixedPoint::zero(config.format),
            reg_batch: FixedPoint::zero(config.format),
            output: 0,
        })
    }

    pub fn config(&self) -> &ConvConfig {
        &self.config
    }

    pub fn channel_units(&self) -> &[ConvUnit] {
        &self.units
    }

    pub fn scale(&self) -> FixedPoint {
        self.scale
    }

    pub fn bias(&self) -> FixedPoint {
        self.bias
    }

    pub fn reg_accumulator(&self) -> FixedPoint {
        self.reg_accumulator
    }

    pub fn reg_batch(&self) -> FixedPoint {
        self.reg_batch
    }

    /// Output register bits at the output width
    pub fn output(&self) -> u64 {
        self.output
    }

    pub fn reset(&mut self) {
        self.units.iter_mut().for_each(ConvUnit::reset);
        self.reg_accumulator = FixedPoint::zero(self.config.format);
        self.reg_batch = FixedPoint::zero(self.config.format);
        self.output = 0;
    }

    /// Advance one clock edge
    ///
    /// `input` holds one window per channel, channel-major, each word at
    /// the input width.
    pub fn step(&mut self, input: &[u64], enables: ConvEnables) -> UnitResult<()> {
        check_inputs(&self.name(), self.config.filter_len(), input.len())?;

        let channel_outputs: Vec<FixedPoint> = self.units.iter().map(ConvUnit::output).collect();
        for (unit, window) in self
            .units
            .iter_mut()
            .zip(input.chunks(self.config.window_len()))
        {
            unit.step(window, enables.mult, enables.sum)?;
        }
        self.reduce_channels(&channel_outputs, enables)
    }

    /// Advance the channel, batch and activation stages from explicit channel
    /// outputs
    pub fn reduce_channels(
        &mut self,
        channel_outputs: &[FixedPoint],
        enables: ConvEnables,
    ) -> UnitResult<()> {
        check_inputs(&self.name(), self.config.channels, channel_outputs.len())?;
        let (accumulator, batch) = (self.reg_accumulator, self.reg_batch);

        if enables.act {
            self.output = self.activate(batch);
        }
        if enables.batch {
            self.reg_batch = self.normalize(accumulator);
        }
        if enables.channel {
            self.reg_accumulator = self.accumulate(channel_outputs);
        }
        Ok(())
    }

    /// Saturated sum of the channel outputs through the mirrored tree
    pub fn accumulate(&self, channel_outputs: &[FixedPoint]) -> FixedPoint {
        let raws: Vec<i64> = channel_outputs.iter().map(FixedPoint::raw).collect();
        let sum = self.tree.sum(&raws).unwrap_or(0);
        FixedPoint::saturating_from_raw(sum, self.config.format)
    }

    /// Fused batch normalization of an accumulated value
    pub fn normalize(&self, accumulator: FixedPoint) -> FixedPoint {
        self.multiplier
            .multiply(accumulator, self.scale)
            .saturating_add(&self.bias)
    }

    /// Activation stage output bits for a normalized value
    pub fn activate(&self, batch: FixedPoint) -> u64 {
        if self.config.bin_output {
            batch.is_negative() as u64
        } else {
            self.leaky.apply(batch).bits()
        }
    }
}

impl Elaborate for MultiChannelConvUnit {
    fn coord(&self) -> UnitCoord {
        self.coord
    }

    fn name(&self) -> String {
        self.coord.entity_name(UnitKind::MultiChannelConvUnit)
    }

    fn entity(&self) -> Entity {
        let width = self.config.format.width() as usize;
        let channel_width = self.config.window_len() * self.config.input_width();

        let entity = Entity::new(self.name())
            .with_clock_reset()
            .enables(&["en_mult", "en_sum", "en_channel", "en_batch", "en_act"])
            .input("input", self.config.filter_len() * self.config.input_width())
            .output("output", self.config.output_width())
            .constant("scale", width, self.scale.bits())
            .constant("bias", width, self.bias.bits());

        self.units.iter().enumerate().fold(entity, |entity, (i, unit)| {
            let instance = ["clk", "rst", "en_mult", "en_sum"]
                .iter()
                .fold(Instance::new(format!("conv_unit_{i}"), unit.name()), |inst, port| {
                    inst.connect(*port, *port)
                })
                .connect("input", bus_slice("input", i, channel_width))
                .connect("output", format!("wire_outputs_{i}"));
            entity.instance(instance)
        })
    }

    fn elaborate(&self) -> Vec<Entity> {
        std::iter::once(self.entity())
            .chain(self.units.iter().map(Elaborate::entity))
            .collect()
    }
}
