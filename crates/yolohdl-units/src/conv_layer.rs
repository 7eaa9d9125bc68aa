//! Convolution layers
//!
//! A layer of `filters` filters is split into `parallelism` parts. Each part
//! holds `filters / parallelism` multi-channel units that share the part's
//! input bus; the top-level layer entity instantiates every part.

use crate::config::{ConvConfig, ConvEnables, Normalization};
use crate::multi_channel::MultiChannelConvUnit;
use crate::{bus_slice, check_inputs, Elaborate, UnitError, UnitResult};
use tracing::debug;
use yolohdl_mir::{Entity, Instance, UnitCoord, UnitKind};

const PIPELINE_PORTS: [&str; 7] = [
    "clk",
    "rst",
    "en_mult",
    "en_sum",
    "en_channel",
    "en_batch",
    "en_act",
];

fn pipeline_entity(name: String, config: &ConvConfig, filters: usize) -> Entity {
    Entity::new(name)
        .with_clock_reset()
        .enables(&PIPELINE_PORTS[2..])
        .input("input", config.filter_len() * config.input_width())
        .output("output", filters * config.output_width())
}

fn pipeline_instance(name: String, entity: String) -> Instance {
    PIPELINE_PORTS
        .iter()
        .fold(Instance::new(name, entity), |inst, port| inst.connect(*port, *port))
        .connect("input", "input")
}

/// Group of filters elaborated together
#[derive(Debug, Clone)]
pub struct ConvLayerPart {
    coord: UnitCoord,
    config: ConvConfig,
    units: Vec<MultiChannelConvUnit>,
}

impl ConvLayerPart {
    /// Build `filters` units from contiguous weight buckets
    ///
    /// `weights` holds `filters * size * size * channels` values and `norms`
    /// one entry per filter.
    pub fn new(
        coord: UnitCoord,
        config: ConvConfig,
        filters: usize,
        weights: &[f64],
        norms: &[Normalization],
    ) -> UnitResult<Self> {
        let name = coord.entity_name(UnitKind::ConvLayerPart);
        if weights.len() != filters * config.filter_len() {
            return Err(UnitError::WeightCount {
                unit: name,
                expected: filters * config.filter_len(),
                found: weights.len(),
            });
        }
        if norms.len() != filters {
            return Err(UnitError::NormCount {
                unit: name,
                expected: filters,
                found: norms.len(),
            });
        }

        let first_filter = coord.part * filters;
        let units = weights
            .chunks(config.filter_len().max(1))
            .zip(norms)
            .enumerate()
            .map(|(f, (bucket, &norm))| {
                MultiChannelConvUnit::new(coord.with_filter(first_filter + f), config, bucket, norm)
            })
            .collect::<UnitResult<Vec<_>>>()?;

        debug!("{}: {} filters from {} weights", name, units.len(), weights.len());
        Ok(Self {
            coord,
            config,
            units,
        })
    }

    pub fn config(&self) -> &ConvConfig {
        &self.config
    }

    pub fn units(&self) -> &[MultiChannelConvUnit] {
        &self.units
    }

    pub fn reset(&mut self) {
        self.units.iter_mut().for_each(MultiChannelConvUnit::reset);
    }

    /// Advance one clock edge; every unit sees the same input bus
    pub fn step(&mut self, input: &[u64], enables: ConvEnables) -> UnitResult<()> {
        for unit in &mut self.units {
            unit.step(input, enables)?;
        }
        Ok(())
    }

    /// Output word of every filter in the part
    pub fn outputs(&self) -> Vec<u64> {
        self.units.iter().map(MultiChannelConvUnit::output).collect()
    }
}

impl Elaborate for ConvLayerPart {
    fn coord(&self) -> UnitCoord {
        self.coord
    }

    fn name(&self) -> String {
        self.coord.entity_name(UnitKind::ConvLayerPart)
    }

    fn entity(&self) -> Entity {
        let output_width = self.config.output_width();
        let entity = pipeline_entity(self.name(), &self.config, self.units.len());
        self.units.iter().enumerate().fold(entity, |entity, (i, unit)| {
            entity.instance(
                pipeline_instance(format!("filter_{i}"), unit.name())
                    .connect("output", bus_slice("output", i, output_width)),
            )
        })
    }

    fn elaborate(&self) -> Vec<Entity> {
        std::iter::once(self.entity())
            .chain(self.units.iter().flat_map(Elaborate::elaborate))
            .collect()
    }
}

/// Top-level entity of a convolution layer split into `parallelism` parts
pub fn conv_layer_entity(coord: UnitCoord, config: &ConvConfig, filters: usize, parallelism: usize) -> Entity {
    let part_filters = filters / parallelism.max(1);
    let part_width = part_filters * config.output_width();
    let entity = pipeline_entity(coord.entity_name(UnitKind::ConvLayer), config, filters);

    (0..parallelism).fold(entity, |entity, part| {
        let part_coord = coord.with_part(part);
        entity.instance(
            pipeline_instance(
                format!("part_{part}"),
                part_coord.entity_name(UnitKind::ConvLayerPart),
            )
            .connect("output", bus_slice("output", part, part_width)),
        )
    })
}

/// Complete convolution layer
#[derive(Debug, Clone)]
pub struct ConvLayer {
    coord: UnitCoord,
    config: ConvConfig,
    filters: usize,
    parts: Vec<ConvLayerPart>,
}

impl ConvLayer {
    /// Split `filters` into `parallelism` parts and build every part
    pub fn new(
        coord: UnitCoord,
        config: ConvConfig,
        filters: usize,
        parallelism: usize,
        weights: &[f64],
        norms: &[Normalization],
    ) -> UnitResult<Self> {
        let name = coord.entity_name(UnitKind::ConvLayer);
        if parallelism == 0 || filters == 0 || filters % parallelism != 0 {
            return Err(UnitError::InvalidConfig {
                unit: name,
                reason: format!("{filters} filters cannot be split into {parallelism} parts"),
            });
        }
        if weights.len() != filters * config.filter_len() {
            return Err(UnitError::WeightCount {
                unit: name,
                expected: filters * config.filter_len(),
                found: weights.len(),
            });
        }
        if norms.len() != filters {
            return Err(UnitError::NormCount {
                unit: name,
                expected: filters,
                found: norms.len(),
            });
        }

        let part_filters = filters / parallelism;
        let part_weights = part_filters * config.filter_len();
        let parts = (0..parallelism)
            .map(|part| {
                ConvLayerPart::new(
                    coord.with_part(part),
                    config,
                    part_filters,
                    &weights[part * part_weights..(part + 1) * part_weights],
                    &norms[part * part_filters..(part + 1) * part_filters],
                )
            })
            .collect::<UnitResult<Vec<_>>>()?;

        Ok(Self {
            coord,
            config,
            filters,
            parts,
        })
    }

    pub fn filters(&self) -> usize {
        self.filters
    }

    pub fn parallelism(&self) -> usize {
        self.parts.len()
    }

    pub fn parts(&self) -> &[ConvLayerPart] {
        &self.parts
    }

    pub fn reset(&mut self) {
        self.parts.iter_mut().for_each(ConvLayerPart::reset);
    }

    pub fn step(&mut self, input: &[u64], enables: ConvEnables) -> UnitResult<()> {
        let expected = self.config.filter_len();
        check_inputs(&self.name(), expected, input.len())?;
        for part in &mut self.parts {
            part.step(input, enables)?;
        }
        Ok(())
    }

    /// Output word of every filter, in filter order
    pub fn outputs(&self) -> Vec<u64> {
        self.parts.iter().flat_map(ConvLayerPart::outputs).collect()
    }
}

impl Elaborate for ConvLayer {
    fn coord(&self) -> UnitCoord {
        self.coord
    }

    fn name(&self) -> String {
        self.coord.entity_name(UnitKind::ConvLayer)
    }

    fn entity(&self) -> Entity {
        conv_layer_entity(self.coord, &self.config, self.filters, self.parts.len())
    }

    fn elaborate(&self) -> Vec<Entity> {
        std::iter::once(self.entity())
            .chain(self.parts.iter().flat_map(Elaborate::elaborate))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yolohdl_fixed::{quantize, FixedFormat};

    fn config() -> ConvConfig {
        ConvConfig {
            size: 1,
            channels: 2,
            ..ConvConfig::default()
        }
    }

    fn norms(n: usize) -> Vec<Normalization> {
        vec![Normalization::Bias(0.0); n]
    }

    #[test]
    fn test_layer_splits_weights_contiguously() {
        // filter f has weights [f, f] over two channels
        let weights: Vec<f64> = (0..4).flat_map(|f| [f as f64 * 0.5; 2]).collect();
        let mut layer = ConvLayer::new(UnitCoord::layer(3), config(), 4, 2, &weights, &norms(4)).unwrap();
        assert_eq!(layer.parallelism(), 2);
        assert_eq!(layer.parts()[1].units()[0].coord().filter, 2);

        let one = quantize(1.0, FixedFormat::Q4_11).bits();
        for _ in 0..5 {
            layer.step(&[one, one], ConvEnables::all()).unwrap();
        }
        let outputs: Vec<f64> = layer
            .outputs()
            .into_iter()
            .map(|bits| yolohdl_fixed::FixedPoint::from_bits(bits, FixedFormat::Q4_11).to_f64())
            .collect();
        assert_eq!(outputs, vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_rejects_bad_split_and_short_buckets() {
        let err = ConvLayer::new(UnitCoord::layer(0), config(), 6, 4, &[0.0; 12], &norms(6)).unwrap_err();
        assert!(matches!(err, UnitError::InvalidConfig { .. }));

        let err = ConvLayer::new(UnitCoord::layer(0), config(), 4, 2, &[0.0; 7], &norms(4)).unwrap_err();
        assert!(matches!(err, UnitError::WeightCount { expected: 8, found: 7, .. }));

        let err = ConvLayerPart::new(UnitCoord::layer(0), config(), 2, &[0.0; 4], &norms(1)).unwrap_err();
        assert!(matches!(err, UnitError::NormCount { .. }));
    }

    #[test]
    fn test_elaborated_hierarchy() {
        let layer = ConvLayer::new(UnitCoord::layer(1), config(), 4, 2, &[0.25; 8], &norms(4)).unwrap();
        let entities = layer.elaborate();
        // top + 2 parts * (part + 2 filters * (unit + 2 channels))
        assert_eq!(entities.len(), 1 + 2 * (1 + 2 * 3));
        assert_eq!(entities[0].name, "ConvLayerL1");
        assert_eq!(entities[0].port_width("output"), Some(64));
        assert_eq!(entities[0].instances[1].entity, "ConvLayerL1P1");
        assert_eq!(entities[0].instances[1].connections["output"], "output[63:32]");
        assert_eq!(entities[1].name, "ConvLayerL1P0");
        assert_eq!(entities[1].port_width("output"), Some(32));
        assert_eq!(yolohdl_mir::validate_hierarchy(&entities), Ok(()));
        assert_eq!(layer.entity(), conv_layer_entity(UnitCoord::layer(1), &config(), 4, 2));
    }
}
