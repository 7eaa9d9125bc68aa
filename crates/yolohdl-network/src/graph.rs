//! Network graph construction
//!
//! `GraphBuilder` walks the description once, in layer order, and turns every
//! layer into emission units:
//! - convolution layers become one `ConvPart` per parallel part plus a
//!   `ConvTop` that instantiates the parts
//! - max pool and buffer layers become a single unit each
//!
//! While walking it tracks the image width (halved by every max pool) and
//! three tensor cursors. Weights advance by `filters * size * size *
//! channels` per convolution, biases by `filters`, and the batch-norm
//! statistics by `filters` only for layers that normalize. Every slice is
//! bounds-checked here so elaboration never sees a short bucket.

use crate::description::{LayerKind, NetworkDescription};
use crate::weights::WeightStore;
use crate::{NetworkError, NetworkResult};
use serde::Serialize;
use std::fmt;
use std::ops::Range;
use tracing::{debug, info};
use yolohdl_fixed::{FixedFormat, DEFAULT_LEAK_SHIFT};
use yolohdl_mir::{Entity, UnitCoord, UnitKind};
use yolohdl_units::{
    conv_layer_entity, BufferLayer, ConvConfig, ConvLayerPart, Elaborate, MaxPoolLayer,
    Normalization, UnitError,
};

/// Arithmetic options shared by every generated unit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeneratorOptions {
    pub format: FixedFormat,
    pub leak_shift: u32,
    pub epsilon: f64,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            format: FixedFormat::Q4_11,
            leak_shift: DEFAULT_LEAK_SHIFT,
            epsilon: 1e-5,
        }
    }
}

/// Independent piece of elaboration work
#[derive(Debug, Clone, PartialEq)]
pub struct EmissionUnit {
    pub coord: UnitCoord,
    pub name: String,
    pub kind: EmissionKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EmissionKind {
    /// One part of a convolution layer with its tensor slices
    ConvPart {
        config: ConvConfig,
        filters: usize,
        weights: Range<usize>,
        bias_offset: usize,
        /// Offset into scales, means and variances when normalizing
        norm_offset: Option<usize>,
        epsilon: f64,
    },
    /// Layer entity instantiating every part
    ConvTop {
        config: ConvConfig,
        filters: usize,
        parallelism: usize,
    },
    MaxPool {
        filters: usize,
        width: usize,
        binary: bool,
    },
    Buffer {
        filters: usize,
        size: usize,
        data_width: usize,
        image_width: usize,
    },
}

impl fmt::Display for EmissionUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl EmissionUnit {
    /// Elaborate this unit and all of its descendants
    pub fn elaborate(&self, store: &WeightStore) -> NetworkResult<Vec<Entity>> {
        match &self.kind {
            EmissionKind::ConvPart {
                config,
                filters,
                weights,
                bias_offset,
                norm_offset,
                epsilon,
            } => {
                let bucket = store.weights.get(weights.clone()).ok_or_else(|| {
                    UnitError::WeightCount {
                        unit: self.name.clone(),
                        expected: weights.len(),
                        found: store.weights.len().saturating_sub(weights.start),
                    }
                })?;
                let norms = (0..*filters)
                    .map(|f| self.normalization(store, bias_offset + f, norm_offset.map(|n| n + f), *epsilon))
                    .collect::<NetworkResult<Vec<_>>>()?;
                let part = ConvLayerPart::new(self.coord, *config, *filters, bucket, &norms)?;
                Ok(part.elaborate())
            }
            EmissionKind::ConvTop {
                config,
                filters,
                parallelism,
            } => Ok(vec![conv_layer_entity(self.coord, config, *filters, *parallelism)]),
            EmissionKind::MaxPool {
                filters,
                width,
                binary,
            } => Ok(MaxPoolLayer::new(self.coord, *filters, *width, *binary).elaborate()),
            EmissionKind::Buffer {
                filters,
                size,
                data_width,
                image_width,
            } => {
                let layer = BufferLayer::new(self.coord, *filters, *size, *data_width, *image_width)?;
                Ok(layer.elaborate())
            }
        }
    }

    fn normalization(
        &self,
        store: &WeightStore,
        bias_index: usize,
        norm_index: Option<usize>,
        epsilon: f64,
    ) -> NetworkResult<Normalization> {
        let short = |found: usize| UnitError::NormCount {
            unit: self.name.clone(),
            expected: bias_index + 1,
            found,
        };
        let beta = store
            .bias(bias_index)
            .ok_or_else(|| short(store.biases.as_ref().map_or(0, Vec::len)))?;

        let Some(index) = norm_index else {
            return Ok(Normalization::Bias(beta));
        };
        let stat = |tensor: &Option<Vec<f64>>| -> NetworkResult<f64> {
            tensor
                .as_ref()
                .and_then(|values| values.get(index).copied())
                .ok_or_else(|| {
                    UnitError::NormCount {
                        unit: self.name.clone(),
                        expected: index + 1,
                        found: tensor.as_ref().map_or(0, Vec::len),
                    }
                    .into()
                })
        };
        Ok(Normalization::Batch {
            gamma: stat(&store.scales)?,
            beta,
            mean: stat(&store.means)?,
            variance: stat(&store.variances)?,
            epsilon,
        })
    }
}

/// One line of the layer table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerSummary {
    pub index: usize,
    pub kind: &'static str,
    pub channels: usize,
    pub filters: usize,
    /// Image width seen by the layer
    pub width: usize,
    pub units: usize,
}

/// Emission units of a whole network in layer order
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkGraph {
    pub units: Vec<EmissionUnit>,
    pub layers: Vec<LayerSummary>,
    pub output_channels: usize,
    pub output_width: usize,
    /// Tensor values consumed: weights, biases, statistics
    pub consumed: (usize, usize, usize),
}

#[derive(Debug, Default, Clone, Copy)]
struct Cursors {
    weights: usize,
    biases: usize,
    norms: usize,
}

pub struct GraphBuilder<'a> {
    description: &'a NetworkDescription,
    store: &'a WeightStore,
    options: GeneratorOptions,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(description: &'a NetworkDescription, store: &'a WeightStore, options: GeneratorOptions) -> Self {
        Self {
            description,
            store,
            options,
        }
    }

    /// Walk every layer and emit its units
    pub fn build(&self) -> NetworkResult<NetworkGraph> {
        let word_width = self.options.format.width() as usize;
        let mut width = self.description.width;
        let mut cursors = Cursors::default();
        let mut units = Vec::new();
        let mut layers = Vec::new();

        for (index, channels, group, spec) in self.description.layers() {
            let kind = spec.resolve(index)?;
            let coord = UnitCoord::layer(index);
            let filters = group.filters;
            let first = units.len();

            match kind {
                LayerKind::Conv {
                    size,
                    binary,
                    bin_input,
                    bin_output,
                    parallelism,
                    batch_normalize,
                } => {
                    let config = ConvConfig {
                        size,
                        channels,
                        format: self.options.format,
                        binary,
                        bin_input,
                        bin_output,
                        leak_shift: self.options.leak_shift,
                    };
                    self.emit_conv(index, coord, config, filters, parallelism, batch_normalize, &mut cursors, &mut units)?;
                }
                LayerKind::MaxPool { binary } => {
                    units.push(EmissionUnit {
                        coord,
                        name: coord.entity_name(UnitKind::MaxPoolLayer),
                        kind: EmissionKind::MaxPool {
                            filters,
                            width: if binary { 1 } else { word_width },
                            binary,
                        },
                    });
                }
                LayerKind::Buffer { binary, scattering } => {
                    units.push(EmissionUnit {
                        coord,
                        name: coord.entity_name(UnitKind::BufferLayer),
                        kind: EmissionKind::Buffer {
                            filters,
                            size: scattering,
                            data_width: if binary { 1 } else { word_width },
                            image_width: width,
                        },
                    });
                }
            }

            debug!(
                "Layer {} ({}): {} -> {} channels, width {}",
                index,
                kind.name(),
                channels,
                filters,
                width
            );
            layers.push(LayerSummary {
                index,
                kind: kind.name(),
                channels,
                filters,
                width,
                units: units.len() - first,
            });

            if let LayerKind::MaxPool { .. } = kind {
                width = (width / 2).max(1);
            }
        }

        let output_channels = self
            .description
            .layer_groups
            .last()
            .map_or(self.description.channels, |group| group.filters);

        info!(
            "Network graph: {} layers, {} emission units, {} weights consumed of {}",
            layers.len(),
            units.len(),
            cursors.weights,
            self.store.weights.len()
        );

        Ok(NetworkGraph {
            units,
            layers,
            output_channels,
            output_width: width,
            consumed: (cursors.weights, cursors.biases, cursors.norms),
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_conv(
        &self,
        index: usize,
        coord: UnitCoord,
        config: ConvConfig,
        filters: usize,
        parallelism: usize,
        batch_normalize: bool,
        cursors: &mut Cursors,
        units: &mut Vec<EmissionUnit>,
    ) -> NetworkResult<()> {
        let layer_error = |reason: String| NetworkError::Layer {
            index,
            kind: "conv_layer".to_string(),
            reason,
        };
        let exhausted = |tensor: &'static str, offset: usize, available: usize| NetworkError::TensorExhausted {
            index,
            kind: "conv_layer".to_string(),
            tensor,
            offset,
            needed: filters,
            available,
        };

        if filters % parallelism != 0 {
            return Err(layer_error(format!(
                "{filters} filters cannot be split into {parallelism} parts"
            )));
        }

        let needed = filters * config.filter_len();
        if cursors.weights + needed > self.store.weights.len() {
            return Err(NetworkError::TensorExhausted {
                index,
                kind: "conv_layer".to_string(),
                tensor: "weights",
                offset: cursors.weights,
                needed,
                available: self.store.weights.len().saturating_sub(cursors.weights),
            });
        }
        if let Some(biases) = &self.store.biases {
            if cursors.biases + filters > biases.len() {
                return Err(exhausted("biases", cursors.biases, biases.len().saturating_sub(cursors.biases)));
            }
        }
        if batch_normalize {
            if !self.store.has_statistics() {
                return Err(layer_error(
                    "batch normalization needs scales, means and variances".to_string(),
                ));
            }
            let tensors = [
                ("scales", &self.store.scales),
                ("means", &self.store.means),
                ("variances", &self.store.variances),
            ];
            for (tensor, values) in tensors {
                let len = values.as_ref().map_or(0, Vec::len);
                if cursors.norms + filters > len {
                    return Err(exhausted(tensor, cursors.norms, len.saturating_sub(cursors.norms)));
                }
            }
        }

        let part_filters = filters / parallelism;
        let part_weights = part_filters * config.filter_len();
        for part in 0..parallelism {
            let part_coord = coord.with_part(part);
            let start = cursors.weights + part * part_weights;
            units.push(EmissionUnit {
                coord: part_coord,
                name: part_coord.entity_name(UnitKind::ConvLayerPart),
                kind: EmissionKind::ConvPart {
                    config,
                    filters: part_filters,
                    weights: start..start + part_weights,
                    bias_offset: cursors.biases + part * part_filters,
                    norm_offset: batch_normalize.then_some(cursors.norms + part * part_filters),
                    epsilon: self.options.epsilon,
                },
            });
        }
        units.push(EmissionUnit {
            coord,
            name: coord.entity_name(UnitKind::ConvLayer),
            kind: EmissionKind::ConvTop {
                config,
                filters,
                parallelism,
            },
        });

        cursors.weights += needed;
        cursors.biases += filters;
        if batch_normalize {
            cursors.norms += filters;
        }
        Ok(())
    }
}
