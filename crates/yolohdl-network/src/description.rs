//! Declarative network description
//!
//! ```yaml
//! weights:
//!   weights: tiny_weights.h
//!   biases: tiny_biases.h
//!   scales: tiny_scale.h
//!   means: tiny_mean.h
//!   variances: tiny_variance.h
//! channels: 3
//! width: 416
//! layer_groups:
//!   - filters: 16
//!     layers:
//!       - { type: conv_layer, size: 3, binary: true, bin_input: false, bin_output: true, parallelism: 4 }
//!       - { type: max_pool_layer, binary: true }
//!       - { type: buffer_layer, binary: true, scattering: 3 }
//! ```
//!
//! Layer fields are checked per kind when the graph is built, so errors name
//! the layer index and kind.

use crate::{NetworkError, NetworkResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkDescription {
    pub weights: WeightPaths,
    /// Directory for the elaboration report
    #[serde(default)]
    pub output_path: Option<PathBuf>,
    /// Input channels of the first layer group
    pub channels: usize,
    /// Input image width in samples
    pub width: usize,
    pub layer_groups: Vec<LayerGroup>,
}

/// Tensor files; only `weights` is required
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "WeightPathsRepr")]
pub struct WeightPaths {
    pub weights: PathBuf,
    pub biases: Option<PathBuf>,
    pub scales: Option<PathBuf>,
    pub means: Option<PathBuf>,
    pub variances: Option<PathBuf>,
}

/// Accepts either a bare weights path or the full table
#[derive(Deserialize)]
#[serde(untagged)]
enum WeightPathsRepr {
    Weights(PathBuf),
    Full {
        weights: PathBuf,
        #[serde(default)]
        biases: Option<PathBuf>,
        #[serde(default)]
        scales: Option<PathBuf>,
        #[serde(default)]
        means: Option<PathBuf>,
        #[serde(default)]
        variances: Option<PathBuf>,
    },
}

impl From<WeightPathsRepr> for WeightPaths {
    fn from(repr: WeightPathsRepr) -> Self {
        match repr {
            WeightPathsRepr::Weights(weights) => Self {
                weights,
                biases: None,
                scales: None,
                means: None,
                variances: None,
            },
            WeightPathsRepr::Full {
                weights,
                biases,
                scales,
                means,
                variances,
            } => Self {
                weights,
                biases,
                scales,
                means,
                variances,
            },
        }
    }
}

impl WeightPaths {
    /// Resolve relative paths against `base`
    pub fn resolved(&self, base: &Path) -> Self {
        let join = |p: &PathBuf| if p.is_absolute() { p.clone() } else { base.join(p) };
        Self {
            weights: join(&self.weights),
            biases: self.biases.as_ref().map(join),
            scales: self.scales.as_ref().map(join),
            means: self.means.as_ref().map(join),
            variances: self.variances.as_ref().map(join),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerGroup {
    /// Output channels of every layer in the group
    pub filters: usize,
    pub layers: Vec<LayerSpec>,
}

/// One layer as written in the description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerSpec {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub size: Option<usize>,
    #[serde(default)]
    pub binary: bool,
    #[serde(default)]
    pub bin_input: bool,
    #[serde(default)]
    pub bin_output: bool,
    #[serde(default)]
    pub parallelism: Option<usize>,
    #[serde(default)]
    pub batch_normalize: Option<bool>,
    #[serde(default)]
    pub scattering: Option<usize>,
}

/// Layer checked against its kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    Conv {
        size: usize,
        binary: bool,
        bin_input: bool,
        bin_output: bool,
        parallelism: usize,
        batch_normalize: bool,
    },
    MaxPool {
        binary: bool,
    },
    Buffer {
        binary: bool,
        scattering: usize,
    },
}

impl LayerKind {
    pub fn name(&self) -> &'static str {
        match self {
            LayerKind::Conv { .. } => "conv_layer",
            LayerKind::MaxPool { .. } => "max_pool_layer",
            LayerKind::Buffer { .. } => "buffer_layer",
        }
    }
}

impl LayerSpec {
    /// Check the fields required by the layer kind
    pub fn resolve(&self, index: usize) -> NetworkResult<LayerKind> {
        let error = |reason: &str| NetworkError::Layer {
            index,
            kind: self.kind.clone(),
            reason: reason.to_string(),
        };

        match self.kind.as_str() {
            "conv_layer" => {
                let size = self.size.ok_or_else(|| error("missing 'size'"))?;
                if size == 0 {
                    return Err(error("'size' must be at least 1"));
                }
                let parallelism = self.parallelism.unwrap_or(1);
                if parallelism == 0 {
                    return Err(error("'parallelism' must be at least 1"));
                }
                Ok(LayerKind::Conv {
                    size,
                    binary: self.binary,
                    bin_input: self.bin_input,
                    bin_output: self.bin_output,
                    parallelism,
                    batch_normalize: self.batch_normalize.unwrap_or(true),
                })
            }
            "max_pool_layer" => Ok(LayerKind::MaxPool {
                binary: self.binary,
            }),
            "buffer_layer" => {
                let scattering = self.scattering.ok_or_else(|| error("missing 'scattering'"))?;
                if scattering == 0 {
                    return Err(error("'scattering' must be at least 1"));
                }
                Ok(LayerKind::Buffer {
                    binary: self.binary,
                    scattering,
                })
            }
            _ => Err(error("unknown layer type")),
        }
    }
}

impl NetworkDescription {
    /// Parse a description from YAML text
    pub fn from_str(yaml: &str) -> NetworkResult<Self> {
        let description: Self =
            serde_yaml::from_str(yaml).map_err(|e| NetworkError::Parse(e.to_string()))?;
        description.validate()?;
        Ok(description)
    }

    /// Read a description; relative paths resolve against its directory
    pub fn from_path(path: impl AsRef<Path>) -> NetworkResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| NetworkError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let mut description = Self::from_str(&text)?;
        if let Some(base) = path.parent() {
            description.weights = description.weights.resolved(base);
            description.output_path = description
                .output_path
                .map(|out| if out.is_absolute() { out } else { base.join(out) });
        }
        Ok(description)
    }

    /// Check network-level shape fields
    pub fn validate(&self) -> NetworkResult<()> {
        if self.channels == 0 {
            return Err(NetworkError::Description("'channels' must be at least 1".to_string()));
        }
        if self.width == 0 {
            return Err(NetworkError::Description("'width' must be at least 1".to_string()));
        }
        if self.layer_groups.is_empty() {
            return Err(NetworkError::Description("no layer groups".to_string()));
        }
        if let Some(i) = self.layer_groups.iter().position(|g| g.filters == 0) {
            return Err(NetworkError::Description(format!(
                "layer group {i} has zero filters"
            )));
        }
        Ok(())
    }

    /// Layers in network order with their index and input channel count
    pub fn layers(&self) -> impl Iterator<Item = (usize, usize, &LayerGroup, &LayerSpec)> {
        let mut channels = self.channels;
        self.layer_groups
            .iter()
            .flat_map(move |group| {
                let input = channels;
                channels = group.filters;
                group.layers.iter().map(move |layer| (input, group, layer))
            })
            .enumerate()
            .map(|(index, (channels, group, layer))| (index, channels, group, layer))
    }
}
