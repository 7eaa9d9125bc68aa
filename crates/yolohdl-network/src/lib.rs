//! yolohdl network compilation
//!
//! This crate turns a declarative network description plus flat weight and
//! statistics tensors into elaborated entities:
//! - `NetworkDescription`: the YAML description (channels, width, layer groups)
//! - `WeightStore`: weights, biases and batch-norm statistics read from
//!   brace-list files
//! - `GraphBuilder`: walks the layers, tracks channels, image width and tensor
//!   cursors, and emits one `EmissionUnit` per generated entity group
//! - `elaborate_graph`: elaborates every emission unit on the thread pool and
//!   validates the resulting hierarchy

pub mod description;
pub mod elaborate;
pub mod graph;
pub mod weights;

pub use description::{LayerGroup, LayerKind, LayerSpec, NetworkDescription, WeightPaths};
pub use elaborate::{elaborate_graph, Elaboration, UnitReport};
pub use graph::{EmissionKind, EmissionUnit, GeneratorOptions, GraphBuilder, LayerSummary, NetworkGraph};
pub use weights::{parse_brace_list, WeightStore};

use std::path::PathBuf;
use thiserror::Error;
use yolohdl_mir::ValidationError;
use yolohdl_parallel::ParallelError;
use yolohdl_units::UnitError;

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Failed to read {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("Failed to parse network description: {0}")]
    Parse(String),

    #[error("Invalid network description: {0}")]
    Description(String),

    #[error("{source_name}: invalid value '{token}' at position {position}")]
    WeightFormat {
        source_name: String,
        position: usize,
        token: String,
    },

    #[error("Layer {index} ({kind}): {reason}")]
    Layer {
        index: usize,
        kind: String,
        reason: String,
    },

    #[error("Layer {index} ({kind}): {tensor} needs {needed} values from offset {offset}, only {available} available")]
    TensorExhausted {
        index: usize,
        kind: String,
        tensor: &'static str,
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error(transparent)]
    Unit(#[from] UnitError),

    #[error("Elaboration failed: {0}")]
    Elaboration(#[from] ParallelError),

    #[error("Elaborated hierarchy is invalid: {0}")]
    Validation(#[from] ValidationError),
}

pub type NetworkResult<T> = Result<T, NetworkError>;
