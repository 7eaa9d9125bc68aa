//! File-based network compilation tests

use std::fs;
use std::path::Path;
use std::sync::Arc;
use yolohdl_network::{
    elaborate_graph, GeneratorOptions, GraphBuilder, NetworkDescription, NetworkError, WeightStore,
};
use yolohdl_parallel::{ElaborationEngine, EngineConfig};

const NETWORK: &str = r#"
weights:
  weights: tiny_weights.h
  biases: tiny_biases.h
  scales: tiny_scales.h
  means: tiny_means.h
  variances: tiny_variances.h
output_path: out
channels: 3
width: 16
layer_groups:
  - filters: 4
    layers:
      - { type: conv_layer, size: 3, binary: true, bin_output: true, parallelism: 2 }
      - { type: max_pool_layer, binary: true }
      - { type: buffer_layer, binary: true, scattering: 3 }
  - filters: 2
    layers:
      - { type: conv_layer, size: 3, binary: true, bin_input: true, batch_normalize: false }
"#;

fn header(name: &str, values: &[f64]) -> String {
    let body = values
        .iter()
        .map(|v| format!("{v:?}f"))
        .collect::<Vec<_>>()
        .join(",\n  ");
    format!("const float {name}[{}] = {{\n  {body}\n}};\n", values.len())
}

fn write_network(dir: &Path, weights: usize) {
    let values: Vec<f64> = (0..weights).map(|i| if i % 3 == 0 { -0.5 } else { 0.75 }).collect();
    fs::write(dir.join("network.yaml"), NETWORK).unwrap();
    fs::write(dir.join("tiny_weights.h"), header("weights", &values)).unwrap();
    fs::write(dir.join("tiny_biases.h"), header("biases", &[0.1, 0.2, -0.1, 0.0, 0.5, -0.5])).unwrap();
    fs::write(dir.join("tiny_scales.h"), header("scales", &[1.0, 0.5, 2.0, 1.0])).unwrap();
    fs::write(dir.join("tiny_means.h"), header("means", &[0.0, 0.1, -0.2, 0.3])).unwrap();
    fs::write(dir.join("tiny_variances.h"), header("variances", &[1.0, 4.0, 0.25, 1.0])).unwrap();
}

#[test]
fn test_build_network_from_files() {
    let dir = tempfile::tempdir().unwrap();
    // 4 * 27 + 2 * 36
    write_network(dir.path(), 108 + 72);

    let description = NetworkDescription::from_path(dir.path().join("network.yaml")).unwrap();
    assert_eq!(description.weights.weights, dir.path().join("tiny_weights.h"));

    let store = Arc::new(WeightStore::load(&description.weights).unwrap());
    assert_eq!(store.weights.len(), 180);
    assert!(store.has_statistics());

    let graph = GraphBuilder::new(&description, &store, GeneratorOptions::default())
        .build()
        .unwrap();
    assert_eq!(graph.consumed, (180, 6, 4));
    assert_eq!(graph.output_width, 8);

    let engine = ElaborationEngine::with_config(EngineConfig { worker_threads: 4 }).unwrap();
    let elaboration = elaborate_graph(&graph, Arc::clone(&store), &engine).unwrap();

    let buffer = elaboration.find("BufferLayerL2").unwrap();
    // 4 filters of 3x3 one-bit windows
    assert_eq!(buffer.port_width("output"), Some(36));
    let scatter = elaboration.find("ScatterUnitL2F0").unwrap();
    // next_pow2(8) = 8 samples per bank, 4-bit cursors
    assert_eq!(scatter.port_width("input_counter"), Some(4));

    let last = elaboration.find("ConvLayerL3").unwrap();
    assert_eq!(last.port_width("input"), Some(36));
    assert_eq!(last.port_width("output"), Some(2 * 16));

    assert_eq!(engine.stats().failed_tasks, 0);
}

#[test]
fn test_short_weight_file_fails_graph_construction() {
    let dir = tempfile::tempdir().unwrap();
    write_network(dir.path(), 150);

    let description = NetworkDescription::from_path(dir.path().join("network.yaml")).unwrap();
    let store = WeightStore::load(&description.weights).unwrap();
    let err = GraphBuilder::new(&description, &store, GeneratorOptions::default())
        .build()
        .unwrap_err();
    assert!(matches!(
        err,
        NetworkError::TensorExhausted {
            index: 3,
            tensor: "weights",
            ..
        }
    ));
}

#[test]
fn test_missing_weight_file() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("network.yaml"), NETWORK).unwrap();
    let description = NetworkDescription::from_path(dir.path().join("network.yaml")).unwrap();
    assert!(matches!(
        WeightStore::load(&description.weights),
        Err(NetworkError::Io { .. })
    ));
}
