//! End-to-end datapath tests across crates

use yolohdl_fixed::{quantize, FixedFormat, FixedPoint};
use yolohdl_mir::{validate_hierarchy, UnitCoord};
use yolohdl_units::{
    BufferLayer, ConvConfig, ConvEnables, ConvLayer, ConvUnit, Elaborate, MaxPoolLayer,
    Normalization, ScatterControl,
};

fn binary_config(format: FixedFormat) -> ConvConfig {
    ConvConfig {
        size: 1,
        channels: 1,
        format,
        binary: true,
        ..ConvConfig::default()
    }
}

#[test]
fn test_quantized_weight_through_binary_unit() {
    let format = FixedFormat::Q3_4;
    let q = quantize(2.58, format);
    assert_eq!(q.to_f64(), 2.5625);

    let mut unit = ConvUnit::new(UnitCoord::layer(0), binary_config(format), &[2.58]).unwrap();

    let positive = quantize(1.0, format).bits();
    unit.step(&[positive], true, false).unwrap();
    unit.step(&[positive], false, true).unwrap();
    assert_eq!(unit.output(), q);

    let negative = quantize(-1.0, format).bits();
    unit.step(&[negative], true, false).unwrap();
    unit.step(&[negative], false, true).unwrap();
    assert_eq!(unit.output(), q.saturating_neg());
    assert_eq!(unit.output().to_f64(), -2.5625);
}

#[test]
fn test_buffer_layer_rotates_rows_for_every_mode() {
    let (size, width) = (3, 4);
    let mut layer = BufferLayer::new(UnitCoord::layer(1), 2, size, 8, width).unwrap();
    // filter f, row r, column x
    let sample = |f: u64, r: u64, x: u64| 1 + f * 100 + r * 10 + x;

    for row in 0..=size as u64 {
        for x in 0..width as u64 {
            let control = ScatterControl {
                input_cursor: x as usize,
                mode: 1 << row,
                en_write: true,
                ..ScatterControl::default()
            };
            layer.step(&[sample(0, row, x), sample(1, row, x)], &control).unwrap();
        }
    }

    for row in (size as u64 + 1)..(2 * size as u64 + 2) {
        let mode = 1 << (row % (size as u64 + 1));
        for x in 0..width as u64 {
            let control = ScatterControl {
                input_cursor: x as usize,
                output_cursor: x as usize,
                mode,
                en_read: true,
                en_write: true,
                en_zero: false,
            };
            layer.step(&[sample(0, row, x), sample(1, row, x)], &control).unwrap();

            for (f, unit) in layer.units().iter().enumerate() {
                let expected: Vec<u64> = (1..=size as u64).rev().map(|back| sample(f as u64, row - back, x)).collect();
                assert_eq!(&unit.window()[..size], expected.as_slice(), "row {row} x {x} mode {mode:#b}");
            }
        }
    }

    let control = ScatterControl {
        mode: 1,
        en_read: true,
        en_zero: true,
        ..ScatterControl::default()
    };
    for _ in 0..size {
        layer.step(&[7, 7], &control).unwrap();
    }
    assert!(layer.windows().iter().all(|&w| w == 0));
}

#[test]
fn test_binary_layer_into_max_pool() {
    let format = FixedFormat::Q4_11;
    let config = ConvConfig {
        size: 1,
        channels: 2,
        format,
        binary: true,
        bin_output: true,
        ..ConvConfig::default()
    };
    let weights = [0.5, 0.5, -0.5, -0.5];
    let norms = [Normalization::Bias(0.0); 2];
    let mut layer = ConvLayer::new(UnitCoord::layer(0), config, 2, 2, &weights, &norms).unwrap();

    let one = quantize(1.0, format).bits();
    for _ in 0..5 {
        layer.step(&[one, one], ConvEnables::all()).unwrap();
    }
    // filter 0 agrees with the input, filter 1 disagrees
    assert_eq!(layer.outputs(), vec![0, 1]);

    let mut pool = MaxPoolLayer::new(UnitCoord::layer(1), 2, 1, true);
    let [a, b] = [layer.outputs()[0], layer.outputs()[1]];
    pool.step(&[a, b, b, b, b, b, b, b], true).unwrap();
    assert_eq!(pool.outputs(), vec![0, 1]);

    let mut entities = layer.elaborate();
    entities.extend(pool.elaborate());
    assert_eq!(validate_hierarchy(&entities), Ok(()));
}

#[test]
fn test_value_unit_matches_quantized_product() {
    let format = FixedFormat::Q3_4;
    let config = ConvConfig {
        size: 2,
        channels: 1,
        format,
        ..ConvConfig::default()
    };
    let mut unit = ConvUnit::new(UnitCoord::layer(0), config, &[0.5, -1.0, 2.0, 0.25]).unwrap();
    let window: Vec<u64> = [1.0, 1.0, 0.5, -2.0]
        .iter()
        .map(|&v| quantize(v, format).bits())
        .collect();

    unit.step(&window, true, false).unwrap();
    unit.step(&window, false, true).unwrap();
    // 0.5 - 1.0 + 1.0 - 0.5
    assert_eq!(unit.output(), FixedPoint::zero(format));
}
