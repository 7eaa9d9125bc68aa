//! Datapath and elaboration benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use yolohdl_fixed::{quantize, quantize_all, FixedFormat, ShiftAddMultiplier};
use yolohdl_mir::UnitCoord;
use yolohdl_units::{
    ConvConfig, ConvEnables, ConvLayer, Elaborate, MultiChannelConvUnit, Normalization,
    ScatterControl, ScatterUnit,
};

fn benchmark_multiplier(c: &mut Criterion) {
    let mut group = c.benchmark_group("multiplier");

    for format in [FixedFormat::Q3_4, FixedFormat::Q4_11] {
        let multiplier = ShiftAddMultiplier::new(format);
        let a = quantize(1.375, format);
        let b = quantize(-2.625, format);
        group.bench_with_input(BenchmarkId::from_parameter(format), &(a, b), |bench, &(a, b)| {
            bench.iter(|| black_box(multiplier.multiply(black_box(a), black_box(b))));
        });
    }
    group.finish();
}

fn benchmark_quantize(c: &mut Criterion) {
    let weights: Vec<f64> = (0..4096).map(|i| (i as f64 * 0.37).sin() * 3.0).collect();
    c.bench_function("quantize_4096", |b| {
        b.iter(|| black_box(quantize_all(black_box(&weights), FixedFormat::Q4_11)));
    });
}

fn benchmark_multi_channel_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("multi_channel_step");

    for binary in [false, true] {
        let config = ConvConfig {
            size: 3,
            channels: 16,
            binary,
            ..ConvConfig::default()
        };
        let weights: Vec<f64> = (0..config.filter_len()).map(|i| (i as f64 * 0.11).cos()).collect();
        let mut unit =
            MultiChannelConvUnit::new(UnitCoord::layer(0), config, &weights, Normalization::Bias(0.125))
                .unwrap();
        let input: Vec<u64> = (0..config.filter_len())
            .map(|i| quantize((i as f64 * 0.07).sin(), config.format).bits())
            .collect();

        let label = if binary { "binary" } else { "value" };
        group.bench_function(label, |b| {
            b.iter(|| unit.step(black_box(&input), ConvEnables::all()));
        });
    }
    group.finish();
}

fn benchmark_scatter_step(c: &mut Criterion) {
    let mut unit = ScatterUnit::new(UnitCoord::layer(0), 3, 16, 416).unwrap();
    let mut cursor = 0usize;
    c.bench_function("scatter_step", |b| {
        b.iter(|| {
            let control = ScatterControl {
                input_cursor: cursor,
                output_cursor: cursor,
                mode: 1 << (cursor / 416 % 4),
                en_read: true,
                en_write: true,
                en_zero: false,
            };
            unit.step(black_box(cursor as u64), &control);
            cursor = (cursor + 1) % (416 * 4);
        });
    });
}

fn benchmark_elaboration(c: &mut Criterion) {
    let config = ConvConfig {
        size: 3,
        channels: 16,
        binary: true,
        ..ConvConfig::default()
    };
    let filters = 32;
    let weights = vec![0.25; filters * config.filter_len()];
    let norms = vec![Normalization::Bias(0.0); filters];
    let layer = ConvLayer::new(UnitCoord::layer(0), config, filters, 4, &weights, &norms)
        .unwrap();

    c.bench_function("elaborate_conv_layer", |b| {
        b.iter(|| black_box(layer.elaborate().len()));
    });
}

criterion_group!(
    benches,
    benchmark_multiplier,
    benchmark_quantize,
    benchmark_multi_channel_step,
    benchmark_scatter_step,
    benchmark_elaboration
);

criterion_main!(benches);
