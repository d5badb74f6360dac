//! Benchmarks for the PGception forward pass.

use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use pgception_model::{AdjacencyMatrix, ClassifierMode, Normalization, PGception, PGceptionConfig};

fn build_model(config: PGceptionConfig) -> (PGception, VarMap) {
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let model = PGception::new(config, vb).expect("model");
    (model, varmap)
}

fn benchmark_forward(c: &mut Criterion) {
    let input = Tensor::randn(0f32, 1.0, (32, 17, 2), &Device::Cpu).expect("input");

    let (cat_model, _cat_vars) = build_model(PGceptionConfig {
        out_channel_list: [128, 256, 256, 256],
        last_hidden_channels: 512,
        ..Default::default()
    });
    let (mean_model, _mean_vars) = build_model(PGceptionConfig {
        classifier_mode: ClassifierMode::Mean,
        ..Default::default()
    });
    let (deep_model, _deep_vars) = build_model(PGceptionConfig {
        layers: 2,
        attention: true,
        ..Default::default()
    });

    c.bench_function("forward_cat_batch32_eval", |b| {
        b.iter(|| cat_model.forward_t(black_box(&input), false))
    });

    c.bench_function("forward_cat_batch32_train", |b| {
        b.iter(|| cat_model.forward_t(black_box(&input), true))
    });

    c.bench_function("forward_mean_batch32_eval", |b| {
        b.iter(|| mean_model.forward_t(black_box(&input), false))
    });

    c.bench_function("forward_two_layer_attention_batch32", |b| {
        b.iter(|| deep_model.forward_t(black_box(&input), false))
    });
}

fn benchmark_adjacency(c: &mut Criterion) {
    let table = &pgception_core::EXTENDED_NEIGHBORS;

    c.bench_function("adjacency_extended_symmetric", |b| {
        b.iter(|| {
            AdjacencyMatrix::build(
                Some(black_box(&table[..])),
                17,
                Normalization::Symmetric,
            )
        })
    });
}

criterion_group!(benches, benchmark_forward, benchmark_adjacency);
criterion_main!(benches);
