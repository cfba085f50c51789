// ─────────────────────────────────────────────────────────────────────
// MetaFed Inference — Hybrid Model Benchmark
// License: GNU AGPL v3
// ─────────────────────────────────────────────────────────────────────

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use metafed_ml::inference::InferenceEngine;
use metafed_ml::model::HybridModel;
use metafed_ml::normalizer::{FeatureNormalizer, StandardizationStats};
use metafed_types::config::ModelDims;
use serde_json::{json, Map, Value};

/// Production-width model with generated weights.
fn production_engine() -> InferenceEngine {
    let model = Arc::new(HybridModel::random(ModelDims::default(), 42).unwrap());
    let normalizer = Arc::new(FeatureNormalizer::cardiac(StandardizationStats::identity(13)));
    InferenceEngine::new(model, normalizer).unwrap()
}

fn patient() -> Map<String, Value> {
    match json!({
        "age": 63, "sex": 1, "cp": 3, "trestbps": 145, "chol": 233, "fbs": 1,
        "restecg": 0, "thalach": 150, "exang": 0, "oldpeak": 2.3, "slope": 0,
        "ca": 0, "thal": 1, "Subject": "P1"
    }) {
        Value::Object(m) => m,
        _ => unreachable!(),
    }
}

/// Benchmark: one cardiac request (placeholder 30-step sequence).
fn bench_predict_heart(c: &mut Criterion) {
    let engine = production_engine();
    let record = patient();

    c.bench_function("bench_predict_heart", |b| {
        b.iter(|| std::hint::black_box(engine.predict_heart(&record)))
    });
}

/// Benchmark: one glucose request over a 30-sample CGM window.
fn bench_predict_glucose(c: &mut Criterion) {
    let engine = production_engine();
    let cgm: Vec<f32> = (0..30).map(|t| 120.0 + (t as f32 * 0.3).sin() * 10.0).collect();

    c.bench_function("bench_predict_glucose", |b| {
        b.iter(|| std::hint::black_box(engine.predict_glucose(&cgm)))
    });
}

/// Benchmark: 32 cardiac records sharing one broadcast placeholder context.
fn bench_predict_heart_batch(c: &mut Criterion) {
    let engine = production_engine();
    let records = vec![patient(); 32];

    c.bench_function("bench_predict_heart_batch_32", |b| {
        b.iter(|| std::hint::black_box(engine.predict_heart_batch(&records)))
    });
}

criterion_group!(
    benches,
    bench_predict_heart,
    bench_predict_glucose,
    bench_predict_heart_batch,
);
criterion_main!(benches);
