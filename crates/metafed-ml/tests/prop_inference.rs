// ─────────────────────────────────────────────────────────────────────
// MetaFed Inference — Property-Based Tests (proptest) for metafed-ml
// License: GNU AGPL v3
// ─────────────────────────────────────────────────────────────────────
//! Property-based tests for the inference pipeline using proptest.
//!
//! Covers: class ranges for both tasks, determinism, missing-field
//! reporting, numeric fallback, batch broadcast independence.

use std::sync::Arc;

use metafed_ml::inference::{InferenceEngine, InputSlot, SequenceSlot};
use metafed_ml::model::HybridModel;
use metafed_ml::normalizer::{FeatureNormalizer, StandardizationStats};
use metafed_types::config::ModelDims;
use metafed_types::constants::CARDIAC_FEATURES;
use metafed_types::error::MetaFedError;
use ndarray::{s, Array2};
use proptest::prelude::*;
use serde_json::{Map, Value};

fn compact_dims() -> ModelDims {
    ModelDims {
        gru_hidden: 8,
        d_model: 8,
        n_heads: 2,
        n_layers: 1,
        dim_ff: 16,
        heart_hidden: [12, 6],
        heart_head_hidden: 6,
        diab_head_hidden: 6,
        ..ModelDims::default()
    }
}

fn engine(seed: u64) -> InferenceEngine {
    let model = Arc::new(HybridModel::random(compact_dims(), seed).unwrap());
    let mut stats = StandardizationStats::identity(CARDIAC_FEATURES.len());
    stats.mean = vec![54.0, 0.7, 1.0, 131.0, 246.0, 0.15, 0.5, 150.0, 0.3, 1.0, 1.4, 0.7, 2.3];
    stats.scale = vec![9.0, 0.5, 1.0, 17.0, 51.0, 0.36, 0.5, 23.0, 0.47, 1.2, 0.6, 1.0, 0.6];
    let normalizer = Arc::new(FeatureNormalizer::cardiac(stats));
    InferenceEngine::new(model, normalizer).unwrap()
}

fn record_from(values: &[f64]) -> Map<String, Value> {
    CARDIAC_FEATURES
        .iter()
        .zip(values)
        .map(|(name, v)| (name.to_string(), Value::from(*v)))
        .collect()
}

fn clinical_values() -> impl Strategy<Value = Vec<f64>> {
    proptest::collection::vec(-500.0f64..500.0, CARDIAC_FEATURES.len())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Every complete record yields a cardiac class in 0..5.
    #[test]
    fn cardiac_class_in_range(values in clinical_values(), seed in 0u64..4) {
        let pred = engine(seed).predict_heart(&record_from(&values)).unwrap();
        prop_assert!(pred.heart_risk_class < 5);
    }

    /// Any non-empty finite CGM series yields a glucose class in 0..3.
    #[test]
    fn glucose_class_in_range(
        cgm in proptest::collection::vec(40.0f32..400.0, 1..60),
        seed in 0u64..4,
    ) {
        let pred = engine(seed).predict_glucose(&cgm).unwrap();
        prop_assert!(pred.glucose_trend_class < 3);
    }

    /// Repeating a request against the same model repeats the answer.
    #[test]
    fn predictions_are_deterministic(
        values in clinical_values(),
        cgm in proptest::collection::vec(40.0f32..400.0, 1..40),
    ) {
        let e = engine(1);
        let rec = record_from(&values);
        prop_assert_eq!(e.predict_heart(&rec).unwrap(), e.predict_heart(&rec).unwrap());
        prop_assert_eq!(e.predict_glucose(&cgm).unwrap(), e.predict_glucose(&cgm).unwrap());
    }

    /// Removing any subset of fields reports exactly that subset, in schema order.
    #[test]
    fn missing_fields_reported_exactly(
        values in clinical_values(),
        mask in proptest::collection::vec(any::<bool>(), CARDIAC_FEATURES.len()),
    ) {
        prop_assume!(mask.iter().any(|&m| m));
        let mut rec = record_from(&values);
        let mut expected = Vec::new();
        for (name, drop) in CARDIAC_FEATURES.iter().zip(&mask) {
            if *drop {
                rec.remove(*name);
                expected.push(name.to_string());
            }
        }
        match engine(0).predict_heart(&rec) {
            Err(MetaFedError::Schema { missing }) => prop_assert_eq!(missing, expected),
            other => prop_assert!(false, "expected schema error, got {:?}", other),
        }
    }

    /// Non-numeric text in any field is read as zero, never an error.
    #[test]
    fn non_numeric_field_falls_back(
        values in clinical_values(),
        idx in 0usize..13,
        junk in "[a-zA-Z ]{1,12}",
    ) {
        prop_assume!(junk.trim().parse::<f32>().is_err());
        let e = engine(2);
        let mut rec = record_from(&values);
        rec.insert(CARDIAC_FEATURES[idx].to_string(), Value::String(junk));
        let with_junk = e.predict_heart(&rec).unwrap();

        let mut zeroed = values.clone();
        zeroed[idx] = 0.0;
        let with_zero = e.predict_heart(&record_from(&zeroed)).unwrap();
        prop_assert_eq!(with_junk.heart_risk_class, with_zero.heart_risk_class);
    }

    /// A tabular batch of N against one placeholder sequence fuses to N rows,
    /// and each row matches running that row alone.
    #[test]
    fn broadcast_rows_are_independent(
        n in 2usize..6,
        scale in 0.1f32..3.0,
    ) {
        let e = engine(3);
        let tab = Array2::from_shape_fn((n, CARDIAC_FEATURES.len()), |(i, j)| {
            ((i * 13 + j) as f32 * 0.37).sin() * scale
        });
        let placeholder = SequenceSlot { len: 30 }.placeholder();
        let batched = e.model().forward(&tab.view(), &placeholder.view()).unwrap();
        prop_assert_eq!(batched.heart_logits.nrows(), n);
        prop_assert_eq!(batched.glucose_logits.nrows(), 1);

        for i in 0..n {
            let single = e.model().forward(&tab.slice(s![i..i + 1, ..]), &placeholder.view()).unwrap();
            for (a, b) in batched.heart_logits.row(i).iter().zip(single.heart_logits.row(0).iter()) {
                prop_assert!((a - b).abs() < 1e-4, "row {} diverged: {} vs {}", i, a, b);
            }
        }
    }
}
