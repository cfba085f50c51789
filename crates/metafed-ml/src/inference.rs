// ─────────────────────────────────────────────────────────────────────
// MetaFed Inference — Inference Engine
// License: GNU AGPL v3
// ─────────────────────────────────────────────────────────────────────
//! Request orchestration: validate → build tensors → forward → argmax.
//!
//! The network always takes both a tabular and a sequence batch. Whichever
//! slot the caller leaves empty is filled by that slot's zero placeholder,
//! built per request and dropped after the forward pass.

use std::sync::Arc;

use metafed_types::constants::{MAX_SEQ_LEN, PLACEHOLDER_SEQ_LEN, SUBJECT_FIELD};
use metafed_types::error::{MetaFedError, MetaFedResult};
use ndarray::{Array1, Array2, Axis};
use serde_json::{Map, Value};
use tracing::debug;

use crate::layers::argmax_rows;
use crate::model::{HybridModel, ModelOutput};
use crate::normalizer::FeatureNormalizer;

/// A model input slot that can stand in for itself when the caller omits it.
pub trait InputSlot {
    /// Zero-valued single-row batch with this slot's shape.
    fn placeholder(&self) -> Array2<f32>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TabularSlot {
    pub width: usize,
}

impl InputSlot for TabularSlot {
    fn placeholder(&self) -> Array2<f32> {
        Array2::zeros((1, self.width))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceSlot {
    pub len: usize,
}

impl InputSlot for SequenceSlot {
    fn placeholder(&self) -> Array2<f32> {
        Array2::zeros((1, self.len))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardiacPrediction {
    pub heart_risk_class: usize,
    /// `Subject` carried through from the request, if present.
    pub subject: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlucosePrediction {
    pub glucose_trend_class: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JointPrediction {
    pub heart_risk_class: Option<usize>,
    pub glucose_trend_class: Option<usize>,
}

/// Either or both task inputs for a single subject.
#[derive(Debug, Clone, Default)]
pub struct PredictionRequest {
    pub record: Option<Map<String, Value>>,
    pub cgm_values: Option<Vec<f32>>,
}

/// Shared, read-only inference entry point. Cheap to clone.
#[derive(Debug, Clone)]
pub struct InferenceEngine {
    model: Arc<HybridModel>,
    normalizer: Arc<FeatureNormalizer>,
    tabular_slot: TabularSlot,
    sequence_slot: SequenceSlot,
}

impl InferenceEngine {
    pub fn new(model: Arc<HybridModel>, normalizer: Arc<FeatureNormalizer>) -> MetaFedResult<Self> {
        let feature_dim = model.dims().feature_dim;
        if normalizer.width() != feature_dim {
            return Err(MetaFedError::ConfigError(format!(
                "Normalizer produces {} features, model expects {feature_dim}",
                normalizer.width()
            )));
        }
        Ok(InferenceEngine {
            model,
            normalizer,
            tabular_slot: TabularSlot { width: feature_dim },
            sequence_slot: SequenceSlot {
                len: PLACEHOLDER_SEQ_LEN,
            },
        })
    }

    pub fn model(&self) -> &HybridModel {
        &self.model
    }

    pub fn normalizer(&self) -> &FeatureNormalizer {
        &self.normalizer
    }

    /// Cardiac risk for one clinical record.
    pub fn predict_heart(&self, record: &Map<String, Value>) -> MetaFedResult<CardiacPrediction> {
        let row = self.normalizer.transform(record)?;
        let out = self.run(Some(row.insert_axis(Axis(0))), None)?;
        let heart_risk_class = first_class(&out.heart_logits)?;
        let subject = subject_of(record);
        debug!(subject = ?subject, heart_risk_class, "Cardiac prediction");
        Ok(CardiacPrediction {
            heart_risk_class,
            subject,
        })
    }

    /// Cardiac risk for N records sharing one placeholder sequence.
    pub fn predict_heart_batch(&self, records: &[Map<String, Value>]) -> MetaFedResult<Vec<usize>> {
        if records.is_empty() {
            return Err(MetaFedError::Validation("No records supplied".to_string()));
        }
        let rows = self.normalizer.transform_batch(records)?;
        let out = self.run(Some(rows), None)?;
        Ok(argmax_rows(&out.heart_logits))
    }

    /// Glucose trend for one CGM series.
    pub fn predict_glucose(&self, cgm_values: &[f32]) -> MetaFedResult<GlucosePrediction> {
        let series = sequence_batch(cgm_values)?;
        let out = self.run(None, Some(series))?;
        let glucose_trend_class = first_class(&out.glucose_logits)?;
        debug!(len = cgm_values.len(), glucose_trend_class, "Glucose prediction");
        Ok(GlucosePrediction {
            glucose_trend_class,
        })
    }

    /// Either or both tasks in one forward pass.
    pub fn predict(&self, request: &PredictionRequest) -> MetaFedResult<JointPrediction> {
        if request.record.is_none() && request.cgm_values.is_none() {
            return Err(MetaFedError::Validation(
                "Request carries neither clinical features nor CGM values".to_string(),
            ));
        }
        let tabular = match &request.record {
            Some(record) => Some(self.normalizer.transform(record)?.insert_axis(Axis(0))),
            None => None,
        };
        let sequence = match &request.cgm_values {
            Some(values) => Some(sequence_batch(values)?),
            None => None,
        };
        let out = self.run(tabular, sequence)?;
        Ok(JointPrediction {
            heart_risk_class: match request.record {
                Some(_) => Some(first_class(&out.heart_logits)?),
                None => None,
            },
            glucose_trend_class: match request.cgm_values {
                Some(_) => Some(first_class(&out.glucose_logits)?),
                None => None,
            },
        })
    }

    /// Fill absent slots with placeholders and run the network.
    fn run(&self, tabular: Option<Array2<f32>>, sequence: Option<Array2<f32>>) -> MetaFedResult<ModelOutput> {
        let tabular = tabular.unwrap_or_else(|| self.tabular_slot.placeholder());
        let sequence = sequence.unwrap_or_else(|| self.sequence_slot.placeholder());
        self.model.forward(&tabular.view(), &sequence.view())
    }
}

/// Extract and validate `cgm_values` from a request body.
pub fn parse_cgm_values(payload: &Value) -> MetaFedResult<Vec<f32>> {
    let values = payload
        .get("cgm_values")
        .ok_or_else(|| MetaFedError::Validation("Missing required field 'cgm_values'".to_string()))?
        .as_array()
        .ok_or_else(|| MetaFedError::Validation("'cgm_values' must be an array".to_string()))?;
    if values.is_empty() {
        return Err(MetaFedError::Validation("'cgm_values' must not be empty".to_string()));
    }
    check_seq_len(values.len())?;
    values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let x = v.as_f64().ok_or_else(|| {
                MetaFedError::Validation(format!("cgm_values[{i}] is not a number: {v}"))
            })?;
            if x.abs() > f32::MAX as f64 {
                return Err(MetaFedError::Validation(format!(
                    "cgm_values[{i}] is outside the single-precision range: {v}"
                )));
            }
            Ok(x as f32)
        })
        .collect()
}

fn check_seq_len(len: usize) -> MetaFedResult<()> {
    if len > MAX_SEQ_LEN {
        return Err(MetaFedError::Validation(format!(
            "CGM sequence has {len} values, at most {MAX_SEQ_LEN} are accepted"
        )));
    }
    Ok(())
}

fn sequence_batch(values: &[f32]) -> MetaFedResult<Array2<f32>> {
    if values.is_empty() {
        return Err(MetaFedError::Validation("CGM sequence is empty".to_string()));
    }
    check_seq_len(values.len())?;
    if let Some(i) = values.iter().position(|v| !v.is_finite()) {
        return Err(MetaFedError::Validation(format!(
            "CGM value at index {i} is not finite"
        )));
    }
    Ok(Array1::from_vec(values.to_vec()).insert_axis(Axis(0)))
}

fn first_class(logits: &Array2<f32>) -> MetaFedResult<usize> {
    argmax_rows(logits)
        .first()
        .copied()
        .ok_or_else(|| MetaFedError::Inference("Model returned no logits".to_string()))
}

fn subject_of(record: &Map<String, Value>) -> Option<String> {
    match record.get(SUBJECT_FIELD)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}
