// ─────────────────────────────────────────────────────────────────────
// MetaFed Inference — Feature Normalizer
// License: GNU AGPL v3
// ─────────────────────────────────────────────────────────────────────
//! Clinical record → standardized feature row.
//!
//! Presence is checked first (`Schema` error listing every absent name), then
//! each value is coerced to a number with a zero fallback, then the pre-fit
//! `(x - mean) / scale` standardization is applied. Fallbacks are counted for
//! the lifetime of the normalizer.

use std::sync::atomic::{AtomicU64, Ordering};

use metafed_types::constants::{CARDIAC_FEATURES, NUMERIC_FALLBACK};
use metafed_types::error::{MetaFedError, MetaFedResult};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

/// Per-feature standardization statistics, fit offline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardizationStats {
    /// Column names the statistics were fit on, when the exporter recorded them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_names: Option<Vec<String>>,
    pub mean: Vec<f32>,
    pub scale: Vec<f32>,
}

impl StandardizationStats {
    /// Pass-through statistics: mean 0, scale 1.
    pub fn identity(n_features: usize) -> Self {
        StandardizationStats {
            feature_names: None,
            mean: vec![0.0; n_features],
            scale: vec![1.0; n_features],
        }
    }

    pub fn from_file(path: &str) -> MetaFedResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let stats: Self = serde_json::from_str(&contents)?;
        info!(path, n_features = stats.mean.len(), "Loaded standardization statistics");
        Ok(stats)
    }

    pub fn len(&self) -> usize {
        self.mean.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mean.is_empty()
    }

    /// Compare recorded column names against `schema`. Statistics without
    /// names cannot be checked and pass.
    pub fn check_feature_order(&self, schema: &[String]) -> MetaFedResult<()> {
        match &self.feature_names {
            Some(names) if names.as_slice() != schema => Err(MetaFedError::ConfigError(format!(
                "Statistics were fit on columns {names:?}, schema is {schema:?}"
            ))),
            _ => Ok(()),
        }
    }
}

/// Marker for a value that could not be read as a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumericFallback;

impl NumericFallback {
    pub fn value(self) -> f32 {
        NUMERIC_FALLBACK
    }
}

fn parse_wide(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Read a JSON value as a number.
///
/// Numbers pass through, booleans map to 1/0, strings are trimmed and parsed.
/// Null, arrays, objects, unparsable strings and NaN yield the fallback.
pub fn try_parse_numeric(value: &Value) -> Result<f32, NumericFallback> {
    parse_wide(value)
        .filter(|v| !v.is_nan())
        .map(|v| v as f32)
        .ok_or(NumericFallback)
}

/// Finite value too large for `f32`. Narrowing it would produce infinity.
fn exceeds_f32(value: &Value) -> bool {
    parse_wide(value).is_some_and(|v| v.is_finite() && v.abs() > f32::MAX as f64)
}

#[derive(Debug)]
pub struct FeatureNormalizer {
    fields: Vec<String>,
    stats: StandardizationStats,
    fallbacks: AtomicU64,
}

impl FeatureNormalizer {
    pub fn new(fields: Vec<String>, stats: StandardizationStats) -> Self {
        FeatureNormalizer {
            fields,
            stats,
            fallbacks: AtomicU64::new(0),
        }
    }

    /// Normalizer over the cardiac schema.
    pub fn cardiac(stats: StandardizationStats) -> Self {
        Self::new(CARDIAC_FEATURES.iter().map(|f| f.to_string()).collect(), stats)
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn width(&self) -> usize {
        self.fields.len()
    }

    pub fn stats(&self) -> &StandardizationStats {
        &self.stats
    }

    /// Values replaced by the numeric fallback so far.
    pub fn fallback_count(&self) -> u64 {
        self.fallbacks.load(Ordering::Relaxed)
    }

    /// Schema fields absent from `record`, in schema order.
    pub fn missing_fields(&self, record: &Map<String, Value>) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| !record.contains_key(f.as_str()))
            .cloned()
            .collect()
    }

    /// Coerced but unscaled row. Fails on absent fields, then on finite values
    /// outside the `f32` range.
    pub fn raw_row(&self, record: &Map<String, Value>) -> MetaFedResult<Array1<f32>> {
        let missing = self.missing_fields(record);
        if !missing.is_empty() {
            return Err(MetaFedError::Schema { missing });
        }
        if let Some(f) = self.fields.iter().find(|f| exceeds_f32(&record[f.as_str()])) {
            return Err(MetaFedError::Validation(format!(
                "Value for '{f}' is outside the single-precision range"
            )));
        }
        let row = self
            .fields
            .iter()
            .map(|f| {
                try_parse_numeric(&record[f.as_str()]).unwrap_or_else(|fallback| {
                    let total = self.fallbacks.fetch_add(1, Ordering::Relaxed) + 1;
                    debug!(field = %f, total, "Non-numeric feature value, substituting fallback");
                    fallback.value()
                })
            })
            .collect();
        Ok(Array1::from_vec(row))
    }

    /// Apply `(x - mean) / scale`.
    pub fn standardize(&self, raw: &Array1<f32>) -> MetaFedResult<Array1<f32>> {
        self.check_stats(raw.len())?;
        let mean = Array1::from_vec(self.stats.mean.clone());
        let scale = Array1::from_vec(self.stats.scale.clone());
        let out = (raw - &mean) / &scale;
        if let Some(i) = out.iter().position(|v| !v.is_finite()) {
            return Err(MetaFedError::Transform(format!(
                "Standardized value for '{}' is not finite",
                self.fields.get(i).map(String::as_str).unwrap_or("?")
            )));
        }
        Ok(out)
    }

    /// Full pipeline for one record: presence → coercion → standardization.
    pub fn transform(&self, record: &Map<String, Value>) -> MetaFedResult<Array1<f32>> {
        let raw = self.raw_row(record)?;
        self.standardize(&raw)
    }

    /// Batch pipeline: N records → (N, width). The first failing record aborts.
    pub fn transform_batch(&self, records: &[Map<String, Value>]) -> MetaFedResult<Array2<f32>> {
        let mut out = Array2::zeros((records.len(), self.width()));
        for (i, record) in records.iter().enumerate() {
            out.row_mut(i).assign(&self.transform(record)?);
        }
        Ok(out)
    }

    fn check_stats(&self, width: usize) -> MetaFedResult<()> {
        if self.stats.mean.len() != width || self.stats.scale.len() != width {
            return Err(MetaFedError::Transform(format!(
                "Statistics cover mean={} scale={} features, row has {width}",
                self.stats.mean.len(),
                self.stats.scale.len()
            )));
        }
        if let Some(i) = self
            .stats
            .scale
            .iter()
            .position(|s| *s == 0.0 || !s.is_finite())
        {
            return Err(MetaFedError::Transform(format!(
                "Invalid scale {} for feature index {i}",
                self.stats.scale[i]
            )));
        }
        if self.stats.mean.iter().any(|m| !m.is_finite()) {
            return Err(MetaFedError::Transform("Non-finite mean in statistics".to_string()));
        }
        Ok(())
    }
}
