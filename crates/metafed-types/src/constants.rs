// ─────────────────────────────────────────────────────────────────────
// MetaFed Inference — Constants
// License: GNU AGPL v3
// ─────────────────────────────────────────────────────────────────────
/// Cardiac feature columns, in the order the standardization statistics were fit.
/// Reordering this list silently corrupts every cardiac prediction.
pub const CARDIAC_FEATURES: [&str; 13] = [
    "age", "sex", "cp", "trestbps", "chol", "fbs", "restecg", "thalach", "exang", "oldpeak",
    "slope", "ca", "thal",
];

/// Subject identifier carried alongside the features but never scaled.
pub const SUBJECT_FIELD: &str = "Subject";

/// Width of the tabular input row.
pub const N_FEATURES: usize = CARDIAC_FEATURES.len();

/// Sequence length used for the placeholder CGM input.
pub const PLACEHOLDER_SEQ_LEN: usize = 30;

/// Longest CGM series accepted per request. Attention memory grows with the
/// square of the length.
pub const MAX_SEQ_LEN: usize = 4096;

/// Cardiac risk grades 0..=4.
pub const N_HEART_CLASSES: usize = 5;

/// Glucose trend grades 0..=2.
pub const N_GLUCOSE_CLASSES: usize = 3;

/// Epsilon shared by LayerNorm and BatchNorm.
pub const NORM_EPS: f32 = 1e-5;

/// Value substituted for uncoercible clinical fields.
pub const NUMERIC_FALLBACK: f32 = 0.0;
