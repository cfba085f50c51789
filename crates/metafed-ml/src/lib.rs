// ─────────────────────────────────────────────────────────────────────
// MetaFed Inference — ML
// License: GNU AGPL v3
// ─────────────────────────────────────────────────────────────────────
//! Multi-task cardiac/glucose model and its inference-time data contract.
//!
//! Sequence path: bidirectional GRU → projection → Transformer encoder → last step.
//! Tabular path: two Linear/BatchNorm/ReLU blocks. Both meet in the fusion head.

pub mod attention;
pub mod device;
pub mod fusion;
pub mod gru;
pub mod inference;
pub mod layers;
pub mod model;
pub mod normalizer;
pub mod params;
pub mod sequence;
pub mod tabular;
