// ─────────────────────────────────────────────────────────────────────
// MetaFed Inference — Types
// License: GNU AGPL v3
// ─────────────────────────────────────────────────────────────────────
pub mod config;
pub mod constants;
pub mod error;
