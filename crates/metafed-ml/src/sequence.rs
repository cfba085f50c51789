// ─────────────────────────────────────────────────────────────────────
// MetaFed Inference — Sequence Encoder
// License: GNU AGPL v3
// ─────────────────────────────────────────────────────────────────────
//! CGM sequence encoder: BiGRU → projection → Transformer stack → LayerNorm.
//!
//! The embedding handed to fusion is the representation at the last timestep,
//! not a pooled average.

use metafed_types::config::ModelDims;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::Rng;

use crate::attention::EncoderLayer;
use crate::gru::BiGru;
use crate::layers::{LayerNorm, Linear};

#[derive(Debug, Clone)]
pub struct SequenceEncoder {
    pub gru: BiGru,
    /// Linear(2H, d_model).
    pub proj: Linear,
    pub layers: Vec<EncoderLayer>,
    pub norm: LayerNorm,
}

impl SequenceEncoder {
    pub fn random<R: Rng>(dims: &ModelDims, rng: &mut R) -> Self {
        SequenceEncoder {
            gru: BiGru::random(1, dims.gru_hidden, rng),
            proj: Linear::random(2 * dims.gru_hidden, dims.d_model, rng),
            layers: (0..dims.n_layers)
                .map(|_| EncoderLayer::random(dims.d_model, dims.n_heads, dims.dim_ff, rng))
                .collect(),
            norm: LayerNorm::identity(dims.d_model),
        }
    }

    pub fn d_model(&self) -> usize {
        self.proj.out_dim()
    }

    /// Contextualized per-timestep representation: (T,) → (T, d_model).
    pub fn contextualize(&self, series: &ArrayView1<f32>) -> Array2<f32> {
        let xs = series.view().insert_axis(Axis(1)); // (T, 1)
        let recurrent = self.gru.forward(&xs);
        let mut x = self.proj.forward(&recurrent.view());
        for layer in &self.layers {
            x = layer.forward(&x.view());
        }
        self.norm.forward(&x.view())
    }

    /// Embedding of one series: last row of [`contextualize`](Self::contextualize).
    /// The caller guarantees `series` is non-empty.
    pub fn encode_one(&self, series: &ArrayView1<f32>) -> Array1<f32> {
        let ctx = self.contextualize(series);
        ctx.row(ctx.nrows() - 1).to_owned()
    }

    /// Batch forward: (B, T) → (B, d_model).
    pub fn encode(&self, batch: &ArrayView2<f32>) -> Array2<f32> {
        let mut out = Array2::zeros((batch.nrows(), self.d_model()));
        for (i, series) in batch.outer_iter().enumerate() {
            out.row_mut(i).assign(&self.encode_one(&series));
        }
        out
    }
}
