// ─────────────────────────────────────────────────────────────────────
// MetaFed Inference — Attention
// License: GNU AGPL v3
// ─────────────────────────────────────────────────────────────────────
//! Post-norm Transformer encoder layer.
//!
//! `x ← LN₁(x + MHA(x));  x ← LN₂(x + FF(x))`, with a ReLU feedforward.
//! Attention is unmasked: every timestep attends to every other.

use ndarray::{s, Array2, ArrayView2};
use rand::Rng;

use crate::layers::{relu, softmax_rows, LayerNorm, Linear};

/// Scaled dot-product attention: softmax(Q K^T / sqrt(d)) V.
/// Q, K, V: (seq_len, d_head).
fn scaled_attention(q: &ArrayView2<f32>, k: &ArrayView2<f32>, v: &ArrayView2<f32>) -> Array2<f32> {
    let d = q.ncols() as f32;
    let scores = q.dot(&k.t()) / d.sqrt(); // (seq, seq)
    softmax_rows(&scores).dot(v)
}

/// Multi-head self-attention with a packed QKV projection.
#[derive(Debug, Clone)]
pub struct MultiHeadAttention {
    /// Rows `[0, d)` project Q, `[d, 2d)` K, `[2d, 3d)` V.
    pub in_proj: Linear, // (3d, d)
    pub out_proj: Linear, // (d, d)
    pub n_heads: usize,
}

impl MultiHeadAttention {
    pub fn random<R: Rng>(d_model: usize, n_heads: usize, rng: &mut R) -> Self {
        MultiHeadAttention {
            in_proj: Linear::random(d_model, 3 * d_model, rng),
            out_proj: Linear::random(d_model, d_model, rng),
            n_heads,
        }
    }

    pub fn d_model(&self) -> usize {
        self.out_proj.out_dim()
    }

    /// Forward: x (seq_len, d_model) → (seq_len, d_model).
    pub fn forward(&self, x: &ArrayView2<f32>) -> Array2<f32> {
        let d = self.d_model();
        let d_head = d / self.n_heads;
        let qkv = self.in_proj.forward(x); // (seq, 3d)

        let mut merged = Array2::zeros((x.nrows(), d));
        for h in 0..self.n_heads {
            let start = h * d_head;
            let end = start + d_head;
            let head = scaled_attention(
                &qkv.slice(s![.., start..end]),
                &qkv.slice(s![.., d + start..d + end]),
                &qkv.slice(s![.., 2 * d + start..2 * d + end]),
            );
            merged.slice_mut(s![.., start..end]).assign(&head);
        }

        self.out_proj.forward(&merged.view())
    }
}

/// Feedforward sublayer: linear → relu → linear.
#[derive(Debug, Clone)]
pub struct FeedForward {
    pub linear1: Linear,
    pub linear2: Linear,
}

impl FeedForward {
    pub fn random<R: Rng>(d_model: usize, dim_ff: usize, rng: &mut R) -> Self {
        FeedForward {
            linear1: Linear::random(d_model, dim_ff, rng),
            linear2: Linear::random(dim_ff, d_model, rng),
        }
    }

    /// Forward: (seq, d_model) → (seq, d_model).
    pub fn forward(&self, x: &ArrayView2<f32>) -> Array2<f32> {
        let h = relu(self.linear1.forward(x));
        self.linear2.forward(&h.view())
    }
}

/// Single Transformer encoder layer.
#[derive(Debug, Clone)]
pub struct EncoderLayer {
    pub attn: MultiHeadAttention,
    pub norm1: LayerNorm,
    pub ff: FeedForward,
    pub norm2: LayerNorm,
}

impl EncoderLayer {
    pub fn random<R: Rng>(d_model: usize, n_heads: usize, dim_ff: usize, rng: &mut R) -> Self {
        EncoderLayer {
            attn: MultiHeadAttention::random(d_model, n_heads, rng),
            norm1: LayerNorm::identity(d_model),
            ff: FeedForward::random(d_model, dim_ff, rng),
            norm2: LayerNorm::identity(d_model),
        }
    }

    /// Forward with residual connections and layer norm.
    pub fn forward(&self, x: &ArrayView2<f32>) -> Array2<f32> {
        let post_attn = self.norm1.forward(&(x + &self.attn.forward(x)).view());
        let ff_out = self.ff.forward(&post_attn.view());
        self.norm2.forward(&(&post_attn + &ff_out).view())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_attention_preserves_shape() {
        let q = Array2::from_elem((10, 8), 0.1f32);
        let k = Array2::from_elem((10, 8), 0.1f32);
        let v = Array2::from_elem((10, 8), 0.1f32);
        let out = scaled_attention(&q.view(), &k.view(), &v.view());
        assert_eq!(out.dim(), (10, 8));
    }

    #[test]
    fn test_uniform_scores_average_values() {
        // Identical keys give uniform weights, so each output row is the mean of V.
        let q = Array2::from_shape_fn((3, 2), |(i, _)| i as f32);
        let k = Array2::zeros((3, 2));
        let v = Array2::from_shape_fn((3, 2), |(i, j)| (i * 2 + j) as f32);
        let out = scaled_attention(&q.view(), &k.view(), &v.view());
        for row in out.rows() {
            assert!((row[0] - 2.0).abs() < 1e-6);
            assert!((row[1] - 3.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_every_step_sees_every_other() {
        let mut rng = StdRng::seed_from_u64(11);
        let mha = MultiHeadAttention::random(8, 2, &mut rng);
        let x = Array2::from_shape_fn((5, 8), |(i, j)| ((i + j) as f32).sin());
        let base = mha.forward(&x.view());

        let mut perturbed = x.clone();
        perturbed[[4, 0]] += 1.0;
        let out = mha.forward(&perturbed.view());
        // Unmasked: changing the last step moves the first step's output too.
        let delta: f32 = (&out.row(0) - &base.row(0)).mapv(f32::abs).sum();
        assert!(delta > 1e-6);
    }

    #[test]
    fn test_heads_fill_their_own_columns() {
        // Identity out_proj exposes the merged heads unchanged.
        let mut rng = StdRng::seed_from_u64(5);
        let mut mha = MultiHeadAttention::random(4, 2, &mut rng);
        mha.out_proj.weight = Array2::eye(4);
        mha.out_proj.bias.fill(0.0);
        let x = Array2::from_shape_fn((3, 4), |(i, j)| (i as f32 + 1.0) * (j as f32 - 1.5));
        let out = mha.forward(&x.view());

        let qkv = mha.in_proj.forward(&x.view());
        for h in 0..2 {
            let (a, b) = (h * 2, h * 2 + 2);
            let expected = scaled_attention(
                &qkv.slice(s![.., a..b]),
                &qkv.slice(s![.., 4 + a..4 + b]),
                &qkv.slice(s![.., 8 + a..8 + b]),
            );
            for (o, e) in out.slice(s![.., a..b]).iter().zip(expected.iter()) {
                assert!((o - e).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_encoder_layer_output_is_normalized() {
        let mut rng = StdRng::seed_from_u64(3);
        let layer = EncoderLayer::random(8, 4, 16, &mut rng);
        let x = Array2::from_shape_fn((6, 8), |(i, j)| (i as f32) - (j as f32) * 0.5);
        let out = layer.forward(&x.view());
        assert_eq!(out.dim(), (6, 8));
        for row in out.rows() {
            assert!((row.sum() / 8.0).abs() < 1e-4);
        }
    }
}
