// ─────────────────────────────────────────────────────────────────────
// MetaFed Inference — Tabular Encoder
// License: GNU AGPL v3
// ─────────────────────────────────────────────────────────────────────
//! Clinical feature encoder: 2 × (Linear → BatchNorm → ReLU).

use metafed_types::config::ModelDims;
use ndarray::{Array2, ArrayView2};
use rand::Rng;

use crate::layers::{relu, BatchNorm, Linear};

#[derive(Debug, Clone)]
pub struct TabularBlock {
    pub linear: Linear,
    pub norm: BatchNorm,
}

impl TabularBlock {
    pub fn random<R: Rng>(in_dim: usize, out_dim: usize, rng: &mut R) -> Self {
        TabularBlock {
            linear: Linear::random(in_dim, out_dim, rng),
            norm: BatchNorm::random(out_dim, rng),
        }
    }

    pub fn forward(&self, x: &ArrayView2<f32>) -> Array2<f32> {
        let z = self.linear.forward(x);
        relu(self.norm.forward(&z.view()))
    }
}

#[derive(Debug, Clone)]
pub struct TabularEncoder {
    pub blocks: [TabularBlock; 2],
}

impl TabularEncoder {
    pub fn random<R: Rng>(dims: &ModelDims, rng: &mut R) -> Self {
        let [h1, h2] = dims.heart_hidden;
        TabularEncoder {
            blocks: [
                TabularBlock::random(dims.feature_dim, h1, rng),
                TabularBlock::random(h1, h2, rng),
            ],
        }
    }

    pub fn input_dim(&self) -> usize {
        self.blocks[0].linear.in_dim()
    }

    pub fn output_dim(&self) -> usize {
        self.blocks[1].linear.out_dim()
    }

    /// Forward: (N, features) → (N, heart_hidden[1]).
    pub fn encode(&self, x: &ArrayView2<f32>) -> Array2<f32> {
        let h = self.blocks[0].forward(x);
        self.blocks[1].forward(&h.view())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn encoder() -> TabularEncoder {
        let dims = ModelDims {
            heart_hidden: [16, 8],
            ..ModelDims::default()
        };
        TabularEncoder::random(&dims, &mut StdRng::seed_from_u64(9))
    }

    #[test]
    fn test_output_is_non_negative() {
        let enc = encoder();
        let x = Array2::from_shape_fn((4, 13), |(i, j)| (i as f32 - j as f32) * 0.3);
        let out = enc.encode(&x.view());
        assert_eq!(out.dim(), (4, 8));
        assert!(out.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn test_single_row_batch_matches_row_in_larger_batch() {
        // Running statistics make each row's embedding independent of its batch.
        let enc = encoder();
        let x = Array2::from_shape_fn((5, 13), |(i, j)| ((i * 13 + j) as f32).cos());
        let batch = enc.encode(&x.view());
        let single = enc.encode(&x.slice(ndarray::s![2..3, ..]));
        for (a, b) in batch.row(2).iter().zip(single.row(0).iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }
}
