// ─────────────────────────────────────────────────────────────────────
// MetaFed Inference — Layers
// License: GNU AGPL v3
// ─────────────────────────────────────────────────────────────────────
//! Dense building blocks shared by both encoders.
//!
//! Weights keep the PyTorch layout: a `Linear` weight is `(out, in)`.

use metafed_types::constants::NORM_EPS;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::Rng;

/// Fully connected layer: `y = x Wᵀ + b`.
#[derive(Debug, Clone)]
pub struct Linear {
    pub weight: Array2<f32>, // (out, in)
    pub bias: Array1<f32>,   // (out,)
}

impl Linear {
    /// Xavier-uniform weights, zero bias.
    pub fn random<R: Rng>(in_dim: usize, out_dim: usize, rng: &mut R) -> Self {
        let scale = (6.0 / (in_dim + out_dim) as f32).sqrt();
        Linear {
            weight: Array2::from_shape_fn((out_dim, in_dim), |_| rng.gen_range(-scale..scale)),
            bias: Array1::from_shape_fn(out_dim, |_| rng.gen_range(-0.05..0.05)),
        }
    }

    pub fn in_dim(&self) -> usize {
        self.weight.ncols()
    }

    pub fn out_dim(&self) -> usize {
        self.weight.nrows()
    }

    /// Forward: (n, in) → (n, out).
    pub fn forward(&self, x: &ArrayView2<f32>) -> Array2<f32> {
        x.dot(&self.weight.t()) + &self.bias
    }
}

/// Layer normalization over the last dimension with learned affine.
#[derive(Debug, Clone)]
pub struct LayerNorm {
    pub gamma: Array1<f32>,
    pub beta: Array1<f32>,
}

impl LayerNorm {
    pub fn identity(dim: usize) -> Self {
        LayerNorm {
            gamma: Array1::ones(dim),
            beta: Array1::zeros(dim),
        }
    }

    pub fn dim(&self) -> usize {
        self.gamma.len()
    }

    /// Forward: normalizes each row independently.
    pub fn forward(&self, x: &ArrayView2<f32>) -> Array2<f32> {
        let mut out = x.to_owned();
        for mut row in out.rows_mut() {
            let normed = normalize_row(&row.view());
            row.assign(&(normed * &self.gamma + &self.beta));
        }
        out
    }
}

fn normalize_row(x: &ArrayView1<f32>) -> Array1<f32> {
    let n = x.len() as f32;
    let mean = x.sum() / n;
    let var = x.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
    let std = (var + NORM_EPS).sqrt();
    x.mapv(|v| (v - mean) / std)
}

/// Batch normalization frozen to its running statistics.
///
/// There is no batch-statistics path: a single-row batch normalizes the same
/// way as a large one.
#[derive(Debug, Clone)]
pub struct BatchNorm {
    pub gamma: Array1<f32>,
    pub beta: Array1<f32>,
    pub running_mean: Array1<f32>,
    pub running_var: Array1<f32>,
}

impl BatchNorm {
    pub fn random<R: Rng>(dim: usize, rng: &mut R) -> Self {
        BatchNorm {
            gamma: Array1::from_shape_fn(dim, |_| rng.gen_range(0.8..1.2)),
            beta: Array1::from_shape_fn(dim, |_| rng.gen_range(-0.1..0.1)),
            running_mean: Array1::from_shape_fn(dim, |_| rng.gen_range(-0.2..0.2)),
            running_var: Array1::from_shape_fn(dim, |_| rng.gen_range(0.5..1.5)),
        }
    }

    pub fn dim(&self) -> usize {
        self.gamma.len()
    }

    /// Forward: (n, dim) → (n, dim).
    pub fn forward(&self, x: &ArrayView2<f32>) -> Array2<f32> {
        let scale = self.running_var.mapv(|v| (v + NORM_EPS).sqrt().recip()) * &self.gamma;
        (x - &self.running_mean) * &scale + &self.beta
    }
}

pub fn relu(x: Array2<f32>) -> Array2<f32> {
    x.mapv_into(|v| v.max(0.0))
}

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Numerically stable softmax applied to each row.
pub fn softmax_rows(scores: &Array2<f32>) -> Array2<f32> {
    let mut out = scores.clone();
    for mut row in out.rows_mut() {
        let max_val = row.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        row.mapv_inplace(|v| (v - max_val).exp());
        let sum = row.sum();
        row /= sum;
    }
    out
}

/// Index of the largest value; ties resolve to the lowest index.
pub fn argmax(row: &ArrayView1<f32>) -> usize {
    let mut best = 0;
    for (i, &v) in row.iter().enumerate() {
        if v > row[best] {
            best = i;
        }
    }
    best
}

/// Row-wise argmax of a logit matrix.
pub fn argmax_rows(logits: &Array2<f32>) -> Vec<usize> {
    logits.axis_iter(Axis(0)).map(|row| argmax(&row)).collect()
}
