// ─────────────────────────────────────────────────────────────────────
// MetaFed Inference — GRU
// License: GNU AGPL v3
// ─────────────────────────────────────────────────────────────────────
//! Single-layer bidirectional GRU with PyTorch gate ordering (r, z, n).
//!
//! ```text
//! r  = σ(W_ir x + b_ir + W_hr h + b_hr)
//! z  = σ(W_iz x + b_iz + W_hz h + b_hz)
//! n  = tanh(W_in x + b_in + r ⊙ (W_hn h + b_hn))
//! h' = (1 − z) ⊙ n + z ⊙ h
//! ```

use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2};
use rand::Rng;

use crate::layers::sigmoid;

/// Weights for one direction of the recurrence.
#[derive(Debug, Clone)]
pub struct GruDirection {
    pub w_ih: Array2<f32>, // (3H, in)
    pub w_hh: Array2<f32>, // (3H, H)
    pub b_ih: Array1<f32>, // (3H,)
    pub b_hh: Array1<f32>, // (3H,)
}

impl GruDirection {
    /// Uniform(-1/√H, 1/√H), the PyTorch default.
    pub fn random<R: Rng>(input_dim: usize, hidden: usize, rng: &mut R) -> Self {
        let k = (hidden as f32).sqrt().recip();
        GruDirection {
            w_ih: Array2::from_shape_fn((3 * hidden, input_dim), |_| rng.gen_range(-k..k)),
            w_hh: Array2::from_shape_fn((3 * hidden, hidden), |_| rng.gen_range(-k..k)),
            b_ih: Array1::from_shape_fn(3 * hidden, |_| rng.gen_range(-k..k)),
            b_hh: Array1::from_shape_fn(3 * hidden, |_| rng.gen_range(-k..k)),
        }
    }

    pub fn hidden(&self) -> usize {
        self.w_hh.ncols()
    }

    pub fn input_dim(&self) -> usize {
        self.w_ih.ncols()
    }

    fn step(&self, gi: &ArrayView1<f32>, h: &Array1<f32>) -> Array1<f32> {
        let hs = self.hidden();
        let gh = self.w_hh.dot(h) + &self.b_hh;
        Array1::from_shape_fn(hs, |j| {
            let r = sigmoid(gi[j] + gh[j]);
            let z = sigmoid(gi[hs + j] + gh[hs + j]);
            let n = (gi[2 * hs + j] + r * gh[2 * hs + j]).tanh();
            (1.0 - z) * n + z * h[j]
        })
    }

    /// Run over `xs` (T, in) from a zero state. Returns (T, H), indexed by
    /// original time position regardless of direction.
    pub fn run(&self, xs: &ArrayView2<f32>, reverse: bool) -> Array2<f32> {
        let steps = xs.nrows();
        let hs = self.hidden();
        // Input contributions do not depend on h; compute them for all steps at once.
        let gi_all = xs.dot(&self.w_ih.t()) + &self.b_ih; // (T, 3H)

        let mut out = Array2::zeros((steps, hs));
        let mut h = Array1::zeros(hs);
        let order: Box<dyn Iterator<Item = usize>> = if reverse {
            Box::new((0..steps).rev())
        } else {
            Box::new(0..steps)
        };
        for t in order {
            h = self.step(&gi_all.row(t), &h);
            out.row_mut(t).assign(&h);
        }
        out
    }
}

/// Bidirectional GRU emitting `[forward_t, backward_t]` per timestep.
#[derive(Debug, Clone)]
pub struct BiGru {
    pub forward: GruDirection,
    pub backward: GruDirection,
}

impl BiGru {
    pub fn random<R: Rng>(input_dim: usize, hidden: usize, rng: &mut R) -> Self {
        BiGru {
            forward: GruDirection::random(input_dim, hidden, rng),
            backward: GruDirection::random(input_dim, hidden, rng),
        }
    }

    pub fn hidden(&self) -> usize {
        self.forward.hidden()
    }

    /// Forward: (T, in) → (T, 2H).
    pub fn forward(&self, xs: &ArrayView2<f32>) -> Array2<f32> {
        let hs = self.hidden();
        let fwd = self.forward.run(xs, false);
        let bwd = self.backward.run(xs, true);
        let mut out = Array2::zeros((xs.nrows(), 2 * hs));
        out.slice_mut(s![.., ..hs]).assign(&fwd);
        out.slice_mut(s![.., hs..]).assign(&bwd);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// H = 1, input = 1, every weight zero except the candidate path.
    fn scalar_direction(w_in: f32) -> GruDirection {
        GruDirection {
            w_ih: array![[0.0], [0.0], [w_in]],
            w_hh: array![[0.0], [0.0], [0.0]],
            b_ih: array![0.0, 0.0, 0.0],
            b_hh: array![0.0, 0.0, 0.0],
        }
    }

    #[test]
    fn test_single_step_matches_closed_form() {
        // r = z = σ(0) = 0.5, n = tanh(x), h' = 0.5 n
        let dir = scalar_direction(1.0);
        let out = dir.run(&array![[0.8]].view(), false);
        assert!((out[[0, 0]] - 0.5 * 0.8f32.tanh()).abs() < 1e-6);
    }

    #[test]
    fn test_zero_input_keeps_zero_state() {
        let dir = scalar_direction(2.0);
        let out = dir.run(&Array2::zeros((5, 1)).view(), false);
        assert!(out.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_reverse_direction_accumulates_from_end() {
        let dir = scalar_direction(1.0);
        let xs = array![[1.0], [0.0], [0.0]];
        let fwd = dir.run(&xs.view(), false);
        let bwd = dir.run(&xs.view(), true);
        // Forward state is non-zero after the first step; the backward state
        // only sees the impulse at t = 0, its last step.
        assert!(fwd[[2, 0]] > 0.0);
        assert_eq!(bwd[[2, 0]], 0.0);
        assert_eq!(bwd[[1, 0]], 0.0);
        assert!(bwd[[0, 0]] > 0.0);
    }

    #[test]
    fn test_bidirectional_output_width() {
        let mut rng = StdRng::seed_from_u64(7);
        let gru = BiGru::random(1, 6, &mut rng);
        let xs = Array2::from_shape_fn((9, 1), |(t, _)| t as f32 * 0.1);
        let out = gru.forward(&xs.view());
        assert_eq!(out.dim(), (9, 12));
        assert!(out.iter().all(|v| v.is_finite() && v.abs() <= 1.0));
    }
}
