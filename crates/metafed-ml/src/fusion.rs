// ─────────────────────────────────────────────────────────────────────
// MetaFed Inference — Fusion Head
// License: GNU AGPL v3
// ─────────────────────────────────────────────────────────────────────
//! Combines tabular embeddings with sequence context and emits task logits.
//!
//! The heads are asymmetric: cardiac logits come from the fused
//! `[tabular, context]` representation, glucose logits from the sequence
//! context alone.

use metafed_types::config::ModelDims;
use metafed_types::error::{MetaFedError, MetaFedResult};
use ndarray::{concatenate, Array2, ArrayView2, Axis};
use rand::Rng;

use crate::layers::{relu, Linear};

/// Two-layer classifier: Linear → ReLU → Linear.
#[derive(Debug, Clone)]
pub struct ClassifierHead {
    pub hidden: Linear,
    pub out: Linear,
}

impl ClassifierHead {
    pub fn random<R: Rng>(in_dim: usize, hidden: usize, classes: usize, rng: &mut R) -> Self {
        ClassifierHead {
            hidden: Linear::random(in_dim, hidden, rng),
            out: Linear::random(hidden, classes, rng),
        }
    }

    pub fn forward(&self, x: &ArrayView2<f32>) -> Array2<f32> {
        let h = relu(self.hidden.forward(x));
        self.out.forward(&h.view())
    }
}

/// Align sequence context with a tabular batch of `rows`.
///
/// Equal batch sizes pair positionally. Otherwise the context is averaged
/// over its batch and broadcast to every tabular row.
pub fn reconcile_context(context: &ArrayView2<f32>, rows: usize) -> MetaFedResult<Array2<f32>> {
    if context.nrows() == rows {
        return Ok(context.to_owned());
    }
    let mean = context
        .mean_axis(Axis(0))
        .ok_or_else(|| MetaFedError::Inference("Empty sequence context batch".to_string()))?;
    mean.broadcast((rows, mean.len()))
        .map(|view| view.to_owned())
        .ok_or_else(|| {
            MetaFedError::Inference(format!("Cannot broadcast context to {rows} rows"))
        })
}

#[derive(Debug, Clone)]
pub struct FusionHead {
    /// Linear(fused, fused / 2) followed by ReLU.
    pub combined_proj: Linear,
    pub heart_head: ClassifierHead,
    pub glucose_head: ClassifierHead,
}

impl FusionHead {
    pub fn random<R: Rng>(dims: &ModelDims, rng: &mut R) -> Self {
        let fused = dims.fused_dim();
        FusionHead {
            combined_proj: Linear::random(fused, fused / 2, rng),
            heart_head: ClassifierHead::random(
                fused / 2,
                dims.heart_head_hidden,
                dims.n_heart_classes,
                rng,
            ),
            glucose_head: ClassifierHead::random(
                dims.d_model,
                dims.diab_head_hidden,
                dims.n_glucose_classes,
                rng,
            ),
        }
    }

    /// Fused representation: (N, tab) ⊕ (N|B, d_model) → (N, fused / 2).
    pub fn fuse(
        &self,
        tabular: &ArrayView2<f32>,
        context: &ArrayView2<f32>,
    ) -> MetaFedResult<Array2<f32>> {
        let aligned = reconcile_context(context, tabular.nrows())?;
        let fused = concatenate(Axis(1), &[tabular.view(), aligned.view()])
            .map_err(|e| MetaFedError::Inference(format!("Fusion concat failed: {e}")))?;
        Ok(relu(self.combined_proj.forward(&fused.view())))
    }

    /// Cardiac logits: (N, n_heart_classes).
    pub fn heart_logits(
        &self,
        tabular: &ArrayView2<f32>,
        context: &ArrayView2<f32>,
    ) -> MetaFedResult<Array2<f32>> {
        let z = self.fuse(tabular, context)?;
        Ok(self.heart_head.forward(&z.view()))
    }

    /// Glucose logits straight from sequence context: (B, n_glucose_classes).
    pub fn glucose_logits(&self, context: &ArrayView2<f32>) -> Array2<f32> {
        self.glucose_head.forward(context)
    }
}
