// ─────────────────────────────────────────────────────────────────────
// MetaFed Inference — Hybrid Model
// License: GNU AGPL v3
// ─────────────────────────────────────────────────────────────────────
//! Hybrid GRU/Transformer multi-task network.
//!
//! The model is an inference-only graph: dropout is absent and batch-norm is
//! frozen to its running statistics. There is no train/eval switch to toggle,
//! so a shared `HybridModel` behaves identically for every concurrent caller.

use metafed_types::config::ModelDims;
use metafed_types::error::{MetaFedError, MetaFedResult};
use ndarray::{Array2, ArrayView2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use crate::attention::{EncoderLayer, FeedForward, MultiHeadAttention};
use crate::fusion::{ClassifierHead, FusionHead};
use crate::gru::BiGru;
use crate::layers::Linear;
use crate::params::{ParamReader, ParamWriter};
use crate::sequence::SequenceEncoder;
use crate::tabular::{TabularBlock, TabularEncoder};

/// Raw task scores for one forward pass.
#[derive(Debug, Clone)]
pub struct ModelOutput {
    /// (N, n_heart_classes), one row per tabular row.
    pub heart_logits: Array2<f32>,
    /// (B, n_glucose_classes), one row per sequence.
    pub glucose_logits: Array2<f32>,
}

#[derive(Debug, Clone)]
pub struct HybridModel {
    dims: ModelDims,
    sequence: SequenceEncoder,
    tabular: TabularEncoder,
    head: FusionHead,
}

impl HybridModel {
    /// Deterministic Xavier-style initialization from `seed`.
    pub fn random(dims: ModelDims, seed: u64) -> MetaFedResult<Self> {
        dims.validate()?;
        let mut rng = StdRng::seed_from_u64(seed);
        Ok(HybridModel {
            sequence: SequenceEncoder::random(&dims, &mut rng),
            tabular: TabularEncoder::random(&dims, &mut rng),
            head: FusionHead::random(&dims, &mut rng),
            dims,
        })
    }

    /// Load parameters from a state-dict `.npz` archive.
    pub fn from_npz(path: &str, dims: ModelDims) -> MetaFedResult<Self> {
        dims.validate()?;
        let mut npz = ParamReader::open(path)?;
        let h = dims.gru_hidden;
        let d = dims.d_model;
        let [th1, th2] = dims.heart_hidden;
        let fused = dims.fused_dim();

        let gru = BiGru {
            forward: npz.gru_direction("gru", "", 1, h)?,
            backward: npz.gru_direction("gru", "_reverse", 1, h)?,
        };
        let mut layers = Vec::with_capacity(dims.n_layers);
        for i in 0..dims.n_layers {
            let p = format!("transformer.layers.{i}");
            layers.push(EncoderLayer {
                attn: MultiHeadAttention {
                    in_proj: Linear {
                        weight: npz.array2(&format!("{p}.self_attn.in_proj_weight"), (3 * d, d))?,
                        bias: npz.array1(&format!("{p}.self_attn.in_proj_bias"), 3 * d)?,
                    },
                    out_proj: npz.linear(&format!("{p}.self_attn.out_proj"), d, d)?,
                    n_heads: dims.n_heads,
                },
                norm1: npz.layer_norm(&format!("{p}.norm1"), d)?,
                ff: FeedForward {
                    linear1: npz.linear(&format!("{p}.linear1"), d, dims.dim_ff)?,
                    linear2: npz.linear(&format!("{p}.linear2"), dims.dim_ff, d)?,
                },
                norm2: npz.layer_norm(&format!("{p}.norm2"), d)?,
            });
        }
        let sequence = SequenceEncoder {
            gru,
            proj: npz.linear("proj", 2 * h, d)?,
            layers,
            norm: npz.layer_norm("seq_norm", d)?,
        };

        let tabular = TabularEncoder {
            blocks: [
                TabularBlock {
                    linear: npz.linear("heart_mlp.0", dims.feature_dim, th1)?,
                    norm: npz.batch_norm("heart_mlp.1", th1)?,
                },
                TabularBlock {
                    linear: npz.linear("heart_mlp.4", th1, th2)?,
                    norm: npz.batch_norm("heart_mlp.5", th2)?,
                },
            ],
        };

        let head = FusionHead {
            combined_proj: npz.linear("combined_proj.0", fused, fused / 2)?,
            heart_head: ClassifierHead {
                hidden: npz.linear("heart_head.0", fused / 2, dims.heart_head_hidden)?,
                out: npz.linear("heart_head.3", dims.heart_head_hidden, dims.n_heart_classes)?,
            },
            glucose_head: ClassifierHead {
                hidden: npz.linear("diab_head.0", d, dims.diab_head_hidden)?,
                out: npz.linear("diab_head.3", dims.diab_head_hidden, dims.n_glucose_classes)?,
            },
        };

        info!(
            path,
            feature_dim = dims.feature_dim,
            d_model = d,
            layers = dims.n_layers,
            "Loaded hybrid model parameters"
        );
        Ok(HybridModel {
            dims,
            sequence,
            tabular,
            head,
        })
    }

    /// Write parameters using the same state-dict layout `from_npz` reads.
    pub fn save_npz(&self, path: &str) -> MetaFedResult<()> {
        let mut npz = ParamWriter::create(path)?;
        npz.gru_direction("gru", "", &self.sequence.gru.forward)?;
        npz.gru_direction("gru", "_reverse", &self.sequence.gru.backward)?;
        npz.linear("proj", &self.sequence.proj)?;
        for (i, layer) in self.sequence.layers.iter().enumerate() {
            let p = format!("transformer.layers.{i}");
            npz.array(&format!("{p}.self_attn.in_proj_weight"), &layer.attn.in_proj.weight)?;
            npz.array(&format!("{p}.self_attn.in_proj_bias"), &layer.attn.in_proj.bias)?;
            npz.linear(&format!("{p}.self_attn.out_proj"), &layer.attn.out_proj)?;
            npz.layer_norm(&format!("{p}.norm1"), &layer.norm1)?;
            npz.linear(&format!("{p}.linear1"), &layer.ff.linear1)?;
            npz.linear(&format!("{p}.linear2"), &layer.ff.linear2)?;
            npz.layer_norm(&format!("{p}.norm2"), &layer.norm2)?;
        }
        npz.layer_norm("seq_norm", &self.sequence.norm)?;
        npz.linear("heart_mlp.0", &self.tabular.blocks[0].linear)?;
        npz.batch_norm("heart_mlp.1", &self.tabular.blocks[0].norm)?;
        npz.linear("heart_mlp.4", &self.tabular.blocks[1].linear)?;
        npz.batch_norm("heart_mlp.5", &self.tabular.blocks[1].norm)?;
        npz.linear("combined_proj.0", &self.head.combined_proj)?;
        npz.linear("heart_head.0", &self.head.heart_head.hidden)?;
        npz.linear("heart_head.3", &self.head.heart_head.out)?;
        npz.linear("diab_head.0", &self.head.glucose_head.hidden)?;
        npz.linear("diab_head.3", &self.head.glucose_head.out)?;
        npz.finish()
    }

    pub fn dims(&self) -> &ModelDims {
        &self.dims
    }

    /// Forward pass over a tabular batch (N, features) and a sequence batch (B, T).
    ///
    /// Both inputs are mandatory. When `N != B` the cardiac head sees the
    /// batch-averaged sequence context.
    pub fn forward(
        &self,
        tabular: &ArrayView2<f32>,
        sequences: &ArrayView2<f32>,
    ) -> MetaFedResult<ModelOutput> {
        self.check_inputs(tabular, sequences)?;

        let context = self.sequence.encode(sequences); // (B, d_model)
        let glucose_logits = self.head.glucose_logits(&context.view());

        let tab_emb = self.tabular.encode(tabular); // (N, heart_hidden[1])
        let heart_logits = self.head.heart_logits(&tab_emb.view(), &context.view())?;

        Ok(ModelOutput {
            heart_logits,
            glucose_logits,
        })
    }

    fn check_inputs(&self, tabular: &ArrayView2<f32>, sequences: &ArrayView2<f32>) -> MetaFedResult<()> {
        if tabular.ncols() != self.dims.feature_dim {
            return Err(MetaFedError::Inference(format!(
                "Tabular input has {} features, model expects {}",
                tabular.ncols(),
                self.dims.feature_dim
            )));
        }
        if tabular.nrows() == 0 || sequences.nrows() == 0 {
            return Err(MetaFedError::Inference(format!(
                "Empty batch: tabular rows={}, sequence rows={}",
                tabular.nrows(),
                sequences.nrows()
            )));
        }
        if sequences.ncols() == 0 {
            return Err(MetaFedError::Inference(
                "Sequence input has zero timesteps".to_string(),
            ));
        }
        if tabular.iter().chain(sequences.iter()).any(|v| !v.is_finite()) {
            return Err(MetaFedError::Inference(
                "Model input contains non-finite values".to_string(),
            ));
        }
        Ok(())
    }
}
