// ─────────────────────────────────────────────────────────────────────
// MetaFed Inference — Parameter Store
// License: GNU AGPL v3
// ─────────────────────────────────────────────────────────────────────
//! NumPy `.npz` access for network parameters.
//!
//! Keys follow the PyTorch state-dict naming of the trained network, e.g.
//! `gru.weight_ih_l0_reverse` or `heart_mlp.1.running_var`. Every tensor is
//! required and shape-checked on read.

use metafed_types::error::{MetaFedError, MetaFedResult};
use ndarray::{Array1, Array2, Dimension};
use ndarray_npy::{NpzReader, NpzWriter};
use std::fs::File;

use crate::gru::GruDirection;
use crate::layers::{BatchNorm, LayerNorm, Linear};

pub struct ParamReader {
    npz: NpzReader<File>,
    path: String,
}

impl ParamReader {
    pub fn open(path: &str) -> MetaFedResult<Self> {
        let file = File::open(path)?;
        let npz = NpzReader::new(file).map_err(|e| {
            MetaFedError::ConfigError(format!("Failed to open npz '{path}': {e}"))
        })?;
        Ok(ParamReader {
            npz,
            path: path.to_string(),
        })
    }

    pub fn array1(&mut self, key: &str, len: usize) -> MetaFedResult<Array1<f32>> {
        let arr: Array1<f32> = self
            .npz
            .by_name::<ndarray::OwnedRepr<f32>, ndarray::Ix1>(&format!("{key}.npy"))
            .or_else(|_| self.npz.by_name::<ndarray::OwnedRepr<f32>, ndarray::Ix1>(key))
            .map_err(|e| self.missing(key, e))?;
        if arr.len() != len {
            return Err(MetaFedError::ConfigError(format!(
                "Invalid {key} length {}, expected {len}",
                arr.len()
            )));
        }
        Ok(arr)
    }

    pub fn array2(&mut self, key: &str, shape: (usize, usize)) -> MetaFedResult<Array2<f32>> {
        let arr: Array2<f32> = self
            .npz
            .by_name::<ndarray::OwnedRepr<f32>, ndarray::Ix2>(&format!("{key}.npy"))
            .or_else(|_| self.npz.by_name::<ndarray::OwnedRepr<f32>, ndarray::Ix2>(key))
            .map_err(|e| self.missing(key, e))?;
        if arr.dim() != shape {
            return Err(MetaFedError::ConfigError(format!(
                "Invalid {key} shape {:?}, expected {:?}",
                arr.dim(),
                shape
            )));
        }
        Ok(arr)
    }

    pub fn linear(&mut self, prefix: &str, in_dim: usize, out_dim: usize) -> MetaFedResult<Linear> {
        Ok(Linear {
            weight: self.array2(&format!("{prefix}.weight"), (out_dim, in_dim))?,
            bias: self.array1(&format!("{prefix}.bias"), out_dim)?,
        })
    }

    pub fn layer_norm(&mut self, prefix: &str, dim: usize) -> MetaFedResult<LayerNorm> {
        Ok(LayerNorm {
            gamma: self.array1(&format!("{prefix}.weight"), dim)?,
            beta: self.array1(&format!("{prefix}.bias"), dim)?,
        })
    }

    pub fn batch_norm(&mut self, prefix: &str, dim: usize) -> MetaFedResult<BatchNorm> {
        let norm = BatchNorm {
            gamma: self.array1(&format!("{prefix}.weight"), dim)?,
            beta: self.array1(&format!("{prefix}.bias"), dim)?,
            running_mean: self.array1(&format!("{prefix}.running_mean"), dim)?,
            running_var: self.array1(&format!("{prefix}.running_var"), dim)?,
        };
        if norm.running_var.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(MetaFedError::ConfigError(format!(
                "{prefix}.running_var must be finite and non-negative"
            )));
        }
        Ok(norm)
    }

    /// `suffix` is `""` for the forward direction, `"_reverse"` for backward.
    pub fn gru_direction(
        &mut self,
        prefix: &str,
        suffix: &str,
        input_dim: usize,
        hidden: usize,
    ) -> MetaFedResult<GruDirection> {
        Ok(GruDirection {
            w_ih: self.array2(&format!("{prefix}.weight_ih_l0{suffix}"), (3 * hidden, input_dim))?,
            w_hh: self.array2(&format!("{prefix}.weight_hh_l0{suffix}"), (3 * hidden, hidden))?,
            b_ih: self.array1(&format!("{prefix}.bias_ih_l0{suffix}"), 3 * hidden)?,
            b_hh: self.array1(&format!("{prefix}.bias_hh_l0{suffix}"), 3 * hidden)?,
        })
    }

    fn missing(&self, key: &str, e: impl std::fmt::Display) -> MetaFedError {
        MetaFedError::ConfigError(format!("Failed to read {key} from '{}': {e}", self.path))
    }
}

pub struct ParamWriter {
    npz: NpzWriter<File>,
}

impl ParamWriter {
    pub fn create(path: &str) -> MetaFedResult<Self> {
        let file = File::create(path)?;
        Ok(ParamWriter {
            npz: NpzWriter::new(file),
        })
    }

    pub fn array<D: Dimension>(
        &mut self,
        key: &str,
        arr: &ndarray::Array<f32, D>,
    ) -> MetaFedResult<()> {
        self.npz
            .add_array(key, arr)
            .map_err(|e| MetaFedError::ConfigError(format!("Failed to write {key}: {e}")))
    }

    pub fn linear(&mut self, prefix: &str, lin: &Linear) -> MetaFedResult<()> {
        self.array(&format!("{prefix}.weight"), &lin.weight)?;
        self.array(&format!("{prefix}.bias"), &lin.bias)
    }

    pub fn layer_norm(&mut self, prefix: &str, ln: &LayerNorm) -> MetaFedResult<()> {
        self.array(&format!("{prefix}.weight"), &ln.gamma)?;
        self.array(&format!("{prefix}.bias"), &ln.beta)
    }

    pub fn batch_norm(&mut self, prefix: &str, bn: &BatchNorm) -> MetaFedResult<()> {
        self.array(&format!("{prefix}.weight"), &bn.gamma)?;
        self.array(&format!("{prefix}.bias"), &bn.beta)?;
        self.array(&format!("{prefix}.running_mean"), &bn.running_mean)?;
        self.array(&format!("{prefix}.running_var"), &bn.running_var)
    }

    pub fn gru_direction(&mut self, prefix: &str, suffix: &str, dir: &GruDirection) -> MetaFedResult<()> {
        self.array(&format!("{prefix}.weight_ih_l0{suffix}"), &dir.w_ih)?;
        self.array(&format!("{prefix}.weight_hh_l0{suffix}"), &dir.w_hh)?;
        self.array(&format!("{prefix}.bias_ih_l0{suffix}"), &dir.b_ih)?;
        self.array(&format!("{prefix}.bias_hh_l0{suffix}"), &dir.b_hh)
    }

    pub fn finish(self) -> MetaFedResult<()> {
        self.npz
            .finish()
            .map(|_| ())
            .map_err(|e| MetaFedError::ConfigError(format!("Failed to finalize npz: {e}")))
    }
}
