// ─────────────────────────────────────────────────────────────────────
// MetaFed Inference — Config
// License: GNU AGPL v3
// ─────────────────────────────────────────────────────────────────────
use serde::{Deserialize, Serialize};

use crate::constants::{N_FEATURES, N_GLUCOSE_CLASSES, N_HEART_CLASSES};
use crate::error::{MetaFedError, MetaFedResult};

/// Layer widths of the hybrid GRU/Transformer multi-task network.
/// Defaults match the production checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelDims {
    pub feature_dim: usize,
    pub gru_hidden: usize,
    pub d_model: usize,
    pub n_heads: usize,
    pub n_layers: usize,
    pub dim_ff: usize,
    pub heart_hidden: [usize; 2],
    pub heart_head_hidden: usize,
    pub diab_head_hidden: usize,
    pub n_heart_classes: usize,
    pub n_glucose_classes: usize,
}

impl Default for ModelDims {
    fn default() -> Self {
        ModelDims {
            feature_dim: N_FEATURES,
            gru_hidden: 128,
            d_model: 128,
            n_heads: 4,
            n_layers: 2,
            dim_ff: 256,
            heart_hidden: [128, 64],
            heart_head_hidden: 64,
            diab_head_hidden: 64,
            n_heart_classes: N_HEART_CLASSES,
            n_glucose_classes: N_GLUCOSE_CLASSES,
        }
    }
}

impl ModelDims {
    /// Width of `[tabular_embedding, sequence_context]`.
    pub fn fused_dim(&self) -> usize {
        self.heart_hidden[1] + self.d_model
    }

    pub fn validate(&self) -> MetaFedResult<()> {
        let widths = [
            ("feature_dim", self.feature_dim),
            ("gru_hidden", self.gru_hidden),
            ("d_model", self.d_model),
            ("n_heads", self.n_heads),
            ("dim_ff", self.dim_ff),
            ("heart_hidden[0]", self.heart_hidden[0]),
            ("heart_hidden[1]", self.heart_hidden[1]),
            ("heart_head_hidden", self.heart_head_hidden),
            ("diab_head_hidden", self.diab_head_hidden),
            ("n_heart_classes", self.n_heart_classes),
            ("n_glucose_classes", self.n_glucose_classes),
        ];
        if let Some((name, _)) = widths.iter().find(|(_, v)| *v == 0) {
            return Err(MetaFedError::ConfigError(format!(
                "Model dimension {name} must be positive"
            )));
        }
        if self.d_model % self.n_heads != 0 {
            return Err(MetaFedError::ConfigError(format!(
                "d_model {} is not divisible by n_heads {}",
                self.d_model, self.n_heads
            )));
        }
        if self.fused_dim() / 2 == 0 {
            return Err(MetaFedError::ConfigError(
                "Fused projection width collapses to zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Requested compute device. Only the CPU backend is compiled in;
/// `Auto` and `Accelerator` both resolve to it at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    #[default]
    Auto,
    Cpu,
    Accelerator,
}

/// Server configuration, loaded once at process start.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// `.npz` archive of network parameters. Generated weights are used when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weights_path: Option<String>,
    /// JSON standardization statistics. Identity scaling is used when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats_path: Option<String>,
    pub device: DeviceKind,
    /// Seed for generated weights.
    pub seed: u64,
    pub dims: ModelDims,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            listen_addr: "127.0.0.1:5000".to_string(),
            weights_path: None,
            stats_path: None,
            device: DeviceKind::Auto,
            seed: 42,
            dims: ModelDims::default(),
        }
    }
}

impl ServerConfig {
    /// Load from a JSON file; absent keys take their defaults.
    pub fn from_file(path: &str) -> MetaFedResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.dims.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "metafed_config_{}_{}.json",
            name,
            std::process::id()
        ));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_default_dims_match_checkpoint() {
        let dims = ModelDims::default();
        assert_eq!(dims.feature_dim, 13);
        assert_eq!(dims.fused_dim(), 192);
        assert!(dims.validate().is_ok());
    }

    #[test]
    fn test_rejects_indivisible_heads() {
        let dims = ModelDims {
            d_model: 30,
            n_heads: 4,
            ..ModelDims::default()
        };
        assert!(matches!(dims.validate(), Err(MetaFedError::ConfigError(_))));
    }

    #[test]
    fn test_load_partial_config() {
        let path = write_temp(
            "partial",
            r#"{"listen_addr": "0.0.0.0:8080", "device": "cpu", "dims": {"gru_hidden": 16}}"#,
        );
        let cfg = ServerConfig::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(cfg.listen_addr, "0.0.0.0:8080");
        assert_eq!(cfg.device, DeviceKind::Cpu);
        assert_eq!(cfg.dims.gru_hidden, 16);
        assert_eq!(cfg.dims.d_model, 128);
        assert!(cfg.weights_path.is_none());
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_load_missing_file() {
        let result = ServerConfig::from_file("/nonexistent/metafed.json");
        assert!(matches!(result, Err(MetaFedError::Io(_))));
    }

    #[test]
    fn test_roundtrip_serialization() {
        let cfg = ServerConfig {
            weights_path: Some("models/personalized_A.npz".to_string()),
            ..ServerConfig::default()
        };
        let json = serde_json::to_string_pretty(&cfg).unwrap();
        let cfg2: ServerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg.weights_path, cfg2.weights_path);
        assert_eq!(cfg.dims, cfg2.dims);
        assert!(!json.contains("stats_path"));
    }
}
