// ─────────────────────────────────────────────────────────────────────
// MetaFed Inference — Server Config
// License: GNU AGPL v3
// ─────────────────────────────────────────────────────────────────────
//! Startup configuration resolution.
//!
//! Checks (in order):
//! 1. First CLI argument as config path
//! 2. `METAFED_CONFIG` environment variable
//! 3. Default configuration

use metafed_types::config::ServerConfig;
use std::path::PathBuf;
use tracing::info;

pub const CONFIG_ENV: &str = "METAFED_CONFIG";

pub fn resolve_config_path(arg: Option<String>, env: Option<String>) -> Option<PathBuf> {
    arg.or(env).map(PathBuf::from)
}

pub fn load_server_config() -> anyhow::Result<ServerConfig> {
    let path = resolve_config_path(std::env::args().nth(1), std::env::var(CONFIG_ENV).ok());
    match path {
        Some(path) => {
            info!(path = %path.display(), "Loading configuration from file");
            load_config(&path)
        }
        None => {
            info!("No config file specified, using defaults");
            Ok(ServerConfig::default())
        }
    }
}

pub fn load_config(path: &std::path::Path) -> anyhow::Result<ServerConfig> {
    let path_str = path.to_string_lossy();
    ServerConfig::from_file(&path_str)
        .map_err(|e| anyhow::anyhow!("Failed to load config {}: {}", path.display(), e))
}
