// ─────────────────────────────────────────────────────────────────────
// MetaFed Inference — Server
// License: GNU AGPL v3
// ─────────────────────────────────────────────────────────────────────
//! MetaFed prediction server.
//!
//! Serves cardiac risk (`/predict_heart`) and glucose trend
//! (`/predict_diabetes`) predictions from one shared multi-task model.
//! Parameters, statistics and the compute device are fixed at startup.

mod config;
mod routes;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use metafed_ml::device::select_device;
use metafed_ml::inference::InferenceEngine;
use metafed_ml::model::HybridModel;
use metafed_ml::normalizer::{FeatureNormalizer, StandardizationStats};
use metafed_types::config::ServerConfig;
use metafed_types::constants::N_FEATURES;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::routes::{
    health_handler, index_handler, predict_diabetes_handler, predict_heart_handler, AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = config::load_server_config()?;

    info!(
        listen_addr = %config.listen_addr,
        weights = ?config.weights_path,
        stats = ?config.stats_path,
        "Starting MetaFed inference server"
    );

    let state = build_app_state(&config)?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(listen_addr = %config.listen_addr, "Server listening");
    axum::serve(listener, app).await?;

    Ok(())
}

/// Load parameters and statistics once and wrap them for sharing.
fn build_app_state(config: &ServerConfig) -> anyhow::Result<Arc<AppState>> {
    let device = select_device(config.device);

    let model = match &config.weights_path {
        Some(path) => HybridModel::from_npz(path, config.dims)?,
        None => {
            warn!(seed = config.seed, "No weights_path configured, serving generated weights");
            HybridModel::random(config.dims, config.seed)?
        }
    };

    let stats = match &config.stats_path {
        Some(path) => StandardizationStats::from_file(path)?,
        None => {
            warn!("No stats_path configured, using identity standardization");
            StandardizationStats::identity(N_FEATURES)
        }
    };
    let normalizer = FeatureNormalizer::cardiac(stats);
    normalizer.stats().check_feature_order(normalizer.fields())?;
    info!(columns = ?normalizer.fields(), "Scaler expects columns");

    let engine = InferenceEngine::new(Arc::new(model), Arc::new(normalizer))?;
    Ok(Arc::new(AppState { engine, device }))
}

/// Build the axum [`Router`] with all routes.
fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/predict_heart", post(predict_heart_handler))
        .route("/predict_diabetes", post(predict_diabetes_handler))
        .with_state(state)
}
