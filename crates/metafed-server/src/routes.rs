// ─────────────────────────────────────────────────────────────────────
// MetaFed Inference — Routes
// License: GNU AGPL v3
// ─────────────────────────────────────────────────────────────────────
//! HTTP handlers. Every core failure is turned into a structured JSON body;
//! nothing on the request path panics.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use metafed_ml::device::ComputeDevice;
use metafed_ml::inference::{parse_cgm_values, InferenceEngine};
use metafed_types::constants::CARDIAC_FEATURES;
use metafed_types::error::{MetaFedError, MetaFedResult};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{error, info, warn};

/// Shared application state.
pub struct AppState {
    pub engine: InferenceEngine,
    pub device: ComputeDevice,
}

#[derive(Debug, Serialize)]
pub struct HeartResponse {
    pub heart_risk_class: usize,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct GlucoseResponse {
    pub glucose_trend_class: usize,
}

/// Core error rendered as an HTTP response.
pub struct ApiError(pub MetaFedError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self.0 {
            MetaFedError::Schema { missing } => (
                StatusCode::BAD_REQUEST,
                json!({
                    "error": "Missing required features.",
                    "missing_fields": missing,
                    "required_fields": CARDIAC_FEATURES,
                }),
            ),
            MetaFedError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Invalid request payload.", "details": msg }),
            ),
            MetaFedError::Transform(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "Scaler transform failed", "details": msg }),
            ),
            MetaFedError::Inference(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "Model inference failed", "details": msg }),
            ),
            other => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "Internal error", "details": other.to_string() }),
            ),
        };
        if self.0.is_client_error() {
            warn!(error = %self.0, "Rejected request");
        } else {
            error!(error = %self.0, "Request failed");
        }
        (status, Json(body)).into_response()
    }
}

fn invalid_json() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": "Invalid or empty JSON. Send a proper JSON body." })),
    )
        .into_response()
}

fn parse_body(body: &Bytes) -> Option<Value> {
    serde_json::from_slice(body).ok()
}

/// Run a forward pass on the blocking pool so the reactor stays responsive.
async fn run_blocking<T, F>(f: F) -> MetaFedResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> MetaFedResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| MetaFedError::Inference(format!("Inference task failed: {e}")))?
}

pub async fn index_handler() -> &'static str {
    "MetaFed inference is running. Try /health or POST /predict_heart"
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "device": state.device.to_string(),
        "numeric_fallbacks": state.engine.normalizer().fallback_count(),
    }))
}

pub async fn predict_heart_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let record: Map<String, Value> = match parse_body(&body) {
        Some(Value::Object(map)) => map,
        _ => return invalid_json(),
    };
    let engine = state.engine.clone();
    match run_blocking(move || engine.predict_heart(&record)).await {
        Ok(pred) => {
            info!(subject = ?pred.subject, class = pred.heart_risk_class, "predict_heart");
            Json(HeartResponse {
                heart_risk_class: pred.heart_risk_class,
                status: "success",
            })
            .into_response()
        }
        Err(e) => ApiError(e).into_response(),
    }
}

pub async fn predict_diabetes_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let payload = match parse_body(&body) {
        Some(v @ Value::Object(_)) => v,
        _ => return invalid_json(),
    };
    let cgm_values = match parse_cgm_values(&payload) {
        Ok(values) => values,
        Err(e) => return ApiError(e).into_response(),
    };
    let engine = state.engine.clone();
    match run_blocking(move || engine.predict_glucose(&cgm_values)).await {
        Ok(pred) => {
            info!(class = pred.glucose_trend_class, "predict_diabetes");
            Json(GlucoseResponse {
                glucose_trend_class: pred.glucose_trend_class,
            })
            .into_response()
        }
        Err(e) => ApiError(e).into_response(),
    }
}
