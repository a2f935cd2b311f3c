use axum::{extract::State, Json};
use serde::Serialize;

use crate::controller::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    timestamp: chrono::DateTime<chrono::Utc>,
    node: String,
    predictor: PredictorHealth,
}

#[derive(Debug, Serialize)]
pub struct PredictorHealth {
    /// "model" when artifacts loaded, "smoothing_fallback" otherwise.
    mode: String,
    quantile_models: bool,
    history_len: usize,
    cache_age_s: u64,
}

/// GET /api/v1/health - Liveness and predictor mode
///
/// Smoothing fallback is a degraded-but-valid state, so the service
/// reports healthy either way; the mode field tells operators which tier
/// is active.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let predictor = state.predictor.lock();
    let response = HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now(),
        node: predictor.node().to_string(),
        predictor: PredictorHealth {
            mode: if predictor.is_model_loaded() {
                "model".to_string()
            } else {
                "smoothing_fallback".to_string()
            },
            quantile_models: predictor.has_quantile_models(),
            history_len: predictor.history_len(),
            cache_age_s: predictor.cache_age().as_secs(),
        },
    };
    Json(response)
}
