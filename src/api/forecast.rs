use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    api::{error::ApiError, response::ApiResponse},
    controller::AppState,
    domain::{DispatchHint, ForecastMethod, HourlyPriceForecast},
};

#[derive(Debug, Deserialize, Validate)]
pub struct ForecastQuery {
    /// Current hour-of-day (0-23).
    #[validate(range(min = 0, max = 23))]
    pub hour: u8,
    /// Latest observed price (CLP/kWh), recorded before forecasting.
    #[validate(range(min = 0.0))]
    pub price: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct ForecastResponse {
    pub node: String,
    pub computed_at: DateTime<Utc>,
    pub model_loaded: bool,
    pub forecasts: Vec<ForecastEntry>,
}

#[derive(Debug, Serialize)]
pub struct ForecastEntry {
    pub hour: u8,
    pub price_clp_kwh: f64,
    pub price_p10: f64,
    pub price_p90: f64,
    pub confidence: f64,
    pub method: ForecastMethod,
    pub is_peak: bool,
    pub is_solar_trough: bool,
    pub dispatch_hint: DispatchHint,
}

impl From<&HourlyPriceForecast> for ForecastEntry {
    fn from(f: &HourlyPriceForecast) -> Self {
        Self {
            hour: f.hour,
            price_clp_kwh: f.price_clp_kwh,
            price_p10: f.price_p10,
            price_p90: f.price_p90,
            confidence: f.confidence,
            method: f.method,
            is_peak: f.is_peak(),
            is_solar_trough: f.is_solar_trough(),
            dispatch_hint: f.dispatch_hint(),
        }
    }
}

/// GET /api/v1/forecast?hour=H[&price=P] - 24h price forecast
pub async fn get_forecast(
    State(state): State<AppState>,
    Query(query): Query<ForecastQuery>,
) -> Result<Json<ApiResponse<ForecastResponse>>, ApiError> {
    query.validate()?;

    let mut predictor = state.predictor.lock();
    let forecasts = predictor.predict_next_24h(query.hour, query.price);
    let response = ForecastResponse {
        node: predictor.node().to_string(),
        computed_at: Utc::now(),
        model_loaded: predictor.is_model_loaded(),
        forecasts: forecasts.iter().map(ForecastEntry::from).collect(),
    };

    Ok(Json(ApiResponse::success(response)))
}
