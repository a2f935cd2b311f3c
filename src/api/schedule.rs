use std::time::Instant;

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
    domain::{Action, DispatchPlan, DispatchSlot},
};

#[derive(Debug, Deserialize, Validate)]
pub struct ScheduleQuery {
    /// Current hour-of-day (0-23).
    #[validate(range(min = 0, max = 23))]
    pub hour: u8,
    /// Current state of charge (0-100%).
    #[validate(range(min = 0.0, max = 100.0))]
    pub soc: f64,
    /// Latest observed price (CLP/kWh), recorded before forecasting.
    #[validate(range(min = 0.0))]
    pub price: Option<f64>,
}

/// Dispatch plan as served to the dashboard.
#[derive(Debug, Serialize)]
pub struct ScheduleResponse {
    pub node: String,
    pub computed_at: DateTime<Utc>,
    pub capacity_kwh: f64,
    pub efficiency: f64,
    pub projected_revenue_clp: f64,
    pub projected_cost_clp: f64,
    pub projected_net_clp: f64,
    pub n_charge_hours: usize,
    pub n_discharge_hours: usize,
    pub hourly_schedule: Vec<ScheduleSlot>,
}

#[derive(Debug, Serialize)]
pub struct ScheduleSlot {
    pub hour: u8,
    pub action: Action,
    pub power_kw: f64,
    pub price_clp_kwh: f64,
    pub price_p10: f64,
    pub price_p90: f64,
    pub confidence: f64,
    pub soc_before_pct: f64,
    pub soc_after_pct: f64,
    pub revenue_clp: f64,
    pub is_peak: bool,
}

impl From<&DispatchSlot> for ScheduleSlot {
    fn from(slot: &DispatchSlot) -> Self {
        Self {
            hour: slot.hour,
            action: slot.action,
            power_kw: slot.power_kw,
            price_clp_kwh: slot.forecast.price_clp_kwh,
            price_p10: slot.forecast.price_p10,
            price_p90: slot.forecast.price_p90,
            confidence: slot.forecast.confidence,
            soc_before_pct: slot.soc_before_pct,
            soc_after_pct: slot.soc_after_pct,
            revenue_clp: slot.revenue_clp,
            is_peak: slot.forecast.is_peak(),
        }
    }
}

impl From<&DispatchPlan> for ScheduleResponse {
    fn from(plan: &DispatchPlan) -> Self {
        Self {
            node: plan.node.clone(),
            computed_at: plan.created_at,
            capacity_kwh: plan.capacity_kwh,
            efficiency: plan.efficiency,
            projected_revenue_clp: plan.projected_revenue_clp,
            projected_cost_clp: plan.projected_cost_clp,
            projected_net_clp: plan.projected_net_clp,
            n_charge_hours: plan.n_charge_hours,
            n_discharge_hours: plan.n_discharge_hours,
            hourly_schedule: plan.slots.iter().map(ScheduleSlot::from).collect(),
        }
    }
}

/// GET /api/v1/schedule?hour=H&soc=S[&price=P] - 24h dispatch plan
pub async fn get_schedule(
    State(state): State<AppState>,
    Query(query): Query<ScheduleQuery>,
) -> Result<Json<ApiResponse<ScheduleResponse>>, ApiError> {
    query.validate()?;
    let started = Instant::now();

    // One lock for the whole update-and-predict sequence
    let forecasts = {
        let mut predictor = state.predictor.lock();
        predictor.predict_next_24h(query.hour, query.price)
    };
    let plan = state.engine.compute(&forecasts, query.soc);

    let response = ScheduleResponse::from(&plan);
    Ok(Json(
        ApiResponse::success(response).with_duration(started.elapsed().as_millis() as u64),
    ))
}
