use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use uuid::Uuid;

use super::forecast::HourlyPriceForecast;

/// Dispatch action for one hour slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Action {
    Charge,
    Discharge,
    Hold,
}

/// One hour of the dispatch plan.
///
/// `power_kw` is positive while charging, negative while discharging,
/// exactly zero on hold. With 1 h slots the slot energy in kWh equals
/// `power_kw`, so `revenue_clp = power * price` accumulates directly in
/// CLP (see the crate-level unit convention).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchSlot {
    pub hour: u8,
    pub action: Action,
    pub power_kw: f64,
    pub forecast: HourlyPriceForecast,
    /// Estimated SOC at the start of this hour (%).
    pub soc_before_pct: f64,
    /// Estimated SOC at the end of this hour (%).
    pub soc_after_pct: f64,
    /// Positive = discharge revenue, negative = charge cost, zero on hold.
    pub revenue_clp: f64,
}

impl DispatchSlot {
    /// Net energy exchanged in this slot (positive = charged into storage).
    pub fn net_kwh(&self) -> f64 {
        self.power_kw
    }

    pub fn hold(forecast: HourlyPriceForecast, soc_pct: f64) -> Self {
        Self {
            hour: forecast.hour,
            action: Action::Hold,
            power_kw: 0.0,
            forecast,
            soc_before_pct: soc_pct,
            soc_after_pct: soc_pct,
            revenue_clp: 0.0,
        }
    }
}

/// Complete 24-hour dispatch plan with projected economics.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchPlan {
    pub id: Uuid,
    pub node: String,
    pub created_at: DateTime<Utc>,
    /// Slots ordered by hour; empty when no forecast was available.
    pub slots: Vec<DispatchSlot>,
    /// Total projected revenue from discharge operations (CLP).
    pub projected_revenue_clp: f64,
    /// Total projected cost from charge operations (CLP).
    pub projected_cost_clp: f64,
    /// `projected_revenue_clp - projected_cost_clp`.
    pub projected_net_clp: f64,
    /// Realized charging hours (may be fewer than the candidate set).
    pub n_charge_hours: usize,
    /// Realized discharging hours.
    pub n_discharge_hours: usize,
    pub capacity_kwh: f64,
    pub efficiency: f64,
}

impl DispatchPlan {
    /// Plan with no slots and zero economics (empty forecast input).
    pub fn empty(node: impl Into<String>, capacity_kwh: f64, efficiency: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            node: node.into(),
            created_at: Utc::now(),
            slots: Vec::new(),
            projected_revenue_clp: 0.0,
            projected_cost_clp: 0.0,
            projected_net_clp: 0.0,
            n_charge_hours: 0,
            n_discharge_hours: 0,
            capacity_kwh,
            efficiency,
        }
    }

    /// Human-readable report block, used by the report binary.
    pub fn summary(&self) -> String {
        format!(
            "DispatchPlan - {}\n  Charge:    {}h | Discharge: {}h\n  Revenue:   CLP {:.0}\n  Cost:      CLP {:.0}\n  Net:       CLP {:.0}",
            self.node,
            self.n_charge_hours,
            self.n_discharge_hours,
            self.projected_revenue_clp,
            self.projected_cost_clp,
            self.projected_net_clp,
        )
    }
}
