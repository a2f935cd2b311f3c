//! Feature engineering for the price model.
//!
//! The feature order is fixed and must stay in sync with the offline
//! training pipeline that produces the model artifacts.

use chrono::{Datelike, Local};

use crate::domain::{is_peak_hour, is_solar_trough_hour};

use super::history::PriceHistory;

pub const N_FEATURES: usize = 11;

pub const FEATURE_NAMES: [&str; N_FEATURES] = [
    "soc_pct",
    "hour_of_day",
    "day_of_week",
    "recent_mean_cmg",
    "recent_std_cmg",
    "peak_flag",
    "solar_hour_flag",
    "lag_1h",
    "lag_24h",
    "lag_168h",
    "is_weekend",
];

/// State-of-charge placeholder fed to the price model; the artifacts are
/// trained against a neutral 50% figure.
const SOC_PLACEHOLDER_PCT: f64 = 50.0;

/// Default std fed to the model when history is too short to estimate one.
const DEFAULT_RECENT_STD: f64 = 5.0;

/// Per-forecast feature context: the history-derived values shared by all
/// 24 target hours of one forecast call.
#[derive(Debug, Clone)]
pub struct FeatureContext {
    pub recent_mean: f64,
    pub recent_std: f64,
    pub lag_1h: f64,
    pub lag_24h: f64,
    pub lag_168h: f64,
    /// 0 = Monday .. 6 = Sunday.
    pub day_of_week: u32,
}

impl FeatureContext {
    /// Derive the context from the rolling history. `fallback_price` fills
    /// lags when the history is shorter than the lag horizon.
    pub fn from_history(history: &PriceHistory, fallback_price: f64) -> Self {
        let (recent_mean, recent_std) = history
            .recent_stats(24)
            .unwrap_or((fallback_price, DEFAULT_RECENT_STD));
        Self {
            recent_mean,
            recent_std,
            lag_1h: history.lag(1).unwrap_or(fallback_price),
            lag_24h: history.lag(24).unwrap_or(recent_mean),
            lag_168h: history.lag(168).unwrap_or(recent_mean),
            day_of_week: Local::now().weekday().num_days_from_monday(),
        }
    }

    /// Build the fixed-order input vector for one target hour.
    pub fn vector_for_hour(&self, hour: u8) -> Vec<f64> {
        let is_weekend = if self.day_of_week >= 5 { 1.0 } else { 0.0 };
        vec![
            SOC_PLACEHOLDER_PCT,
            f64::from(hour),
            f64::from(self.day_of_week),
            self.recent_mean,
            self.recent_std,
            if is_peak_hour(hour) { 1.0 } else { 0.0 },
            if is_solar_trough_hour(hour) { 1.0 } else { 0.0 },
            self.lag_1h,
            self.lag_24h,
            self.lag_168h,
            is_weekend,
        ]
    }
}
