use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Hourly marginal-cost profile for the SEN grid (CLP/kWh), empirical
/// 2023-2024 aggregate. Serves as the asymptotic baseline when no history
/// or model is available.
pub const HOURLY_MEAN_CMG: [f64; 24] = [
    38.2, 36.1, 34.8, 34.1, 33.9, 35.2, // 00-05  off-peak
    42.1, 58.3, 71.2, 61.4, 48.3, 38.9, // 06-11  morning ramp
    29.4, 24.1, 22.8, 21.3, 22.1, 28.7, // 12-17  solar trough
    44.2, 62.3, 78.4, 71.2, 58.3, 46.1, // 18-23  evening peak
];

/// Evening hours where grid prices historically peak.
pub const PEAK_HOURS: [u8; 5] = [18, 19, 20, 21, 22];

/// Midday hours where solar generation typically depresses prices.
pub const SOLAR_TROUGH_HOURS: [u8; 6] = [11, 12, 13, 14, 15, 16];

/// A peak hour only hints discharge above this price (CLP/kWh).
const DISCHARGE_PRICE_FLOOR: f64 = 50.0;

/// A trough hour only hints charge below this price (CLP/kWh).
const CHARGE_PRICE_CEILING: f64 = 30.0;

pub fn is_peak_hour(hour: u8) -> bool {
    PEAK_HOURS.contains(&hour)
}

pub fn is_solar_trough_hour(hour: u8) -> bool {
    SOLAR_TROUGH_HOURS.contains(&hour)
}

/// Which estimation tier produced a forecast value.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ForecastMethod {
    /// Point + quantile model inference.
    Model,
    /// Per-hour exponential smoothing fallback.
    Smoothing,
    /// Flat historic hourly-mean table.
    #[default]
    HistoricMean,
}

/// Heuristic dispatch prior derived from a single forecast hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DispatchHint {
    Charge,
    Discharge,
    Hold,
}

/// Single-hour price forecast with p10/p90 uncertainty band.
///
/// Constructed by the predictor, consumed read-only by the scheduler.
/// Invariant: `price_p10 <= price_clp_kwh <= price_p90`, enforced at
/// construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyPriceForecast {
    /// Hour-of-day (0-23).
    pub hour: u8,
    /// Point estimate (CLP/kWh).
    pub price_clp_kwh: f64,
    /// p10 lower band (CLP/kWh).
    pub price_p10: f64,
    /// p90 upper band (CLP/kWh).
    pub price_p90: f64,
    /// Confidence level [0, 1]; higher means a tighter band.
    pub confidence: f64,
    pub method: ForecastMethod,
}

impl HourlyPriceForecast {
    /// Forecast with the default +/-15% band around the point estimate.
    pub fn new(hour: u8, price_clp_kwh: f64, confidence: f64, method: ForecastMethod) -> Self {
        let price = price_clp_kwh.max(0.0);
        Self {
            hour,
            price_clp_kwh: price,
            price_p10: price * 0.85,
            price_p90: price * 1.15,
            confidence: confidence.clamp(0.0, 1.0),
            method,
        }
    }

    /// Forecast with explicit quantile bounds. The band is widened if
    /// needed so it always contains the point estimate.
    pub fn banded(
        hour: u8,
        price_clp_kwh: f64,
        price_p10: f64,
        price_p90: f64,
        confidence: f64,
        method: ForecastMethod,
    ) -> Self {
        let price = price_clp_kwh.max(0.0);
        Self {
            hour,
            price_clp_kwh: price,
            price_p10: price_p10.max(0.0).min(price),
            price_p90: price_p90.max(price),
            confidence: confidence.clamp(0.0, 1.0),
            method,
        }
    }

    pub fn is_peak(&self) -> bool {
        is_peak_hour(self.hour)
    }

    pub fn is_solar_trough(&self) -> bool {
        is_solar_trough_hour(self.hour)
    }

    /// p90 - p10 band width (uncertainty, CLP/kWh).
    pub fn band_width(&self) -> f64 {
        self.price_p90 - self.price_p10
    }

    /// True when the band is narrower than 20% of the point estimate.
    pub fn is_high_confidence(&self) -> bool {
        if self.price_clp_kwh <= 0.0 {
            return false;
        }
        self.band_width() / self.price_clp_kwh < 0.20
    }

    /// Quick dispatch prior: discharge on expensive peak hours, charge on
    /// cheap trough hours, hold otherwise.
    pub fn dispatch_hint(&self) -> DispatchHint {
        if self.is_peak() && self.price_clp_kwh > DISCHARGE_PRICE_FLOOR {
            return DispatchHint::Discharge;
        }
        if self.is_solar_trough() && self.price_clp_kwh < CHARGE_PRICE_CEILING {
            return DispatchHint::Charge;
        }
        DispatchHint::Hold
    }
}
