//! Marginal-cost price prediction for the next 24 hours.
//!
//! Degradation chain: point+quantile model inference -> per-hour
//! exponential smoothing -> flat historic hourly mean. Model absence is a
//! degraded-but-valid state, never an error; the dispatch path upstream
//! must always receive 24 usable forecasts.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::domain::{ForecastMethod, HourlyPriceForecast, HOURLY_MEAN_CMG};
use crate::ml::{self, InferenceSession};
use crate::observer::{EngineObserver, NoopObserver};

use super::features::FeatureContext;
use super::history::PriceHistory;

/// Base confidence for model-produced estimates without quantile bands.
const MODEL_BASE_CONFIDENCE: f64 = 0.85;

/// Confidence assigned to an hour degraded by a per-hour inference failure.
const DEGRADED_CONFIDENCE: f64 = 0.3;

/// Confidence bounds after band-ratio rescaling.
const CONFIDENCE_FLOOR: f64 = 0.3;
const CONFIDENCE_CEILING: f64 = 0.98;

/// Volatility assumed when the history is too short to estimate one.
const DEFAULT_CV: f64 = 0.5;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PredictorSettings {
    /// Point-estimate model artifact.
    pub model_path: PathBuf,
    /// p10 quantile artifact; derived from `model_path` when unset.
    pub model_p10_path: Option<PathBuf>,
    /// p90 quantile artifact; derived from `model_path` when unset.
    pub model_p90_path: Option<PathBuf>,
    /// Rolling history window (192 = 8 days hourly, covers the 168h lag).
    pub history_window: usize,
    /// Exponential smoothing reactivity factor [0, 1].
    pub alpha: f64,
    pub cache_ttl_seconds: u64,
    /// Observation delta (CLP/kWh) that invalidates the forecast cache.
    pub invalidate_delta_clp: f64,
}

impl Default for PredictorSettings {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/price_predictor.json"),
            model_p10_path: None,
            model_p90_path: None,
            history_window: 192,
            alpha: 0.3,
            cache_ttl_seconds: 1800,
            invalidate_delta_clp: 5.0,
        }
    }
}

struct ForecastCache {
    generated_at: Instant,
    forecasts: Vec<HourlyPriceForecast>,
}

/// Predicts node marginal-cost prices for the next 24 hours.
///
/// Not internally synchronized: `update` and `predict_next_24h` take
/// `&mut self`, so a shared instance must live behind a mutex (the REST
/// layer wraps one in `parking_lot::Mutex` per site).
pub struct CmgPredictor {
    node: String,
    model_path: PathBuf,
    p10_path: PathBuf,
    p90_path: PathBuf,
    alpha: f64,
    cache_ttl: Duration,
    invalidate_delta: f64,
    history: PriceHistory,
    /// Exponential smoothing state per hour-of-day.
    smooth: [f64; 24],
    session: Option<Box<dyn InferenceSession>>,
    session_p10: Option<Box<dyn InferenceSession>>,
    session_p90: Option<Box<dyn InferenceSession>>,
    cache: Option<ForecastCache>,
    observer: Arc<dyn EngineObserver>,
}

impl CmgPredictor {
    pub fn new(node: impl Into<String>, settings: &PredictorSettings) -> Self {
        let p10_path = settings
            .model_p10_path
            .clone()
            .unwrap_or_else(|| quantile_path(&settings.model_path, "_p10"));
        let p90_path = settings
            .model_p90_path
            .clone()
            .unwrap_or_else(|| quantile_path(&settings.model_path, "_p90"));
        Self {
            node: node.into(),
            model_path: settings.model_path.clone(),
            p10_path,
            p90_path,
            alpha: settings.alpha.clamp(0.0, 1.0),
            cache_ttl: Duration::from_secs(settings.cache_ttl_seconds),
            invalidate_delta: settings.invalidate_delta_clp,
            history: PriceHistory::new(settings.history_window),
            smooth: HOURLY_MEAN_CMG,
            session: None,
            session_p10: None,
            session_p90: None,
            cache: None,
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn EngineObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Load the model artifacts. A missing or unreadable point artifact
    /// selects the smoothing fallback for the lifetime of this instance;
    /// quantile artifacts load independently of each other.
    pub fn load(&mut self) {
        match ml::load_session(&self.model_path) {
            Ok(session) => {
                info!(
                    node = %self.node,
                    path = %self.model_path.display(),
                    "price model loaded"
                );
                self.session = Some(session);
            }
            Err(err) => {
                info!(
                    node = %self.node,
                    path = %self.model_path.display(),
                    reason = %err,
                    "price model unavailable, using smoothing fallback"
                );
                return;
            }
        }

        self.session_p10 = load_quantile(&self.p10_path, "p10", &self.node);
        self.session_p90 = load_quantile(&self.p90_path, "p90", &self.node);
    }

    /// Feed a new price observation. Invalidates the forecast cache when
    /// the price moved more than the configured delta since the last
    /// observation.
    pub fn update(&mut self, hour: u8, cmg_clp_kwh: f64) {
        if self.cache.is_some() {
            if let Some(last) = self.history.last_price() {
                if (cmg_clp_kwh - last).abs() > self.invalidate_delta {
                    debug!(
                        node = %self.node,
                        last,
                        observed = cmg_clp_kwh,
                        "price moved beyond delta, forecast cache dropped"
                    );
                    self.cache = None;
                }
            }
        }

        let h = (hour as usize) % 24;
        self.history.push(hour % 24, cmg_clp_kwh);
        self.smooth[h] = self.alpha * cmg_clp_kwh + (1.0 - self.alpha) * self.smooth[h];
    }

    /// Force cache expiry on the next prediction call.
    pub fn invalidate_cache(&mut self) {
        self.cache = None;
    }

    /// Seed the rolling history from a CSV file with an hour column
    /// (`hora` or `hour`) and a price column (`cmg_clp_kwh` or
    /// `costo_marginal`). Malformed rows are skipped; a missing file
    /// yields zero rows, not an error.
    pub fn load_history_from_csv(&mut self, csv_path: &Path) -> usize {
        let mut reader = match csv::Reader::from_path(csv_path) {
            Ok(reader) => reader,
            Err(err) => {
                warn!(node = %self.node, path = %csv_path.display(), error = %err, "history load failed");
                return 0;
            }
        };

        let headers = match reader.headers() {
            Ok(headers) => headers.clone(),
            Err(err) => {
                warn!(node = %self.node, error = %err, "history header read failed");
                return 0;
            }
        };
        let hour_col = column_index(&headers, &["hora", "hour"]);
        let price_col = column_index(&headers, &["cmg_clp_kwh", "costo_marginal"]);
        let (Some(hour_col), Some(price_col)) = (hour_col, price_col) else {
            warn!(node = %self.node, path = %csv_path.display(), "history columns missing");
            return 0;
        };

        let mut count = 0;
        for record in reader.records() {
            let Ok(record) = record else { continue };
            let Some(hour) = record.get(hour_col).and_then(parse_hour) else {
                continue;
            };
            let Some(price) = record
                .get(price_col)
                .and_then(|s| s.trim().parse::<f64>().ok())
            else {
                continue;
            };
            self.update(hour, price);
            count += 1;
        }

        info!(node = %self.node, rows = count, "price history seeded");
        count
    }

    /// Generate the 24-hour forecast, ordered by hour starting at
    /// `(current_hour + 1) % 24`. Served from cache while the TTL holds;
    /// `current_price`, when given, is recorded first and may invalidate
    /// the cache through the delta rule.
    pub fn predict_next_24h(
        &mut self,
        current_hour: u8,
        current_price: Option<f64>,
    ) -> Vec<HourlyPriceForecast> {
        if let Some(price) = current_price {
            self.update(current_hour, price);
        }

        if let Some(cache) = &self.cache {
            if cache.generated_at.elapsed() < self.cache_ttl {
                return cache.forecasts.clone();
            }
        }

        let started = Instant::now();
        let forecasts = if self.session.is_some() {
            self.predict_with_model(current_hour, current_price.unwrap_or(0.0))
        } else {
            self.predict_with_smoothing(current_hour)
        };
        self.observer
            .forecast_computed(&self.node, forecasts.len(), started.elapsed());

        self.cache = Some(ForecastCache {
            generated_at: Instant::now(),
            forecasts: forecasts.clone(),
        });
        forecasts
    }

    /// Model inference for all 24 target hours, with quantile bands when
    /// both quantile sessions are present. A per-hour failure degrades
    /// that hour alone to the smoothing value and the loop continues.
    fn predict_with_model(&self, current_hour: u8, current_price: f64) -> Vec<HourlyPriceForecast> {
        let Some(session) = self.session.as_deref() else {
            return self.predict_with_smoothing(current_hour);
        };
        let ctx = FeatureContext::from_history(&self.history, current_price);

        let mut forecasts = Vec::with_capacity(24);
        for offset in 1..=24u32 {
            let hour = ((u32::from(current_hour) + offset) % 24) as u8;
            let features = ctx.vector_for_hour(hour);

            match session.run(&features) {
                Ok(raw) => {
                    let price = raw.max(0.0);
                    let mut confidence = MODEL_BASE_CONFIDENCE;
                    let mut band = None;

                    if let (Some(p10s), Some(p90s)) = (&self.session_p10, &self.session_p90) {
                        if let (Ok(p10), Ok(p90)) = (p10s.run(&features), p90s.run(&features)) {
                            let p10 = p10.max(0.0);
                            let p90 = p90.max(0.0);
                            if price > 0.0 && p90 > p10 {
                                // Narrow band relative to the estimate -> higher confidence
                                let band_ratio = (p90 - p10) / price;
                                confidence = (1.0 - band_ratio * 0.5)
                                    .clamp(CONFIDENCE_FLOOR, CONFIDENCE_CEILING);
                            }
                            band = Some((p10, p90));
                        }
                    }

                    forecasts.push(match band {
                        Some((p10, p90)) => HourlyPriceForecast::banded(
                            hour,
                            price,
                            p10,
                            p90,
                            confidence,
                            ForecastMethod::Model,
                        ),
                        None => {
                            HourlyPriceForecast::new(hour, price, confidence, ForecastMethod::Model)
                        }
                    });
                }
                Err(err) => {
                    warn!(node = %self.node, hour, error = %err, "model inference failed, hour degraded");
                    forecasts.push(HourlyPriceForecast::new(
                        hour,
                        self.smooth[hour as usize],
                        DEGRADED_CONFIDENCE,
                        ForecastMethod::Smoothing,
                    ));
                }
            }
        }
        forecasts
    }

    /// Exponential smoothing prediction, no model required. Confidence
    /// decays with the forecast horizon (half-life about 8 h), damped by
    /// 1/(1+cv) when recent history is volatile; beyond 12 h ahead the
    /// estimate blends linearly toward the historic hourly mean.
    fn predict_with_smoothing(&self, current_hour: u8) -> Vec<HourlyPriceForecast> {
        let cv = self
            .history
            .coefficient_of_variation(24)
            .unwrap_or(DEFAULT_CV);

        let mut forecasts = Vec::with_capacity(24);
        for offset in 1..=24u32 {
            let hour = ((u32::from(current_hour) + offset) % 24) as u8;
            let mut predicted = self.smooth[hour as usize];

            let horizon_decay = (-f64::from(offset) / 12.0).exp();
            let confidence = (horizon_decay / (1.0 + cv)).max(0.1);

            if offset > 12 {
                let w = (f64::from(offset) - 12.0) / 12.0;
                predicted = (1.0 - w) * predicted + w * HOURLY_MEAN_CMG[hour as usize];
            }

            // Band width scales inversely with confidence
            let band = predicted * (0.3 - 0.2 * confidence);
            forecasts.push(HourlyPriceForecast::banded(
                hour,
                predicted,
                (predicted - band).max(0.0),
                predicted + band,
                confidence,
                ForecastMethod::Smoothing,
            ));
        }
        forecasts
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    pub fn is_model_loaded(&self) -> bool {
        self.session.is_some()
    }

    pub fn has_quantile_models(&self) -> bool {
        self.session_p10.is_some() && self.session_p90.is_some()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Seconds since the current cache entry was generated (0 without one).
    pub fn cache_age(&self) -> Duration {
        self.cache
            .as_ref()
            .map(|c| c.generated_at.elapsed())
            .unwrap_or(Duration::ZERO)
    }

    /// Hours most suitable for charging: charge-hinted hours ranked by
    /// price ascending, confidence descending, top 4.
    pub fn best_charge_window(&self, forecasts: &[HourlyPriceForecast]) -> Vec<u8> {
        use crate::domain::DispatchHint;
        use ordered_float::OrderedFloat;

        let mut candidates: Vec<&HourlyPriceForecast> = forecasts
            .iter()
            .filter(|f| f.dispatch_hint() == DispatchHint::Charge)
            .collect();
        candidates.sort_by_key(|f| (OrderedFloat(f.price_clp_kwh), OrderedFloat(-f.confidence)));
        candidates.iter().take(4).map(|f| f.hour).collect()
    }

    /// Hours most suitable for discharging: discharge-hinted hours ranked
    /// by price descending, confidence descending, top 4.
    pub fn best_discharge_window(&self, forecasts: &[HourlyPriceForecast]) -> Vec<u8> {
        use crate::domain::DispatchHint;
        use ordered_float::OrderedFloat;

        let mut candidates: Vec<&HourlyPriceForecast> = forecasts
            .iter()
            .filter(|f| f.dispatch_hint() == DispatchHint::Discharge)
            .collect();
        candidates.sort_by_key(|f| (OrderedFloat(-f.price_clp_kwh), OrderedFloat(-f.confidence)));
        candidates.iter().take(4).map(|f| f.hour).collect()
    }

    /// Optimistic single-cycle arbitrage revenue (CLP): buy the day's
    /// minimum point price, sell the maximum.
    pub fn projected_arbitrage_revenue(
        &self,
        forecasts: &[HourlyPriceForecast],
        capacity_kwh: f64,
        efficiency: f64,
    ) -> f64 {
        let Some((min_price, max_price)) = price_extremes(forecasts) else {
            return 0.0;
        };
        capacity_kwh * efficiency * max_price - capacity_kwh * min_price
    }

    /// Conservative variant for reporting: charge priced at the worst p90,
    /// discharge at the worst peak-hour p10. Never used for dispatch.
    pub fn projected_arbitrage_revenue_conservative(
        &self,
        forecasts: &[HourlyPriceForecast],
        capacity_kwh: f64,
        efficiency: f64,
    ) -> f64 {
        if forecasts.is_empty() {
            return 0.0;
        }
        let charge_price = forecasts.iter().map(|f| f.price_p90).fold(0.0, f64::max);
        let discharge_price = forecasts
            .iter()
            .filter(|f| f.is_peak())
            .map(|f| f.price_p10)
            .fold(f64::INFINITY, f64::min);
        let discharge_price = if discharge_price.is_finite() {
            discharge_price
        } else {
            0.0
        };
        capacity_kwh * efficiency * discharge_price - capacity_kwh * charge_price
    }
}

fn quantile_path(model_path: &Path, suffix: &str) -> PathBuf {
    let stem = model_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("model");
    let ext = model_path.extension().and_then(|s| s.to_str()).unwrap_or("json");
    model_path.with_file_name(format!("{stem}{suffix}.{ext}"))
}

fn load_quantile(path: &Path, label: &str, node: &str) -> Option<Box<dyn InferenceSession>> {
    if !path.exists() {
        debug!(node, label, path = %path.display(), "quantile artifact absent");
        return None;
    }
    match ml::load_session(path) {
        Ok(session) => {
            info!(node, label, path = %path.display(), "quantile model loaded");
            Some(session)
        }
        Err(err) => {
            warn!(node, label, error = %err, "quantile model load failed");
            None
        }
    }
}

fn column_index(headers: &csv::StringRecord, names: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
}

fn parse_hour(raw: &str) -> Option<u8> {
    let hour = raw.trim().parse::<f64>().ok()?;
    if !(0.0..24.0).contains(&hour) {
        return None;
    }
    Some(hour as u8)
}

fn price_extremes(forecasts: &[HourlyPriceForecast]) -> Option<(f64, f64)> {
    if forecasts.is_empty() {
        return None;
    }
    let min = forecasts
        .iter()
        .map(|f| f.price_clp_kwh)
        .fold(f64::INFINITY, f64::min);
    let max = forecasts
        .iter()
        .map(|f| f.price_clp_kwh)
        .fold(f64::NEG_INFINITY, f64::max);
    Some((min, max))
}
