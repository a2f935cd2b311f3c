//! Battery arbitrage scheduling over a 24-hour price forecast.
//!
//! The engine never fails: empty forecasts yield an empty plan and an
//! insufficient price spread yields an all-hold plan, so the dispatch
//! path upstream always receives a safe answer.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use itertools::Itertools;
use ordered_float::OrderedFloat;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{Action, DispatchPlan, DispatchSlot, HourlyPriceForecast};
use crate::observer::{EngineObserver, NoopObserver};

use super::constraints::SchedulerConfig;

/// Computes 24-hour charge/discharge schedules for a BESS node.
///
/// Algorithm:
/// 1. Hours below `min_confidence` are forced to hold.
/// 2. No trading at all when the p90-p10 spread over viable hours is
///    below `min_spread_clp`.
/// 3. Cheapest hours (price < mean - 0.5 sigma) become charge candidates,
///    most expensive (price > mean + 0.5 sigma) discharge candidates;
///    discharge wins an overlap.
/// 4. Chronological SOC simulation under the safety bounds.
pub struct ArbitrageEngine {
    node: String,
    config: SchedulerConfig,
    observer: Arc<dyn EngineObserver>,
}

impl ArbitrageEngine {
    pub fn new(node: impl Into<String>, config: SchedulerConfig) -> Self {
        Self {
            node: node.into(),
            config,
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn EngineObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Compute the 24-hour dispatch plan for the given forecast and
    /// current state of charge. Never fails: degenerate inputs produce an
    /// empty or all-hold plan.
    pub fn compute(
        &self,
        forecasts: &[HourlyPriceForecast],
        current_soc_pct: f64,
    ) -> DispatchPlan {
        let started = Instant::now();

        if forecasts.is_empty() {
            warn!(node = %self.node, "empty forecast, returning empty plan");
            return DispatchPlan::empty(&self.node, self.config.capacity_kwh, self.config.efficiency);
        }

        let viable: Vec<&HourlyPriceForecast> = forecasts
            .iter()
            .filter(|f| f.confidence >= self.config.min_confidence)
            .collect();
        let skipped_hours: Vec<u8> = forecasts
            .iter()
            .filter(|f| f.confidence < self.config.min_confidence)
            .map(|f| f.hour)
            .collect();
        if !skipped_hours.is_empty() {
            info!(
                node = %self.node,
                n_skipped = skipped_hours.len(),
                hours = %skipped_hours.iter().sorted().join(","),
                "low-confidence hours forced to hold"
            );
        }

        let effective_spread = if viable.is_empty() {
            0.0
        } else {
            let max_p90 = viable.iter().map(|f| f.price_p90).fold(f64::NEG_INFINITY, f64::max);
            let min_p10 = viable.iter().map(|f| f.price_p10).fold(f64::INFINITY, f64::min);
            max_p90 - min_p10
        };

        if viable.is_empty() || effective_spread < self.config.min_spread_clp {
            info!(
                node = %self.node,
                effective_spread,
                min_spread_clp = self.config.min_spread_clp,
                "spread too low, not trading"
            );
            return self.all_hold_plan(forecasts, current_soc_pct);
        }

        let (charge_hours, discharge_hours) = self.select_candidates(&viable);

        // Chronological SOC simulation
        let mut ordered: Vec<&HourlyPriceForecast> = forecasts.iter().collect();
        ordered.sort_by_key(|f| f.hour);

        let cfg = &self.config;
        let mut slots = Vec::with_capacity(ordered.len());
        let mut soc = current_soc_pct;
        let mut total_revenue = 0.0;
        let mut total_cost = 0.0;

        for fc in ordered {
            let soc_before = soc;
            let (action, power_kw, revenue_clp) = if charge_hours.contains(&fc.hour)
                && soc < cfg.max_soc_pct
            {
                let energy_needed_kwh = (cfg.max_soc_pct - soc) / 100.0 * cfg.capacity_kwh;
                let power_kw = cfg.max_power_kw.min(energy_needed_kwh);
                soc += power_kw / cfg.capacity_kwh * 100.0;
                // Charging is costed at the point estimate (production policy)
                let cost = power_kw * fc.price_clp_kwh;
                total_cost += cost;
                (Action::Charge, power_kw, -cost)
            } else if discharge_hours.contains(&fc.hour) && soc > cfg.min_soc_pct {
                let energy_available_kwh = (soc - cfg.min_soc_pct) / 100.0 * cfg.capacity_kwh;
                let drawn_kwh = cfg.max_power_kw.min(energy_available_kwh);
                let delivered_kw = drawn_kwh * cfg.efficiency;
                soc -= drawn_kwh / cfg.capacity_kwh * 100.0;
                let revenue = delivered_kw * fc.price_clp_kwh;
                total_revenue += revenue;
                (Action::Discharge, -delivered_kw, revenue)
            } else {
                (Action::Hold, 0.0, 0.0)
            };

            // SOC must stay inside the safety bounds after every step
            soc = soc.clamp(cfg.min_soc_pct, cfg.max_soc_pct);

            slots.push(DispatchSlot {
                hour: fc.hour,
                action,
                power_kw,
                forecast: fc.clone(),
                soc_before_pct: soc_before,
                soc_after_pct: soc,
                revenue_clp,
            });
        }

        let n_charge_hours = slots.iter().filter(|s| s.action == Action::Charge).count();
        let n_discharge_hours = slots.iter().filter(|s| s.action == Action::Discharge).count();
        let net = total_revenue - total_cost;

        let avg_confidence =
            forecasts.iter().map(|f| f.confidence).sum::<f64>() / forecasts.len() as f64;
        info!(
            node = %self.node,
            n_charge_hours,
            n_discharge_hours,
            projected_net_clp = net,
            avg_confidence,
            effective_spread,
            "schedule computed"
        );
        self.observer.plan_computed(
            &self.node,
            n_charge_hours,
            n_discharge_hours,
            net,
            started.elapsed(),
        );

        DispatchPlan {
            id: Uuid::new_v4(),
            node: self.node.clone(),
            created_at: Utc::now(),
            slots,
            projected_revenue_clp: total_revenue,
            projected_cost_clp: total_cost,
            projected_net_clp: net,
            n_charge_hours,
            n_discharge_hours,
            capacity_kwh: self.config.capacity_kwh,
            efficiency: self.config.efficiency,
        }
    }

    /// Estimate annualized return from a single day's plan.
    ///
    /// `capital_cost_usd` is converted at `usd_clp_rate`; the result is a
    /// decimal fraction (0.28 = 28% per year).
    pub fn annualized_return_estimate(
        &self,
        plan: &DispatchPlan,
        capital_cost_usd: f64,
        usd_clp_rate: f64,
        operating_days_per_year: u32,
    ) -> f64 {
        let capex_clp = capital_cost_usd * usd_clp_rate;
        if capex_clp <= 0.0 {
            return 0.0;
        }
        plan.projected_net_clp * f64::from(operating_days_per_year) / capex_clp
    }

    /// Rank viable hours by price and keep only those clearing the
    /// mean +/- 0.5 sigma thresholds. Discharge takes priority when an
    /// hour qualifies for both sets.
    fn select_candidates(&self, viable: &[&HourlyPriceForecast]) -> (HashSet<u8>, HashSet<u8>) {
        let prices: Vec<f64> = viable.iter().map(|f| f.price_clp_kwh).collect();
        let mean = prices.iter().sum::<f64>() / prices.len() as f64;
        let variance =
            prices.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / prices.len() as f64;
        let std = variance.sqrt();
        let low_threshold = mean - 0.5 * std;
        let high_threshold = mean + 0.5 * std;

        let mut by_price: Vec<&&HourlyPriceForecast> = viable.iter().collect();
        by_price.sort_by_key(|f| OrderedFloat(f.price_clp_kwh));

        let mut charge_hours: HashSet<u8> = by_price
            .iter()
            .take(self.config.max_charge_hours)
            .filter(|f| f.price_clp_kwh < low_threshold)
            .map(|f| f.hour)
            .collect();
        let discharge_hours: HashSet<u8> = by_price
            .iter()
            .rev()
            .take(self.config.max_discharge_hours)
            .filter(|f| f.price_clp_kwh > high_threshold)
            .map(|f| f.hour)
            .collect();

        charge_hours.retain(|h| !discharge_hours.contains(h));
        (charge_hours, discharge_hours)
    }

    /// All-hold plan preserving the current SOC (spread too low to trade).
    fn all_hold_plan(
        &self,
        forecasts: &[HourlyPriceForecast],
        current_soc_pct: f64,
    ) -> DispatchPlan {
        let mut ordered: Vec<&HourlyPriceForecast> = forecasts.iter().collect();
        ordered.sort_by_key(|f| f.hour);

        let slots: Vec<DispatchSlot> = ordered
            .into_iter()
            .map(|fc| DispatchSlot::hold(fc.clone(), current_soc_pct))
            .collect();

        DispatchPlan {
            id: Uuid::new_v4(),
            node: self.node.clone(),
            created_at: Utc::now(),
            slots,
            projected_revenue_clp: 0.0,
            projected_cost_clp: 0.0,
            projected_net_clp: 0.0,
            n_charge_hours: 0,
            n_discharge_hours: 0,
            capacity_kwh: self.config.capacity_kwh,
            efficiency: self.config.efficiency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ForecastMethod, HOURLY_MEAN_CMG};
    use proptest::prelude::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn flat_forecasts() -> Vec<HourlyPriceForecast> {
        (0..24)
            .map(|h| HourlyPriceForecast::new(h, 50.0, 0.85, ForecastMethod::Smoothing))
            .collect()
    }

    #[fixture]
    fn spread_forecasts() -> Vec<HourlyPriceForecast> {
        (0..24u8)
            .map(|h| {
                HourlyPriceForecast::new(
                    h,
                    HOURLY_MEAN_CMG[h as usize],
                    0.85,
                    ForecastMethod::Smoothing,
                )
            })
            .collect()
    }

    #[fixture]
    fn engine() -> ArbitrageEngine {
        ArbitrageEngine::new("Maitencillo", SchedulerConfig::default())
    }

    #[rstest]
    fn test_compute_24_slots_ordered_by_hour(
        engine: ArbitrageEngine,
        spread_forecasts: Vec<HourlyPriceForecast>,
    ) {
        let plan = engine.compute(&spread_forecasts, 50.0);
        assert_eq!(plan.slots.len(), 24);
        let hours: Vec<u8> = plan.slots.iter().map(|s| s.hour).collect();
        assert_eq!(hours, (0..24).collect::<Vec<u8>>());
    }

    #[rstest]
    fn test_soc_stays_within_bounds(
        engine: ArbitrageEngine,
        spread_forecasts: Vec<HourlyPriceForecast>,
    ) {
        let plan = engine.compute(&spread_forecasts, 50.0);
        let cfg = engine.config();
        for slot in &plan.slots {
            assert!(slot.soc_after_pct >= cfg.min_soc_pct - 1e-9);
            assert!(slot.soc_after_pct <= cfg.max_soc_pct + 1e-9);
        }
    }

    #[rstest]
    fn test_max_trading_hours_respected(
        engine: ArbitrageEngine,
        spread_forecasts: Vec<HourlyPriceForecast>,
    ) {
        let plan = engine.compute(&spread_forecasts, 50.0);
        assert!(plan.n_charge_hours <= engine.config().max_charge_hours);
        assert!(plan.n_discharge_hours <= engine.config().max_discharge_hours);
    }

    #[rstest]
    fn test_realized_counts_match_slots(
        engine: ArbitrageEngine,
        spread_forecasts: Vec<HourlyPriceForecast>,
    ) {
        let plan = engine.compute(&spread_forecasts, 50.0);
        let charging = plan.slots.iter().filter(|s| s.action == Action::Charge).count();
        let discharging = plan
            .slots
            .iter()
            .filter(|s| s.action == Action::Discharge)
            .count();
        assert_eq!(plan.n_charge_hours, charging);
        assert_eq!(plan.n_discharge_hours, discharging);
    }

    #[rstest]
    fn test_flat_prices_do_not_trade(
        engine: ArbitrageEngine,
        flat_forecasts: Vec<HourlyPriceForecast>,
    ) {
        let plan = engine.compute(&flat_forecasts, 50.0);
        assert_eq!(plan.n_discharge_hours, 0);
        assert!(plan.projected_net_clp <= 0.0);
        assert!(plan.slots.iter().all(|s| s.action == Action::Hold));
        // The all-hold plan preserves the caller's SOC
        assert!(plan.slots.iter().all(|s| (s.soc_after_pct - 50.0).abs() < 1e-9));
    }

    #[rstest]
    fn test_spread_prices_positive_net(
        engine: ArbitrageEngine,
        spread_forecasts: Vec<HourlyPriceForecast>,
    ) {
        let plan = engine.compute(&spread_forecasts, 50.0);
        assert!(plan.projected_net_clp >= 0.0);
        assert!(
            (plan.projected_net_clp - (plan.projected_revenue_clp - plan.projected_cost_clp)).abs()
                < 1e-6
        );
    }

    #[rstest]
    fn test_empty_forecast_returns_empty_plan(engine: ArbitrageEngine) {
        let plan = engine.compute(&[], 50.0);
        assert!(plan.slots.is_empty());
        assert_eq!(plan.projected_net_clp, 0.0);
    }

    #[rstest]
    fn test_low_confidence_hours_forced_to_hold(engine: ArbitrageEngine) {
        // Strong spread, but every hour below the confidence threshold
        let forecasts: Vec<HourlyPriceForecast> = (0..24u8)
            .map(|h| {
                HourlyPriceForecast::new(
                    h,
                    HOURLY_MEAN_CMG[h as usize],
                    0.2,
                    ForecastMethod::Smoothing,
                )
            })
            .collect();
        let plan = engine.compute(&forecasts, 50.0);
        assert!(plan.slots.iter().all(|s| s.action == Action::Hold));
        assert_eq!(plan.projected_net_clp, 0.0);
    }

    #[rstest]
    fn test_mixed_confidence_skips_only_low_hours(engine: ArbitrageEngine) {
        let forecasts: Vec<HourlyPriceForecast> = (0..24u8)
            .map(|h| {
                let confidence = if h == 20 { 0.1 } else { 0.85 };
                HourlyPriceForecast::new(
                    h,
                    HOURLY_MEAN_CMG[h as usize],
                    confidence,
                    ForecastMethod::Smoothing,
                )
            })
            .collect();
        let plan = engine.compute(&forecasts, 50.0);
        // Hour 20 is the most expensive hour but may not be traded
        let slot_20 = plan.slots.iter().find(|s| s.hour == 20).unwrap();
        assert_eq!(slot_20.action, Action::Hold);
    }

    #[rstest]
    fn test_narrow_spread_does_not_trade(engine: ArbitrageEngine) {
        // Prices 49..51 with tight bands: spread far below 30 CLP
        let forecasts: Vec<HourlyPriceForecast> = (0..24u8)
            .map(|h| {
                HourlyPriceForecast::banded(
                    h,
                    50.0 + f64::from(h % 3) - 1.0,
                    49.0,
                    52.0,
                    0.9,
                    ForecastMethod::Smoothing,
                )
            })
            .collect();
        let plan = engine.compute(&forecasts, 40.0);
        assert!(plan.slots.iter().all(|s| s.action == Action::Hold));
        assert!(plan.slots.iter().all(|s| (s.soc_after_pct - 40.0).abs() < 1e-9));
    }

    #[rstest]
    fn test_charge_power_positive_discharge_negative(
        engine: ArbitrageEngine,
        spread_forecasts: Vec<HourlyPriceForecast>,
    ) {
        let plan = engine.compute(&spread_forecasts, 50.0);
        for slot in &plan.slots {
            match slot.action {
                Action::Charge => assert!(slot.power_kw > 0.0),
                Action::Discharge => assert!(slot.power_kw < 0.0),
                Action::Hold => assert_eq!(slot.power_kw, 0.0),
            }
        }
    }

    #[rstest]
    fn test_charge_is_cost_discharge_is_revenue(
        engine: ArbitrageEngine,
        spread_forecasts: Vec<HourlyPriceForecast>,
    ) {
        let plan = engine.compute(&spread_forecasts, 50.0);
        for slot in &plan.slots {
            match slot.action {
                Action::Charge => assert!(slot.revenue_clp < 0.0),
                Action::Discharge => assert!(slot.revenue_clp > 0.0),
                Action::Hold => assert_eq!(slot.revenue_clp, 0.0),
            }
        }
    }

    #[rstest]
    fn test_no_discharge_from_min_soc_without_prior_charge(
        engine: ArbitrageEngine,
        spread_forecasts: Vec<HourlyPriceForecast>,
    ) {
        let plan = engine.compute(&spread_forecasts, engine.config().min_soc_pct);
        for slot in plan.slots.iter().filter(|s| s.action == Action::Discharge) {
            assert!(slot.soc_before_pct > engine.config().min_soc_pct);
        }
    }

    #[rstest]
    fn test_larger_system_never_earns_less(spread_forecasts: Vec<HourlyPriceForecast>) {
        let small = ArbitrageEngine::new("n", SchedulerConfig::default());
        let big = ArbitrageEngine::new(
            "n",
            SchedulerConfig {
                capacity_kwh: 2000.0,
                max_power_kw: 1000.0,
                ..SchedulerConfig::default()
            },
        );
        let plan_small = small.compute(&spread_forecasts, 50.0);
        let plan_big = big.compute(&spread_forecasts, 50.0);
        assert!(plan_big.projected_net_clp >= plan_small.projected_net_clp);
    }

    #[rstest]
    fn test_full_battery_earns_at_least_empty_battery(
        engine: ArbitrageEngine,
        spread_forecasts: Vec<HourlyPriceForecast>,
    ) {
        let plan_full = engine.compute(&spread_forecasts, 90.0);
        let plan_empty = engine.compute(&spread_forecasts, 15.0);
        assert!(plan_full.projected_revenue_clp >= plan_empty.projected_revenue_clp);
    }

    #[rstest]
    fn test_annualized_return_estimate(
        engine: ArbitrageEngine,
        spread_forecasts: Vec<HourlyPriceForecast>,
    ) {
        let plan = engine.compute(&spread_forecasts, 50.0);
        let roe = engine.annualized_return_estimate(&plan, 720_000.0, 950.0, 350);
        assert!((-0.5..=1.0).contains(&roe));
        // Degenerate capex never divides by zero
        assert_eq!(engine.annualized_return_estimate(&plan, 0.0, 950.0, 350), 0.0);
    }

    proptest! {
        #[test]
        fn prop_soc_and_sign_invariants(
            prices in proptest::collection::vec(0.0f64..200.0, 24),
            confidences in proptest::collection::vec(0.0f64..1.0, 24),
            soc in 10.0f64..95.0,
        ) {
            let forecasts: Vec<HourlyPriceForecast> = prices
                .iter()
                .zip(confidences.iter())
                .enumerate()
                .map(|(h, (&p, &c))| {
                    HourlyPriceForecast::new(h as u8, p, c, ForecastMethod::Smoothing)
                })
                .collect();
            let engine = ArbitrageEngine::new("prop", SchedulerConfig::default());
            let plan = engine.compute(&forecasts, soc);
            let cfg = engine.config();

            prop_assert_eq!(plan.slots.len(), 24);
            prop_assert!(plan.n_charge_hours <= cfg.max_charge_hours);
            prop_assert!(plan.n_discharge_hours <= cfg.max_discharge_hours);
            let net_err =
                (plan.projected_net_clp - (plan.projected_revenue_clp - plan.projected_cost_clp))
                    .abs();
            prop_assert!(net_err < 1e-6);
            for slot in &plan.slots {
                prop_assert!(slot.soc_after_pct >= cfg.min_soc_pct - 1e-9);
                prop_assert!(slot.soc_after_pct <= cfg.max_soc_pct + 1e-9);
                match slot.action {
                    Action::Charge => prop_assert!(slot.power_kw > 0.0),
                    Action::Discharge => prop_assert!(slot.power_kw < 0.0),
                    Action::Hold => prop_assert!(slot.power_kw == 0.0),
                }
            }
        }
    }
}
