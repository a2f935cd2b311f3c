//! End-to-end pipeline tests: predictor -> arbitrage engine.

use std::io::Write;
use std::path::PathBuf;

use bess_edge_dispatch::domain::{Action, ForecastMethod, HOURLY_MEAN_CMG};
use bess_edge_dispatch::forecast::{CmgPredictor, PredictorSettings};
use bess_edge_dispatch::optimizer::{ArbitrageEngine, SchedulerConfig};

fn fallback_predictor(node: &str) -> CmgPredictor {
    let settings = PredictorSettings {
        model_path: PathBuf::from("/nonexistent/model.json"),
        ..Default::default()
    };
    let mut predictor = CmgPredictor::new(node, &settings);
    predictor.load();
    predictor
}

#[test]
fn full_pipeline_produces_valid_plan() {
    let mut predictor = fallback_predictor("Maitencillo");

    // Three days of the realistic hourly profile
    for _day in 0..3 {
        for hour in 0..24u8 {
            predictor.update(hour, HOURLY_MEAN_CMG[hour as usize]);
        }
    }

    let forecasts = predictor.predict_next_24h(8, Some(45.0));
    assert_eq!(forecasts.len(), 24);

    let config = SchedulerConfig {
        capacity_kwh: 1000.0,
        max_power_kw: 500.0,
        min_soc_pct: 10.0,
        max_soc_pct: 95.0,
        efficiency: 0.92,
        ..Default::default()
    };
    let engine = ArbitrageEngine::new("Maitencillo", config);
    let plan = engine.compute(&forecasts, 50.0);

    assert_eq!(plan.slots.len(), 24);
    assert!(plan.n_charge_hours <= 6);
    assert!(plan.n_discharge_hours <= 4);
    assert!(plan.projected_net_clp >= 0.0);
    for slot in &plan.slots {
        assert!(slot.soc_after_pct >= 10.0 - 1e-9);
        assert!(slot.soc_after_pct <= 95.0 + 1e-9);
    }
}

#[test]
fn cold_start_predictor_serves_historic_profile() {
    // No model artifact and no history at all
    let mut predictor = fallback_predictor("ColdStart");
    let forecasts = predictor.predict_next_24h(0, None);

    assert_eq!(forecasts.len(), 24);
    for f in &forecasts {
        assert_eq!(f.method, ForecastMethod::Smoothing);
        // The smoothing state is the historic table at cold start
        assert!((f.price_clp_kwh - HOURLY_MEAN_CMG[f.hour as usize]).abs() < 1e-9);
        assert!((0.0..=1.0).contains(&f.confidence));
    }
}

#[test]
fn csv_seeded_predictor_feeds_engine() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "fecha,hora,cmg_clp_kwh").unwrap();
    for day in 0..2 {
        for hour in 0..24u8 {
            writeln!(
                file,
                "2025-01-0{},{hour},{}",
                day + 1,
                HOURLY_MEAN_CMG[hour as usize]
            )
            .unwrap();
        }
    }

    let mut predictor = fallback_predictor("CsvSeed");
    let rows = predictor.load_history_from_csv(file.path());
    assert_eq!(rows, 48);

    let forecasts = predictor.predict_next_24h(12, None);
    let engine = ArbitrageEngine::new("CsvSeed", SchedulerConfig::default());
    let plan = engine.compute(&forecasts, 30.0);
    assert_eq!(plan.slots.len(), 24);
    assert!(
        (plan.projected_net_clp - (plan.projected_revenue_clp - plan.projected_cost_clp)).abs()
            < 1e-6
    );
}

#[test]
fn flat_market_holds_all_day() {
    use bess_edge_dispatch::domain::HourlyPriceForecast;

    let forecasts: Vec<HourlyPriceForecast> = (0..24u8)
        .map(|h| HourlyPriceForecast::new(h, 50.0, 0.85, ForecastMethod::Smoothing))
        .collect();

    let engine = ArbitrageEngine::new("FlatMarket", SchedulerConfig::default());
    let plan = engine.compute(&forecasts, 42.0);

    assert_eq!(plan.n_discharge_hours, 0);
    assert!(plan.projected_net_clp <= 0.0);
    assert!(plan
        .slots
        .iter()
        .all(|s| s.action == Action::Hold && (s.soc_after_pct - 42.0).abs() < 1e-9));
}

#[test]
fn cache_survives_between_calls_within_ttl() {
    let mut predictor = fallback_predictor("CacheCheck");
    for hour in 0..24u8 {
        predictor.update(hour, HOURLY_MEAN_CMG[hour as usize]);
    }

    let first = predictor.predict_next_24h(8, None);
    let second = predictor.predict_next_24h(8, None);
    assert_eq!(first, second);

    // An observation far outside the delta forces a fresh computation
    predictor.update(9, 500.0);
    let third = predictor.predict_next_24h(9, None);
    assert_ne!(first, third);
}
