//! Offline arbitrage report generator.
//!
//! Runs the forecasting and scheduling pipeline once against the
//! configured site and prints the dispatch plan with a return estimate.
//! Usage: `report [history.csv]` - the optional CSV overrides the
//! configured history seed.

use std::path::PathBuf;

use anyhow::Result;
use chrono::Timelike;
use bess_edge_dispatch::config::Config;
use bess_edge_dispatch::forecast::CmgPredictor;
use bess_edge_dispatch::optimizer::ArbitrageEngine;
use bess_edge_dispatch::telemetry::init_tracing;
use tracing::info;

/// Reference CAPEX for a 1 MWh system (USD) and exchange assumptions.
const CAPEX_USD: f64 = 720_000.0;
const USD_CLP_RATE: f64 = 950.0;
const OPERATING_DAYS_PER_YEAR: u32 = 350;

fn main() -> Result<()> {
    init_tracing();

    let cfg = Config::load()?;
    let history_csv: Option<PathBuf> = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| cfg.site.history_csv.clone());

    let mut predictor = CmgPredictor::new(&cfg.site.node, &cfg.predictor);
    predictor.load();
    if let Some(path) = &history_csv {
        let rows = predictor.load_history_from_csv(path);
        info!(path = %path.display(), rows, "history seeded");
    }

    let current_hour = chrono::Local::now().hour() as u8;
    let forecasts = predictor.predict_next_24h(current_hour, None);

    let engine = ArbitrageEngine::new(&cfg.site.node, cfg.scheduler.clone());
    let plan = engine.compute(&forecasts, 50.0);
    let roe = engine.annualized_return_estimate(&plan, CAPEX_USD, USD_CLP_RATE, OPERATING_DAYS_PER_YEAR);

    println!("{}", plan.summary());
    println!(
        "  Mode:      {}",
        if predictor.is_model_loaded() { "model" } else { "smoothing_fallback" }
    );
    println!(
        "  Optimistic single-cycle revenue: CLP {:.0}",
        predictor.projected_arbitrage_revenue(&forecasts, cfg.scheduler.capacity_kwh, cfg.scheduler.efficiency)
    );
    println!(
        "  Conservative band revenue:       CLP {:.0}",
        predictor.projected_arbitrage_revenue_conservative(
            &forecasts,
            cfg.scheduler.capacity_kwh,
            cfg.scheduler.efficiency
        )
    );
    println!("  Annualized return estimate:      {:.1}%", roe * 100.0);

    Ok(())
}
