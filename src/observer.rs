//! Side-channel observation of the forecasting and scheduling engines.
//!
//! The engines report "forecast computed" / "plan computed" events through
//! this trait so metrics backends stay decoupled from the algorithms; the
//! default no-op observer lets tests run without any backend.

use std::time::Duration;

/// Hooks invoked by the predictor and scheduler after each computation.
pub trait EngineObserver: Send + Sync {
    fn forecast_computed(&self, _node: &str, _n_forecasts: usize, _elapsed: Duration) {}

    fn plan_computed(
        &self,
        _node: &str,
        _n_charge_hours: usize,
        _n_discharge_hours: usize,
        _net_clp: f64,
        _elapsed: Duration,
    ) {
    }
}

/// Observer that discards all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl EngineObserver for NoopObserver {}

/// Observer that emits structured log events for each computation.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl EngineObserver for TracingObserver {
    fn forecast_computed(&self, node: &str, n_forecasts: usize, elapsed: Duration) {
        tracing::info!(
            node,
            n_forecasts,
            elapsed_ms = elapsed.as_millis() as u64,
            "forecast computed"
        );
    }

    fn plan_computed(
        &self,
        node: &str,
        n_charge_hours: usize,
        n_discharge_hours: usize,
        net_clp: f64,
        elapsed: Duration,
    ) {
        tracing::info!(
            node,
            n_charge_hours,
            n_discharge_hours,
            net_clp,
            elapsed_ms = elapsed.as_millis() as u64,
            "plan computed"
        );
    }
}
