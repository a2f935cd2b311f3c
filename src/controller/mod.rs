use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use tracing::info;

use crate::config::Config;
use crate::forecast::CmgPredictor;
use crate::observer::TracingObserver;
use crate::optimizer::ArbitrageEngine;

/// Shared application state.
///
/// The predictor's forecast cache is plain mutable state, so the single
/// per-site instance lives behind a mutex; handlers must lock for the
/// whole update-and-predict sequence. The engine is stateless and shared
/// freely.
#[derive(Clone)]
pub struct AppState {
    pub cfg: Config,
    pub predictor: Arc<Mutex<CmgPredictor>>,
    pub engine: Arc<ArbitrageEngine>,
}

impl AppState {
    pub fn new(cfg: Config) -> Result<Self> {
        cfg.scheduler
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid scheduler config: {e}"))?;

        let observer = Arc::new(TracingObserver);

        let mut predictor =
            CmgPredictor::new(&cfg.site.node, &cfg.predictor).with_observer(observer.clone());
        predictor.load();
        if let Some(csv_path) = &cfg.site.history_csv {
            let rows = predictor.load_history_from_csv(csv_path);
            info!(node = %cfg.site.node, rows, "startup history seed");
        }

        let engine = ArbitrageEngine::new(&cfg.site.node, cfg.scheduler.clone())
            .with_observer(observer);

        Ok(Self {
            cfg,
            predictor: Arc::new(Mutex::new(predictor)),
            engine: Arc::new(engine),
        })
    }
}
