use std::collections::VecDeque;

/// Bounded rolling buffer of `(hour, price)` observations, oldest evicted
/// first. Feeds the smoothing volatility estimate and the lag features of
/// the price model.
#[derive(Debug, Clone)]
pub struct PriceHistory {
    entries: VecDeque<(u8, f64)>,
    window: usize,
}

impl PriceHistory {
    pub fn new(window: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(window.min(1024)),
            window: window.max(1),
        }
    }

    pub fn push(&mut self, hour: u8, price_clp_kwh: f64) {
        self.entries.push_back((hour, price_clp_kwh));
        while self.entries.len() > self.window {
            self.entries.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Most recent observed price.
    pub fn last_price(&self) -> Option<f64> {
        self.entries.back().map(|&(_, p)| p)
    }

    /// Price observed `hours_back` entries ago (1 = the latest).
    pub fn lag(&self, hours_back: usize) -> Option<f64> {
        if hours_back == 0 || hours_back > self.entries.len() {
            return None;
        }
        self.entries
            .get(self.entries.len() - hours_back)
            .map(|&(_, p)| p)
    }

    /// Prices of the most recent `n` observations, oldest first.
    pub fn recent_prices(&self, n: usize) -> Vec<f64> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).map(|&(_, p)| p).collect()
    }

    /// Sample mean and standard deviation of the last `n` observations.
    /// Returns `None` when fewer than two observations exist.
    pub fn recent_stats(&self, n: usize) -> Option<(f64, f64)> {
        let values = self.recent_prices(n);
        if values.len() < 2 {
            return None;
        }
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
            / (values.len() - 1) as f64;
        Some((mean, variance.sqrt()))
    }

    /// Coefficient of variation (std/mean) over the last `n` observations.
    /// `None` when the history is too short or the mean is non-positive.
    pub fn coefficient_of_variation(&self, n: usize) -> Option<f64> {
        let (mean, std) = self.recent_stats(n)?;
        if mean <= 0.0 {
            return None;
        }
        Some(std / mean)
    }
}
