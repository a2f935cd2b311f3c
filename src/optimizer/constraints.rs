use serde::{Deserialize, Serialize};

/// Physical and policy limits for the arbitrage scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Usable battery capacity (kWh).
    pub capacity_kwh: f64,
    /// Maximum charge/discharge power (kW).
    pub max_power_kw: f64,
    /// Safety floor (%).
    pub min_soc_pct: f64,
    /// Safety ceiling (%).
    pub max_soc_pct: f64,
    /// Round-trip efficiency (0, 1].
    pub efficiency: f64,
    /// Maximum charging hours per day (cycle life management).
    pub max_charge_hours: usize,
    /// Maximum discharging hours per day.
    pub max_discharge_hours: usize,
    /// Hours below this confidence are never traded.
    pub min_confidence: f64,
    /// Minimum p90-p10 price spread (CLP/kWh) required to trade at all.
    pub min_spread_clp: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            capacity_kwh: 1000.0,
            max_power_kw: 500.0,
            min_soc_pct: 10.0,
            max_soc_pct: 95.0,
            efficiency: 0.92,
            max_charge_hours: 6,
            max_discharge_hours: 4,
            min_confidence: 0.4,
            min_spread_clp: 30.0,
        }
    }
}

impl SchedulerConfig {
    /// Validate that the configuration is physically possible.
    pub fn validate(&self) -> Result<(), String> {
        if self.capacity_kwh <= 0.0 {
            return Err("capacity_kwh must be positive".to_string());
        }
        if self.max_power_kw <= 0.0 {
            return Err("max_power_kw must be positive".to_string());
        }
        if !(0.0..=100.0).contains(&self.min_soc_pct) {
            return Err("min_soc_pct must be between 0 and 100".to_string());
        }
        if !(0.0..=100.0).contains(&self.max_soc_pct) {
            return Err("max_soc_pct must be between 0 and 100".to_string());
        }
        if self.min_soc_pct > self.max_soc_pct {
            return Err("min_soc_pct must be <= max_soc_pct".to_string());
        }
        if !(self.efficiency > 0.0 && self.efficiency <= 1.0) {
            return Err("efficiency must be in (0, 1]".to_string());
        }
        if self.max_charge_hours > 24 {
            return Err("max_charge_hours must be <= 24".to_string());
        }
        if self.max_discharge_hours > 24 {
            return Err("max_discharge_hours must be <= 24".to_string());
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err("min_confidence must be between 0 and 1".to_string());
        }
        if self.min_spread_clp < 0.0 {
            return Err("min_spread_clp must be non-negative".to_string());
        }
        Ok(())
    }

    /// Usable SOC range (percentage points).
    pub fn soc_range(&self) -> f64 {
        self.max_soc_pct - self.min_soc_pct
    }
}
