use serde::{Deserialize, Serialize};

use common::{Error, Result};

/// Instrument and bar parameters, the `[strategy]` section of the bot config.
///
/// Example `config/bot.toml`:
/// ```toml
/// [strategy]
/// symbol = "R_100"
/// granularity_secs = 60
/// max_series_len = 200
/// contract_duration = 5
/// duration_unit = "m"
/// currency = "USD"
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Instrument symbol, e.g. "R_100".
    pub symbol: String,
    /// Bar bucket length in seconds.
    pub granularity_secs: u32,
    /// Completed bars retained by the aggregator.
    pub max_series_len: usize,
    pub contract_duration: u32,
    /// One of `t`, `s`, `m`, `h`, `d`.
    pub duration_unit: String,
    pub currency: String,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            symbol: "R_100".to_string(),
            granularity_secs: 60,
            max_series_len: 200,
            contract_duration: 5,
            duration_unit: "m".to_string(),
            currency: "USD".to_string(),
        }
    }
}

impl StrategyConfig {
    pub fn validate(&self) -> Result<()> {
        if self.symbol.trim().is_empty() {
            return Err(Error::Config("strategy.symbol must not be empty".into()));
        }
        if self.granularity_secs == 0 {
            return Err(Error::Config("strategy.granularity_secs must be > 0".into()));
        }
        // the detector needs two completed bars
        if self.max_series_len < 2 {
            return Err(Error::Config(format!(
                "strategy.max_series_len must be >= 2, got {}",
                self.max_series_len
            )));
        }
        if self.contract_duration == 0 {
            return Err(Error::Config("strategy.contract_duration must be > 0".into()));
        }
        if !matches!(self.duration_unit.as_str(), "t" | "s" | "m" | "h" | "d") {
            return Err(Error::Config(format!(
                "strategy.duration_unit must be one of t/s/m/h/d, got '{}'",
                self.duration_unit
            )));
        }
        Ok(())
    }
}
