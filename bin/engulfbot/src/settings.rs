use std::path::Path;

use serde::Deserialize;
use tracing::info;

use common::{Error, Result};
use paper::PaperConfig;
use risk::RiskConfig;
use strategy::StrategyConfig;

/// Trading parameters from the bot config file (TOML).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct BotSettings {
    pub strategy: StrategyConfig,
    pub risk: RiskConfig,
    pub paper: PaperConfig,
}

impl BotSettings {
    /// Load from a TOML file. A missing file means all defaults; a malformed
    /// or out-of-range one is a configuration error.
    pub fn load(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            info!(path = %path, "No bot config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read bot config at '{path}': {e}")))?;
        Self::parse(&content)
            .map_err(|e| Error::Config(format!("Invalid bot config at '{path}': {e}")))
    }

    fn parse(content: &str) -> Result<Self> {
        let settings: Self = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        settings.strategy.validate()?;
        settings.risk.validate()?;
        let paper = &settings.paper;
        if paper.payout_ratio.is_nan() || paper.payout_ratio < 0.0 {
            return Err(Error::Config("paper.payout_ratio must be >= 0".into()));
        }
        if paper.starting_balance.is_nan() || paper.starting_balance < 0.0 {
            return Err(Error::Config("paper.starting_balance must be >= 0".into()));
        }
        Ok(settings)
    }
}
