pub mod bars;
pub mod config;
pub mod pattern;

pub use bars::{BarAggregator, BarUpdate, HistoryLoad};
pub use config::StrategyConfig;
pub use pattern::EngulfingDetector;

use common::{Bar, Signal};

/// All pattern detectors must satisfy this trait.
pub trait PatternDetector: Send + Sync {
    /// Human-readable name used in logs.
    fn name(&self) -> &str;

    /// Classify the completed bar series (oldest first).
    ///
    /// The in-progress bar is never part of `series`. Returns
    /// `Signal::Neutral` when no pattern is present.
    fn detect(&self, series: &[Bar]) -> Signal;
}
