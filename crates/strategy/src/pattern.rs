use common::{Bar, Signal};

use crate::PatternDetector;

/// Two-bar engulfing reversal detector.
///
/// Looks only at the two most recent completed bars:
/// - bullish engulfing (bearish `prev`, bullish `last` whose body extends past
///   `prev`'s body on both ends) gives `Signal::Call`
/// - bearish engulfing (the mirror image) gives `Signal::Put`
///
/// Returns `Signal::Neutral` with fewer than two bars.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngulfingDetector;

impl EngulfingDetector {
    pub fn classify(prev: &Bar, last: &Bar) -> Signal {
        if prev.is_bearish()
            && last.is_bullish()
            && last.close > prev.open
            && last.open < prev.close
        {
            Signal::Call
        } else if prev.is_bullish()
            && last.is_bearish()
            && last.open > prev.close
            && last.close < prev.open
        {
            Signal::Put
        } else {
            Signal::Neutral
        }
    }
}

impl PatternDetector for EngulfingDetector {
    fn name(&self) -> &str {
        "engulfing"
    }

    fn detect(&self, series: &[Bar]) -> Signal {
        match series {
            [.., prev, last] => Self::classify(prev, last),
            _ => Signal::Neutral,
        }
    }
}
