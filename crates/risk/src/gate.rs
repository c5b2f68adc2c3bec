use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use common::{Bar, Direction, Error, Result, Signal, SkipReason};
use strategy::PatternDetector;

use crate::Ledger;

/// User-configurable risk parameters, the `[risk]` section of the bot config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Amount risked per contract.
    pub stake: f64,
    /// Below this balance (real or simulated) no new contract is opened.
    pub min_stake: f64,
    /// Minimum seconds between two trade requests.
    pub cooldown_secs: i64,
    /// Simulated drawdown from peak that blocks new entries (e.g. 0.10 = 10%).
    pub max_drawdown_pct: f64,
    /// Starting value of the simulated ledger.
    pub paper_balance: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            stake: 1.0,
            min_stake: 1.0,
            cooldown_secs: 300,
            max_drawdown_pct: 0.10,
            paper_balance: 100.0,
        }
    }
}

impl RiskConfig {
    pub fn validate(&self) -> Result<()> {
        if self.stake <= 0.0 || self.min_stake <= 0.0 {
            return Err(Error::Config("risk.stake and risk.min_stake must be > 0".into()));
        }
        if self.cooldown_secs < 0 {
            return Err(Error::Config("risk.cooldown_secs must be >= 0".into()));
        }
        if !(0.0..1.0).contains(&self.max_drawdown_pct) {
            return Err(Error::Config(format!(
                "risk.max_drawdown_pct must be in [0, 1), got {}",
                self.max_drawdown_pct
            )));
        }
        if !self.paper_balance.is_finite() || self.paper_balance < 0.0 {
            return Err(Error::Config("risk.paper_balance must be >= 0".into()));
        }
        Ok(())
    }
}

/// Result of one evaluation cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    /// A guard failed; the detector was not consulted.
    Skip(SkipReason),
    /// All guards passed but the detector saw no pattern.
    NoSignal,
    /// Open a contract in this direction. The cooldown clock has been restarted.
    Trade(Direction),
}

/// The gatekeeper between bar closes and trade requests.
///
/// Guards run in strict order and the first failure short-circuits the cycle:
/// cooldown, simulated floor, authoritative floor, drawdown. The cooldown
/// clock starts when a trade is approved (submission), not on confirmation.
#[derive(Debug, Clone)]
pub struct RiskGate {
    config: RiskConfig,
    last_trade_time: Option<i64>,
}

impl RiskGate {
    pub fn new(config: RiskConfig) -> Self {
        Self {
            config,
            last_trade_time: None,
        }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn last_trade_time(&self) -> Option<i64> {
        self.last_trade_time
    }

    /// Check the guards without consulting the detector.
    pub fn check_guards(&self, now: i64, ledger: &Ledger) -> Option<SkipReason> {
        if let Some(last) = self.last_trade_time {
            if now.saturating_sub(last) < self.config.cooldown_secs {
                return Some(SkipReason::Cooldown);
            }
        }

        if below(ledger.simulated_balance(), self.config.min_stake) {
            return Some(SkipReason::SimulatedFloor);
        }

        match ledger.authoritative_balance() {
            None => return Some(SkipReason::AwaitingBalance),
            Some(balance) if below(balance, self.config.min_stake) => {
                return Some(SkipReason::AuthoritativeFloor)
            }
            Some(_) => {}
        }

        let floor = ledger.peak_simulated_balance() * (1.0 - self.config.max_drawdown_pct);
        if below(ledger.simulated_balance(), floor) {
            return Some(SkipReason::Drawdown);
        }

        None
    }

    /// Run one evaluation cycle. Invoked once per bar-closed event.
    pub fn evaluate(
        &mut self,
        now: i64,
        ledger: &Ledger,
        series: &[Bar],
        detector: &dyn PatternDetector,
    ) -> Decision {
        if let Some(reason) = self.check_guards(now, ledger) {
            debug!(reason = %reason, now = now, "Evaluation skipped");
            return Decision::Skip(reason);
        }

        let signal = detector.detect(series);
        match signal.direction() {
            Some(direction) => {
                self.last_trade_time = Some(now);
                info!(
                    detector = detector.name(),
                    direction = %direction,
                    now = now,
                    "Trade approved by RiskGate"
                );
                Decision::Trade(direction)
            }
            None => {
                debug_assert_eq!(signal, Signal::Neutral);
                debug!(detector = detector.name(), bars = series.len(), "No signal");
                Decision::NoSignal
            }
        }
    }
}

/// Strictly below `floor`, or not comparable at all. A NaN on either side
/// blocks.
fn below(value: f64, floor: f64) -> bool {
    !matches!(
        value.partial_cmp(&floor),
        Some(Ordering::Greater | Ordering::Equal)
    )
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use strategy::EngulfingDetector;

    fn bar(open: f64, close: f64) -> Bar {
        Bar {
            open,
            high: open.max(close),
            low: open.min(close),
            close,
            open_time: 0,
            last_update_time: 0,
        }
    }

    fn call_series() -> Vec<Bar> {
        vec![bar(10.0, 8.0), bar(7.0, 11.0)]
    }

    fn funded_ledger() -> Ledger {
        let mut ledger = Ledger::new(100.0);
        ledger.record_authoritative_balance(1_000.0);
        ledger
    }

    #[test]
    fn approves_when_all_guards_pass() {
        let mut gate = RiskGate::new(RiskConfig::default());
        let decision = gate.evaluate(1_000, &funded_ledger(), &call_series(), &EngulfingDetector);
        assert_eq!(decision, Decision::Trade(Direction::Call));
        assert_eq!(gate.last_trade_time(), Some(1_000));
    }

    #[test]
    fn neutral_signal_does_not_start_cooldown() {
        let mut gate = RiskGate::new(RiskConfig::default());
        let series = vec![bar(10.0, 9.0), bar(9.5, 9.8)];
        let decision = gate.evaluate(1_000, &funded_ledger(), &series, &EngulfingDetector);
        assert_eq!(decision, Decision::NoSignal);
        assert_eq!(gate.last_trade_time(), None);
    }

    #[test]
    fn cooldown_blocks_until_elapsed() {
        let mut gate = RiskGate::new(RiskConfig::default());
        let ledger = funded_ledger();
        let series = call_series();

        assert!(matches!(gate.evaluate(1_000, &ledger, &series, &EngulfingDetector), Decision::Trade(_)));
        assert_eq!(
            gate.evaluate(1_299, &ledger, &series, &EngulfingDetector),
            Decision::Skip(SkipReason::Cooldown)
        );
        assert!(matches!(gate.evaluate(1_300, &ledger, &series, &EngulfingDetector), Decision::Trade(_)));
    }

    #[test]
    fn cooldown_is_checked_first() {
        let mut gate = RiskGate::new(RiskConfig::default());
        gate.evaluate(1_000, &funded_ledger(), &call_series(), &EngulfingDetector);

        // every other guard would fail too
        let mut broke = Ledger::new(0.0);
        broke.record_authoritative_balance(0.0);
        assert_eq!(gate.check_guards(1_010, &broke), Some(SkipReason::Cooldown));
    }

    #[test]
    fn simulated_floor_before_authoritative_floor() {
        let gate = RiskGate::new(RiskConfig::default());
        let mut ledger = Ledger::new(0.5);
        ledger.record_authoritative_balance(0.5);
        assert_eq!(gate.check_guards(0, &ledger), Some(SkipReason::SimulatedFloor));
        assert!(SkipReason::SimulatedFloor.is_operational_error());
    }

    #[test]
    fn authoritative_floor_blocks() {
        let gate = RiskGate::new(RiskConfig::default());
        let mut ledger = Ledger::new(100.0);
        ledger.record_authoritative_balance(0.99);
        assert_eq!(gate.check_guards(0, &ledger), Some(SkipReason::AuthoritativeFloor));
    }

    #[test]
    fn missing_venue_balance_blocks() {
        let gate = RiskGate::new(RiskConfig::default());
        assert_eq!(
            gate.check_guards(0, &Ledger::new(100.0)),
            Some(SkipReason::AwaitingBalance)
        );
    }

    #[test]
    fn non_finite_balances_fail_closed() {
        let gate = RiskGate::new(RiskConfig::default());

        let mut ledger = funded_ledger();
        ledger.record_trade_outcome(f64::NAN, 0.0);
        assert!(ledger.simulated_balance().is_nan());
        assert_eq!(gate.check_guards(10_000, &ledger), Some(SkipReason::SimulatedFloor));

        let mut ledger = Ledger::new(100.0);
        ledger.record_authoritative_balance(f64::NAN);
        assert_eq!(gate.check_guards(0, &ledger), Some(SkipReason::AuthoritativeFloor));
    }

    #[test]
    fn drawdown_boundary_arithmetic() {
        let gate = RiskGate::new(RiskConfig::default());
        let mut ledger = funded_ledger();

        // 100 -> 97: 97 < 90 is false, still allowed
        for _ in 0..3 {
            ledger.record_trade_outcome(1.0, 0.0);
        }
        assert_eq!(ledger.simulated_balance(), 97.0);
        assert_eq!(gate.check_guards(0, &ledger), None);

        // exactly at the floor is allowed
        for _ in 0..7 {
            ledger.record_trade_outcome(1.0, 0.0);
        }
        assert_eq!(ledger.simulated_balance(), 90.0);
        assert_eq!(gate.check_guards(0, &ledger), None);

        ledger.record_trade_outcome(1.0, 0.0);
        assert_eq!(gate.check_guards(0, &ledger), Some(SkipReason::Drawdown));

        // recovery above the floor lifts the block on its own
        ledger.record_trade_outcome(1.0, 3.0);
        assert_eq!(ledger.simulated_balance(), 91.0);
        assert_eq!(gate.check_guards(0, &ledger), None);
    }

    #[test]
    fn skipped_cycle_does_not_consult_detector() {
        struct Panicking;
        impl PatternDetector for Panicking {
            fn name(&self) -> &str {
                "panicking"
            }
            fn detect(&self, _series: &[Bar]) -> Signal {
                panic!("detector must not run when a guard fails");
            }
        }

        let mut gate = RiskGate::new(RiskConfig::default());
        let decision = gate.evaluate(0, &Ledger::new(100.0), &call_series(), &Panicking);
        assert_eq!(decision, Decision::Skip(SkipReason::AwaitingBalance));
    }

    #[test]
    fn config_section_parses_with_defaults() {
        let cfg: RiskConfig = toml::from_str("cooldown_secs = 120").unwrap();
        assert_eq!(cfg.cooldown_secs, 120);
        assert_eq!(cfg.stake, 1.0);
        assert!(cfg.validate().is_ok());

        let bad = RiskConfig {
            max_drawdown_pct: 1.5,
            ..RiskConfig::default()
        };
        assert!(bad.validate().is_err());
    }
}
