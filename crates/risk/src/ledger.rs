use tracing::info;

/// Authoritative and simulated balances.
///
/// The simulated (paper) balance runs in parallel with the real account and
/// never affects money at risk. Its running peak drives the drawdown guard.
#[derive(Debug, Clone)]
pub struct Ledger {
    /// Last balance reported by the venue; `None` until the first report.
    authoritative_balance: Option<f64>,
    simulated_balance: f64,
    /// Monotone non-decreasing.
    peak_simulated_balance: f64,
    wins: u32,
    losses: u32,
}

impl Ledger {
    pub fn new(paper_balance: f64) -> Self {
        Self {
            authoritative_balance: None,
            simulated_balance: paper_balance,
            peak_simulated_balance: paper_balance,
            wins: 0,
            losses: 0,
        }
    }

    pub fn authoritative_balance(&self) -> Option<f64> {
        self.authoritative_balance
    }

    pub fn simulated_balance(&self) -> f64 {
        self.simulated_balance
    }

    pub fn peak_simulated_balance(&self) -> f64 {
        self.peak_simulated_balance
    }

    pub fn wins(&self) -> u32 {
        self.wins
    }

    pub fn losses(&self) -> u32 {
        self.losses
    }

    /// Fractional decline of the simulated balance from its peak.
    pub fn drawdown(&self) -> f64 {
        if self.peak_simulated_balance <= 0.0 {
            return 0.0;
        }
        (self.peak_simulated_balance - self.simulated_balance) / self.peak_simulated_balance
    }

    pub fn record_authoritative_balance(&mut self, value: f64) {
        self.authoritative_balance = Some(value);
    }

    /// Apply a settled contract to the simulated balance and return the net P&L.
    ///
    /// `payout` is the realised payout, 0 when the position lost.
    pub fn record_trade_outcome(&mut self, stake: f64, payout: f64) -> f64 {
        let pnl = if payout > 0.0 {
            self.wins += 1;
            payout - stake
        } else {
            self.losses += 1;
            -stake
        };
        self.simulated_balance += pnl;
        if self.simulated_balance > self.peak_simulated_balance {
            self.peak_simulated_balance = self.simulated_balance;
        }
        info!(
            simulated_balance = self.simulated_balance,
            peak = self.peak_simulated_balance,
            pnl = pnl,
            "Simulated ledger updated"
        );
        pnl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn losses_deduct_full_stake() {
        let mut ledger = Ledger::new(100.0);
        for _ in 0..3 {
            assert_eq!(ledger.record_trade_outcome(1.0, 0.0), -1.0);
        }
        assert_eq!(ledger.simulated_balance(), 97.0);
        assert_eq!(ledger.peak_simulated_balance(), 100.0);
        assert_eq!(ledger.losses(), 3);
        assert!((ledger.drawdown() - 0.03).abs() < 1e-12);
    }

    #[test]
    fn win_adds_net_profit_and_raises_peak() {
        let mut ledger = Ledger::new(100.0);
        let pnl = ledger.record_trade_outcome(1.0, 1.95);
        assert!((pnl - 0.95).abs() < 1e-12);
        assert!((ledger.simulated_balance() - 100.95).abs() < 1e-12);
        assert_eq!(ledger.peak_simulated_balance(), ledger.simulated_balance());
        assert_eq!(ledger.wins(), 1);
    }

    #[test]
    fn peak_survives_subsequent_losses() {
        let mut ledger = Ledger::new(100.0);
        ledger.record_trade_outcome(1.0, 3.0);
        ledger.record_trade_outcome(1.0, 0.0);
        assert_eq!(ledger.peak_simulated_balance(), 102.0);
        assert_eq!(ledger.simulated_balance(), 101.0);
    }

    #[test]
    fn authoritative_balance_is_overwritten() {
        let mut ledger = Ledger::new(100.0);
        assert_eq!(ledger.authoritative_balance(), None);
        ledger.record_authoritative_balance(50.0);
        ledger.record_authoritative_balance(42.5);
        assert_eq!(ledger.authoritative_balance(), Some(42.5));
        // the paper side is independent
        assert_eq!(ledger.simulated_balance(), 100.0);
    }
}
