use tracing::{debug, info, warn};

use common::{CoreEvent, Direction, InboundEvent, OutboundRequest, Signal, TradeRequest};
use risk::{Decision, Ledger, RiskConfig, RiskGate};
use strategy::{BarAggregator, BarUpdate, EngulfingDetector, PatternDetector, StrategyConfig};

/// Everything one inbound event produced.
#[derive(Debug, Default)]
pub struct Step {
    /// Requests for the execution collaborator, in emission order.
    pub requests: Vec<OutboundRequest>,
    /// Structured events for the observability collaborator.
    pub events: Vec<CoreEvent>,
}

/// The trading core: bar series, ledger and scheduler state for one instrument.
///
/// All state lives here and is mutated only through `handle`, one event at a
/// time. Nothing in the core is shared or global.
pub struct Session {
    strategy: StrategyConfig,
    aggregator: BarAggregator,
    ledger: Ledger,
    gate: RiskGate,
    detector: Box<dyn PatternDetector>,
}

impl Session {
    pub fn new(strategy: StrategyConfig, risk: RiskConfig) -> Self {
        Self::with_detector(strategy, risk, Box::new(EngulfingDetector))
    }

    pub fn with_detector(
        strategy: StrategyConfig,
        risk: RiskConfig,
        detector: Box<dyn PatternDetector>,
    ) -> Self {
        Self {
            aggregator: BarAggregator::new(strategy.max_series_len),
            ledger: Ledger::new(risk.paper_balance),
            gate: RiskGate::new(risk),
            strategy,
            detector,
        }
    }

    pub fn aggregator(&self) -> &BarAggregator {
        &self.aggregator
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn gate(&self) -> &RiskGate {
        &self.gate
    }

    /// Apply one inbound event at clock reading `now` (epoch seconds).
    pub fn handle(&mut self, event: InboundEvent, now: i64) -> Step {
        let mut step = Step::default();

        match event {
            InboundEvent::AuthoritativeBalanceReport { balance } if !balance.is_finite() => {
                warn!(balance = balance, "Dropping non-numeric balance report");
                step.events.push(CoreEvent::UpdateRejected {
                    reason: format!("balance report is not a finite number: {balance}"),
                });
            }

            InboundEvent::AuthoritativeBalanceReport { balance } => {
                self.ledger.record_authoritative_balance(balance);
                debug!(balance = balance, "Authoritative balance recorded");
                step.events.push(CoreEvent::AuthoritativeBalance { balance });
            }

            InboundEvent::HistoricalBars { records } => {
                let load = self.aggregator.load_history(&records);
                for error in &load.rejected {
                    step.events.push(CoreEvent::UpdateRejected {
                        reason: error.to_string(),
                    });
                }
                info!(
                    bars = self.aggregator.series().len(),
                    rejected = load.rejected.len(),
                    "History loaded"
                );
                step.events.push(CoreEvent::HistoryLoaded {
                    bars: self.aggregator.series().len(),
                    rejected: load.rejected.len(),
                });
                self.evaluate(now, &mut step);
            }

            InboundEvent::IncrementalBarUpdate(raw) => match self.aggregator.apply_update(&raw) {
                Ok(BarUpdate::Closed(bar)) => {
                    step.events.push(CoreEvent::BarFinalized {
                        bar,
                        series_len: self.aggregator.series().len(),
                    });
                    self.evaluate(now, &mut step);
                }
                Ok(BarUpdate::Stale) => {
                    step.events.push(CoreEvent::UpdateRejected {
                        reason: "stale update older than current bar".into(),
                    });
                }
                Ok(BarUpdate::Started | BarUpdate::Merged | BarUpdate::Resumed) => {}
                Err(e) => {
                    warn!(error = %e, "Dropping bar update");
                    step.events.push(CoreEvent::UpdateRejected {
                        reason: e.to_string(),
                    });
                }
            },

            InboundEvent::TradeConfirmation { stake, payout }
                if !(stake.is_finite() && payout.is_finite()) =>
            {
                warn!(stake = stake, payout = payout, "Dropping non-numeric trade confirmation");
                step.events.push(CoreEvent::UpdateRejected {
                    reason: format!(
                        "trade confirmation is not finite: stake {stake}, payout {payout}"
                    ),
                });
            }

            InboundEvent::TradeConfirmation { stake, payout } => {
                self.ledger.record_trade_outcome(stake, payout);
                step.events.push(CoreEvent::LedgerUpdated {
                    stake,
                    payout,
                    simulated_balance: self.ledger.simulated_balance(),
                    peak_balance: self.ledger.peak_simulated_balance(),
                });
                step.requests.push(OutboundRequest::BalanceQuery);
            }

            InboundEvent::ProtocolFailure {
                msg_type,
                code,
                message,
            } => {
                warn!(msg_type = %msg_type, code = %code, "Venue rejected request: {message}");
                step.events.push(CoreEvent::ProtocolFailure {
                    msg_type,
                    code,
                    message,
                });
            }
        }

        step
    }

    /// One evaluation cycle, run after every bar close and history load.
    fn evaluate(&mut self, now: i64, step: &mut Step) {
        let decision = self.gate.evaluate(
            now,
            &self.ledger,
            self.aggregator.series(),
            self.detector.as_ref(),
        );

        match decision {
            Decision::Skip(reason) => {
                step.events.push(CoreEvent::GuardSkipped { reason, at: now });
            }
            Decision::NoSignal => {}
            Decision::Trade(direction) => {
                let signal = match direction {
                    Direction::Call => Signal::Call,
                    Direction::Put => Signal::Put,
                };
                step.events.push(CoreEvent::SignalDetected { signal, at: now });

                let request = TradeRequest::new(
                    &self.strategy.symbol,
                    direction,
                    self.gate.config().stake,
                    self.strategy.contract_duration,
                    &self.strategy.duration_unit,
                    &self.strategy.currency,
                    now,
                );
                info!(
                    id = %request.id,
                    symbol = %request.symbol,
                    direction = %request.direction,
                    stake = request.stake,
                    "Trade request emitted"
                );
                step.events.push(CoreEvent::TradeRequested {
                    request: request.clone(),
                });
                step.requests.push(OutboundRequest::Trade(request));
            }
        }
    }
}
