use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use common::{CoreEvent, InboundEvent, OutboundRequest};

use crate::session::Session;

/// Cloneable handle passed to event producers (transport, paper venue).
#[derive(Clone)]
pub struct EngineHandle {
    inbound_tx: mpsc::Sender<InboundEvent>,
}

impl EngineHandle {
    /// Sender for inbound events.
    pub fn inbound(&self) -> mpsc::Sender<InboundEvent> {
        self.inbound_tx.clone()
    }

    pub async fn deliver(&self, event: InboundEvent) {
        if self.inbound_tx.send(event).await.is_err() {
            warn!("Engine stopped — inbound event dropped");
        }
    }
}

/// The event loop around the trading core.
///
/// Inbound events are processed strictly one at a time, each to completion,
/// so the session needs no locking. Outbound requests and core events are
/// handed off with non-blocking sends.
pub struct Engine {
    session: Session,
    inbound_rx: mpsc::Receiver<InboundEvent>,
    order_tx: mpsc::Sender<OutboundRequest>,
    core_event_tx: mpsc::Sender<CoreEvent>,
}

impl Engine {
    pub fn new(
        session: Session,
        order_tx: mpsc::Sender<OutboundRequest>,
        core_event_tx: mpsc::Sender<CoreEvent>,
    ) -> (Self, EngineHandle) {
        let (inbound_tx, inbound_rx) = mpsc::channel(1024);

        let engine = Engine {
            session,
            inbound_rx,
            order_tx,
            core_event_tx,
        };

        (engine, EngineHandle { inbound_tx })
    }

    /// Run until every inbound sender is gone or shutdown is signalled.
    /// Returns the session so its final state can be reported.
    /// Call from `tokio::spawn`.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Session {
        info!("Engine running");
        loop {
            tokio::select! {
                event = self.inbound_rx.recv() => {
                    match event {
                        Some(event) => self.process(event, Utc::now().timestamp()),
                        None => {
                            warn!("Inbound channel closed — engine exiting");
                            break;
                        }
                    }
                }
                _ = shutdown.changed() => {
                    info!("Engine stopping");
                    break;
                }
            }
        }
        self.session
    }

    fn process(&mut self, event: InboundEvent, now: i64) {
        let step = self.session.handle(event, now);

        for request in step.requests {
            match self.order_tx.try_send(request) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(request)) => {
                    error!(request = ?request, "Order queue full — request dropped");
                }
                Err(mpsc::error::TrySendError::Closed(request)) => {
                    warn!(request = ?request, "Order executor gone — request dropped");
                }
            }
        }

        for event in step.events {
            if let Err(e) = self.core_event_tx.try_send(event) {
                debug!(error = %e, "Core event not forwarded");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::RawBar;
    use risk::RiskConfig;
    use std::time::Duration;
    use strategy::StrategyConfig;

    fn make_engine() -> (
        Engine,
        EngineHandle,
        mpsc::Receiver<OutboundRequest>,
        mpsc::Receiver<CoreEvent>,
    ) {
        let (order_tx, order_rx) = mpsc::channel(8);
        let (core_event_tx, core_event_rx) = mpsc::channel(64);
        let session = Session::new(StrategyConfig::default(), RiskConfig::default());
        let (engine, handle) = Engine::new(session, order_tx, core_event_tx);
        (engine, handle, order_rx, core_event_rx)
    }

    #[tokio::test]
    async fn confirmation_produces_balance_query() {
        let (engine, handle, mut order_rx, _events) = make_engine();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(engine.run(shutdown_rx));

        handle
            .deliver(InboundEvent::TradeConfirmation {
                stake: 1.0,
                payout: 1.95,
            })
            .await;

        let request = tokio::time::timeout(Duration::from_secs(1), order_rx.recv())
            .await
            .expect("timeout")
            .expect("channel closed");
        assert_eq!(request, OutboundRequest::BalanceQuery);
    }

    #[tokio::test]
    async fn engulfing_pattern_reaches_order_queue() {
        let (engine, handle, mut order_rx, mut events) = make_engine();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(engine.run(shutdown_rx));

        handle
            .deliver(InboundEvent::AuthoritativeBalanceReport { balance: 50.0 })
            .await;
        handle
            .deliver(InboundEvent::HistoricalBars {
                records: vec![
                    RawBar::history(10.0, 10.0, 8.0, 8.0, 60),
                    RawBar::history(7.0, 11.0, 7.0, 11.0, 120),
                ],
            })
            .await;

        let request = tokio::time::timeout(Duration::from_secs(1), order_rx.recv())
            .await
            .expect("timeout")
            .expect("channel closed");
        assert!(matches!(request, OutboundRequest::Trade(ref t) if t.direction == common::Direction::Call));

        let first = events.recv().await.unwrap();
        assert_eq!(first, CoreEvent::AuthoritativeBalance { balance: 50.0 });
    }

    #[tokio::test]
    async fn shutdown_returns_session_state() {
        let (engine, handle, _orders, _events) = make_engine();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(engine.run(shutdown_rx));

        handle
            .deliver(InboundEvent::TradeConfirmation {
                stake: 1.0,
                payout: 0.0,
            })
            .await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(true).unwrap();

        let session = tokio::time::timeout(Duration::from_secs(1), join)
            .await
            .expect("timeout")
            .unwrap();
        assert_eq!(session.ledger().simulated_balance(), 99.0);
        assert_eq!(session.ledger().losses(), 1);
    }
}
