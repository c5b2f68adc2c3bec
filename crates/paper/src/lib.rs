use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use common::{
    Direction, Error, ExecutionClient, InboundEvent, OutboundRequest, Result, TradeRequest,
};

/// Simulated venue parameters, the `[paper]` section of the bot config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperConfig {
    /// Net return on a winning contract (0.95 = stake * 1.95 paid out).
    pub payout_ratio: f64,
    /// Simulated account balance at startup.
    pub starting_balance: f64,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            payout_ratio: 0.95,
            starting_balance: 1_000.0,
        }
    }
}

/// A contract waiting for expiry.
#[derive(Debug, Clone)]
struct OpenContract {
    id: String,
    direction: Direction,
    stake: f64,
    entry_price: f64,
    expiry: i64,
}

/// Simulated venue for paper trading.
///
/// Contracts are opened at the latest known price and settled against the
/// live bar stream once their duration has elapsed. Results are reported back
/// as inbound events, exactly like the real venue would.
/// No request is ever sent to the real venue.
pub struct PaperClient {
    config: PaperConfig,
    /// Simulated account balance.
    balance: Arc<RwLock<f64>>,
    contracts: Arc<RwLock<Vec<OpenContract>>>,
    /// Latest (epoch, price), updated via `update_price`.
    last_price: Arc<RwLock<Option<(i64, f64)>>>,
    inbound_tx: mpsc::Sender<InboundEvent>,
}

impl PaperClient {
    pub fn new(config: PaperConfig, inbound_tx: mpsc::Sender<InboundEvent>) -> Self {
        info!(
            balance = config.starting_balance,
            payout_ratio = config.payout_ratio,
            "PaperClient initialized"
        );
        Self {
            balance: Arc::new(RwLock::new(config.starting_balance)),
            contracts: Arc::new(RwLock::new(Vec::new())),
            last_price: Arc::new(RwLock::new(None)),
            config,
            inbound_tx,
        }
    }

    pub async fn balance(&self) -> f64 {
        *self.balance.read().await
    }

    pub async fn open_contracts(&self) -> usize {
        self.contracts.read().await.len()
    }

    /// Record the latest price and settle every contract that has expired.
    pub async fn update_price(&self, epoch: i64, price: f64) {
        *self.last_price.write().await = Some((epoch, price));

        let expired: Vec<OpenContract> = {
            let mut contracts = self.contracts.write().await;
            let (expired, open): (Vec<_>, Vec<_>) =
                contracts.drain(..).partition(|c| c.expiry <= epoch);
            *contracts = open;
            expired
        };

        for contract in expired {
            let won = match contract.direction {
                Direction::Call => price > contract.entry_price,
                Direction::Put => price < contract.entry_price,
            };
            let payout = if won {
                contract.stake * (1.0 + self.config.payout_ratio)
            } else {
                0.0
            };
            *self.balance.write().await += payout;

            info!(
                id = %contract.id,
                direction = %contract.direction,
                entry = contract.entry_price,
                exit = price,
                payout = payout,
                "Paper contract settled"
            );
            self.emit(InboundEvent::TradeConfirmation {
                stake: contract.stake,
                payout,
            })
            .await;
        }
    }

    async fn open(&self, request: &TradeRequest) -> Result<()> {
        let (epoch, entry_price) = (*self.last_price.read().await).ok_or_else(|| {
            Error::Protocol(format!(
                "PaperClient has no price for '{}'. Ensure market events are flowing.",
                request.symbol
            ))
        })?;
        let duration = request.duration_secs().ok_or_else(|| {
            Error::Protocol(format!("unsupported duration unit '{}'", request.duration_unit))
        })?;

        {
            let mut balance = self.balance.write().await;
            if *balance < request.stake {
                return Err(Error::Protocol(format!(
                    "insufficient paper balance {:.2} for stake {:.2}",
                    *balance, request.stake
                )));
            }
            *balance -= request.stake;
        }

        let contract = OpenContract {
            id: request.id.clone(),
            direction: request.direction,
            stake: request.stake,
            entry_price,
            expiry: epoch + duration,
        };
        debug!(
            id = %contract.id,
            direction = %contract.direction,
            entry = entry_price,
            expiry = contract.expiry,
            "Paper contract opened"
        );
        self.contracts.write().await.push(contract);
        Ok(())
    }

    async fn emit(&self, event: InboundEvent) {
        if self.inbound_tx.send(event).await.is_err() {
            warn!("Inbound channel closed — paper event dropped");
        }
    }
}

#[async_trait]
impl ExecutionClient for PaperClient {
    async fn submit(&self, request: &OutboundRequest) -> Result<()> {
        match request {
            OutboundRequest::Trade(trade) => self.open(trade).await,
            OutboundRequest::BalanceQuery => {
                let balance = self.balance().await;
                self.emit(InboundEvent::AuthoritativeBalanceReport { balance })
                    .await;
                Ok(())
            }
        }
    }
}
