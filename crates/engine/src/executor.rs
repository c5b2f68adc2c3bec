use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use common::{ExecutionClient, OutboundRequest, TradingMode};

/// Receives outbound requests from the Engine and submits them to the venue.
///
/// This is the ONLY component that calls `ExecutionClient::submit`.
/// A failed submission is logged and abandoned; it never feeds back into the
/// core's state.
pub struct OrderExecutor {
    order_rx: mpsc::Receiver<OutboundRequest>,
    client: Arc<dyn ExecutionClient>,
    mode: TradingMode,
}

impl OrderExecutor {
    pub fn new(
        order_rx: mpsc::Receiver<OutboundRequest>,
        client: Arc<dyn ExecutionClient>,
        mode: TradingMode,
    ) -> Self {
        Self {
            order_rx,
            client,
            mode,
        }
    }

    /// Run the executor loop. Call from `tokio::spawn`.
    pub async fn run(mut self) {
        info!("OrderExecutor running in {} mode", self.mode);
        while let Some(request) = self.order_rx.recv().await {
            if let OutboundRequest::Trade(trade) = &request {
                info!(
                    id = %trade.id,
                    symbol = %trade.symbol,
                    direction = %trade.direction,
                    stake = trade.stake,
                    "Submitting trade"
                );
            }

            if let Err(e) = self.client.submit(&request).await {
                error!(request = ?request, error = %e, "Request submission failed");
            }
        }
        warn!("OrderExecutor: order channel closed");
    }
}
