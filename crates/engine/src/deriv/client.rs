use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use common::{Error, ExecutionClient, OutboundRequest, Result};

/// Live execution client. Hands requests to the `DerivStream` writer, which
/// owns the socket; outcomes come back through the inbound event stream.
pub struct DerivClient {
    outbound_tx: mpsc::Sender<OutboundRequest>,
}

impl DerivClient {
    pub fn new(outbound_tx: mpsc::Sender<OutboundRequest>) -> Self {
        Self { outbound_tx }
    }
}

#[async_trait]
impl ExecutionClient for DerivClient {
    async fn submit(&self, request: &OutboundRequest) -> Result<()> {
        debug!(request = ?request, "Queueing request for Deriv");
        self.outbound_tx
            .try_send(request.clone())
            .map_err(|e| Error::Transport(format!("outbound queue unavailable: {e}")))
    }
}
