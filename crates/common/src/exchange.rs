use async_trait::async_trait;

use crate::{OutboundRequest, Result};

/// Abstraction over the venue that receives outbound requests.
///
/// `DerivClient` implements this for live trading.
/// `PaperClient` implements this for simulation.
///
/// Only `OrderExecutor` in `crates/engine` should hold a reference to a
/// `dyn ExecutionClient`. Trade requests reach it only after the Risk Gate
/// has approved them.
#[async_trait]
pub trait ExecutionClient: Send + Sync {
    /// Hand one request to the venue. Completion is reported later as an
    /// inbound event, never as a return value.
    async fn submit(&self, request: &OutboundRequest) -> Result<()>;
}
