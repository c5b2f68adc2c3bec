use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use url::Url;

use common::{Error, InboundEvent, OutboundRequest, Result};
use strategy::StrategyConfig;

use super::protocol::{self, Inbound, RequestTracker};

const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Reconnect delay policy: exponential growth from `initial`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub factor: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(60),
            factor: 2,
        }
    }
}

impl BackoffPolicy {
    pub fn next(&self, current: Duration) -> Duration {
        current.saturating_mul(self.factor).min(self.max)
    }
}

/// How one connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// The venue closed the socket; reconnect.
    Closed,
    /// The engine dropped its inbound receiver; stop for good.
    EngineGone,
}

/// Deriv WebSocket session for a single instrument.
///
/// Authorises (when a token is configured), subscribes to the candle stream,
/// relays decoded events to the engine and writes outbound requests.
/// Reconnects with exponential backoff until shutdown is signalled; each new
/// session starts with a fresh history load.
pub struct DerivStream {
    endpoint: String,
    api_token: Option<String>,
    strategy: StrategyConfig,
    backoff: BackoffPolicy,
    inbound_tx: mpsc::Sender<InboundEvent>,
    outbound_rx: mpsc::Receiver<OutboundRequest>,
    outbound_open: bool,
    tracker: RequestTracker,
}

impl DerivStream {
    pub fn new(
        endpoint: impl Into<String>,
        api_token: Option<String>,
        strategy: StrategyConfig,
        backoff: BackoffPolicy,
        inbound_tx: mpsc::Sender<InboundEvent>,
        outbound_rx: mpsc::Receiver<OutboundRequest>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_token,
            strategy,
            backoff,
            inbound_tx,
            outbound_rx,
            outbound_open: true,
            tracker: RequestTracker::default(),
        }
    }

    /// Run the stream loop until shutdown, reconnecting on failure.
    /// Call this inside a `tokio::spawn`.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut backoff = self.backoff.initial;

        loop {
            if *shutdown.borrow() {
                break;
            }
            info!(symbol = %self.strategy.symbol, "Connecting to Deriv WebSocket");
            self.tracker.reset();

            let result = tokio::select! {
                r = self.connect_once() => r,
                _ = shutdown.changed() => break,
            };

            let delay = match result {
                Ok(SessionEnd::EngineGone) => {
                    warn!("Inbound channel closed — stopping Deriv stream");
                    return;
                }
                Ok(SessionEnd::Closed) => {
                    info!("WebSocket stream closed cleanly");
                    backoff = self.backoff.initial;
                    self.backoff.initial
                }
                Err(e) => {
                    warn!(error = %e, backoff = ?backoff, "WebSocket error, reconnecting");
                    let delay = backoff;
                    backoff = self.backoff.next(backoff);
                    delay
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => break,
            }
            self.discard_stale_requests();
        }
        info!("Deriv stream shut down");
    }

    /// Requests queued while disconnected belong to a dead session.
    fn discard_stale_requests(&mut self) {
        while let Ok(request) = self.outbound_rx.try_recv() {
            warn!(request = ?request, "Dropping request queued while disconnected");
        }
    }

    async fn connect_once(&mut self) -> Result<SessionEnd> {
        let url = Url::parse(&self.endpoint).map_err(|e| Error::Transport(e.to_string()))?;
        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        info!("WebSocket connected");

        let (mut write, mut read) = ws_stream.split();

        match self.api_token.clone() {
            Some(token) => {
                let req_id = self.tracker.issue("authorize");
                send(&mut write, protocol::authorize(&token, req_id)).await?;
            }
            None => self.subscribe_market(&mut write).await?,
        }

        let mut ping = tokio::time::interval(PING_INTERVAL);
        ping.tick().await;

        loop {
            tokio::select! {
                msg = read.next() => {
                    let msg = match msg {
                        Some(msg) => msg.map_err(|e| Error::Transport(e.to_string()))?,
                        None => return Ok(SessionEnd::Closed),
                    };
                    match msg {
                        Message::Text(text) => {
                            if let Some(end) = self.handle_text(&text, &mut write).await? {
                                return Ok(end);
                            }
                        }
                        Message::Close(frame) => {
                            info!(frame = ?frame, "Server closed the WebSocket");
                            return Ok(SessionEnd::Closed);
                        }
                        _ => {}
                    }
                }

                request = self.outbound_rx.recv(), if self.outbound_open => {
                    match request {
                        Some(request) => {
                            let kind = match request {
                                OutboundRequest::Trade(_) => "buy",
                                OutboundRequest::BalanceQuery => "balance",
                            };
                            let req_id = self.tracker.issue(kind);
                            debug!(req_id = req_id, kind = kind, "Sending request");
                            send(&mut write, protocol::encode(&request, req_id)).await?;
                        }
                        None => {
                            debug!("Outbound channel closed — stream is read-only");
                            self.outbound_open = false;
                        }
                    }
                }

                _ = ping.tick() => {
                    let req_id = self.tracker.issue("ping");
                    send(&mut write, protocol::ping(req_id)).await?;
                }
            }
        }
    }

    async fn subscribe_market<S>(&mut self, write: &mut S) -> Result<()>
    where
        S: Sink<Message> + Unpin,
        S::Error: std::fmt::Display,
    {
        let req_id = self.tracker.issue("ticks_history");
        send(write, protocol::subscribe_candles(&self.strategy, req_id)).await
    }

    /// Returns `Some` when the session must end.
    async fn handle_text<S>(&mut self, text: &str, write: &mut S) -> Result<Option<SessionEnd>>
    where
        S: Sink<Message> + Unpin,
        S::Error: std::fmt::Display,
    {
        let decoded = match protocol::decode(text) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(error = %e, "Failed to decode frame");
                return Ok(None);
            }
        };
        let kind = decoded.req_id.and_then(|id| self.tracker.kind(id));

        let event = match decoded.inbound {
            Inbound::Core(InboundEvent::ProtocolFailure {
                msg_type,
                code,
                message,
            }) => {
                error!(
                    req_id = ?decoded.req_id,
                    request = kind.unwrap_or("unknown"),
                    code = %code,
                    "Venue error: {message}"
                );
                self.complete(decoded.req_id);
                if kind == Some("authorize") || msg_type == "authorize" {
                    return Err(Error::Protocol(format!("authorization rejected: {message}")));
                }
                InboundEvent::ProtocolFailure {
                    msg_type,
                    code,
                    message,
                }
            }
            Inbound::Core(event @ InboundEvent::TradeConfirmation { .. }) => {
                // settled; the contract subscription is finished
                self.complete(decoded.req_id);
                event
            }
            Inbound::Core(event) => event,
            Inbound::Authorized { loginid, balance } => {
                info!(loginid = %loginid, balance = balance, "Authorized");
                self.complete(decoded.req_id);
                self.subscribe_market(write).await?;
                InboundEvent::AuthoritativeBalanceReport { balance }
            }
            Inbound::ContractOpened {
                contract_id,
                buy_price,
            } => {
                info!(contract_id = contract_id, buy_price = buy_price, "Contract opened");
                self.complete(decoded.req_id);
                let req_id = self.tracker.issue("proposal_open_contract");
                send(write, protocol::subscribe_contract(contract_id, req_id)).await?;
                return Ok(None);
            }
            Inbound::ContractPending { contract_id } => {
                debug!(contract_id = contract_id, "Contract still open");
                return Ok(None);
            }
            Inbound::Pong => {
                self.complete(decoded.req_id);
                return Ok(None);
            }
            Inbound::Ignored => return Ok(None),
        };

        if matches!(kind, Some("balance")) {
            self.complete(decoded.req_id);
        }

        if self.inbound_tx.send(event).await.is_err() {
            return Ok(Some(SessionEnd::EngineGone));
        }
        Ok(None)
    }

    fn complete(&mut self, req_id: Option<u64>) {
        if let Some(id) = req_id {
            self.tracker.complete(id);
        }
    }
}

async fn send<S>(write: &mut S, value: Value) -> Result<()>
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    write
        .send(Message::Text(value.to_string()))
        .await
        .map_err(|e| Error::Transport(e.to_string()))
}
