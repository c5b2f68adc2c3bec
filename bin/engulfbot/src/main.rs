mod settings;

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use common::{Bar, Config, CoreEvent, ExecutionClient, InboundEvent, OutboundRequest, TradingMode};
use engine::{BackoffPolicy, DerivClient, DerivStream, Engine, OrderExecutor, Session};
use paper::PaperClient;
use settings::BotSettings;

#[tokio::main]
async fn main() {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env().unwrap_or_else(|e| panic!("{e}"));
    let settings = BotSettings::load(&cfg.bot_config_path).unwrap_or_else(|e| panic!("{e}"));
    info!(
        mode = %cfg.trading_mode,
        symbol = %settings.strategy.symbol,
        granularity = settings.strategy.granularity_secs,
        "EngulfBot starting"
    );

    // ── Channels ──────────────────────────────────────────────────────────────
    let (order_tx, order_rx) = mpsc::channel::<OutboundRequest>(64);
    let (core_event_tx, mut core_event_rx) = mpsc::channel::<CoreEvent>(256);
    let (outbound_tx, outbound_rx) = mpsc::channel::<OutboundRequest>(64);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Engine ────────────────────────────────────────────────────────────────
    let session = Session::new(settings.strategy.clone(), settings.risk.clone());
    let (engine, engine_handle) = Engine::new(session, order_tx, core_event_tx);

    // ── Execution client (injected based on TRADING_MODE) ─────────────────────
    // In paper mode the stream feeds a tap that prices the simulated venue
    // before forwarding to the engine.
    let (client, stream_tx, api_token): (Arc<dyn ExecutionClient>, _, _) = match cfg.trading_mode {
        TradingMode::Live => {
            info!("Live trading mode — using DerivClient");
            (
                Arc::new(DerivClient::new(outbound_tx)),
                engine_handle.inbound(),
                cfg.api_token.clone(),
            )
        }
        TradingMode::Paper => {
            info!(
                balance = settings.paper.starting_balance,
                payout_ratio = settings.paper.payout_ratio,
                "Paper trading mode — using PaperClient"
            );
            drop(outbound_tx);
            let paper = Arc::new(PaperClient::new(settings.paper.clone(), engine_handle.inbound()));
            if let Err(e) = paper.submit(&OutboundRequest::BalanceQuery).await {
                warn!(error = %e, "Initial paper balance report failed");
            }

            let (tap_tx, mut tap_rx) = mpsc::channel::<InboundEvent>(1024);
            let tap_paper = paper.clone();
            let tap_handle = engine_handle.clone();
            tokio::spawn(async move {
                while let Some(event) = tap_rx.recv().await {
                    if let InboundEvent::IncrementalBarUpdate(raw) = &event {
                        if let Ok(bar) = Bar::from_update(raw) {
                            tap_paper.update_price(bar.last_update_time, bar.close).await;
                        }
                    }
                    tap_handle.deliver(event).await;
                }
            });
            (paper as Arc<dyn ExecutionClient>, tap_tx, None)
        }
    };

    // ── Transport ─────────────────────────────────────────────────────────────
    let stream = DerivStream::new(
        cfg.endpoint(),
        api_token,
        settings.strategy.clone(),
        BackoffPolicy::default(),
        stream_tx,
        outbound_rx,
    );

    // ── Order executor ────────────────────────────────────────────────────────
    let executor = OrderExecutor::new(order_rx, client, cfg.trading_mode);

    // ── Core event forwarder (observability) ──────────────────────────────────
    tokio::spawn(async move {
        while let Some(event) = core_event_rx.recv().await {
            log_core_event(&event);
        }
    });

    // ── Spawn all tasks ───────────────────────────────────────────────────────
    let engine_task = tokio::spawn(engine.run(shutdown_rx.clone()));
    tokio::spawn(executor.run());
    let stream_task = tokio::spawn(stream.run(shutdown_rx));

    info!("All subsystems started. Waiting for shutdown signal.");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received.");
    let _ = shutdown_tx.send(true);
    let _ = stream_task.await;

    match engine_task.await {
        Ok(session) => {
            let ledger = session.ledger();
            info!(
                simulated_balance = ledger.simulated_balance(),
                peak = ledger.peak_simulated_balance(),
                wins = ledger.wins(),
                losses = ledger.losses(),
                venue_balance = ?ledger.authoritative_balance(),
                "Final ledger"
            );
        }
        Err(e) => error!(error = %e, "Engine task failed"),
    }
}

fn log_core_event(event: &CoreEvent) {
    match event {
        CoreEvent::HistoryLoaded { bars, rejected } => {
            info!(bars = bars, rejected = rejected, "History loaded")
        }
        CoreEvent::BarFinalized { bar, series_len } => info!(
            open_time = bar.open_time,
            opened_at = ?bar.opened_at(),
            open = bar.open,
            high = bar.high,
            low = bar.low,
            close = bar.close,
            series_len = series_len,
            "Bar finalized"
        ),
        CoreEvent::UpdateRejected { reason } => warn!(reason = %reason, "Bar update rejected"),
        CoreEvent::SignalDetected { signal, at } => {
            info!(signal = %signal, at = at, "Signal detected")
        }
        CoreEvent::GuardSkipped { reason, at } if reason.is_operational_error() => {
            error!(reason = %reason, at = at, "Evaluation skipped")
        }
        CoreEvent::GuardSkipped { reason, at } => {
            info!(reason = %reason, at = at, "Evaluation skipped")
        }
        CoreEvent::TradeRequested { request } => info!(
            id = %request.id,
            direction = %request.direction,
            stake = request.stake,
            duration = request.duration,
            unit = %request.duration_unit,
            "Trade requested"
        ),
        CoreEvent::LedgerUpdated {
            stake,
            payout,
            simulated_balance,
            peak_balance,
        } => info!(
            stake = stake,
            payout = payout,
            simulated_balance = simulated_balance,
            peak = peak_balance,
            "Ledger updated"
        ),
        CoreEvent::AuthoritativeBalance { balance } => {
            info!(balance = balance, "Venue balance")
        }
        CoreEvent::ProtocolFailure {
            msg_type,
            code,
            message,
        } => error!(msg_type = %msg_type, code = %code, "Protocol failure: {message}"),
    }
}
