//! JSON message codec for the Deriv WebSocket API.
//!
//! Every inbound frame is classified by `msg_type` into a tagged union at this
//! boundary; the core never inspects raw JSON.

use std::collections::HashMap;

use serde_json::{json, Value};

use common::{Direction, Error, InboundEvent, OutboundRequest, RawBar, Result, TradeRequest};
use strategy::StrategyConfig;

/// A decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Event for the trading core.
    Core(InboundEvent),
    /// Session authorised; carries the account balance at login.
    Authorized { loginid: String, balance: f64 },
    /// A buy was accepted; its outcome must be subscribed to.
    ContractOpened { contract_id: u64, buy_price: f64 },
    /// Open contract progress without settlement.
    ContractPending { contract_id: u64 },
    Pong,
    /// Recognised frame with nothing to act on, or an unknown `msg_type`.
    Ignored,
}

/// A decoded frame plus the `req_id` the venue echoed, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub req_id: Option<u64>,
    pub inbound: Inbound,
}

pub fn decode(text: &str) -> Result<Decoded> {
    let msg: Value = serde_json::from_str(text)?;
    let req_id = msg.get("req_id").and_then(Value::as_u64);
    let msg_type = msg
        .get("msg_type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    if let Some(error) = msg.get("error") {
        let field = |key: &str| {
            error
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        return Ok(Decoded {
            req_id,
            inbound: Inbound::Core(InboundEvent::ProtocolFailure {
                msg_type,
                code: field("code"),
                message: field("message"),
            }),
        });
    }

    let inbound = match msg_type.as_str() {
        "authorize" => {
            let body = section(&msg, "authorize")?;
            Inbound::Authorized {
                loginid: body
                    .get("loginid")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                balance: number(body, "balance")?,
            }
        }
        "balance" => Inbound::Core(InboundEvent::AuthoritativeBalanceReport {
            balance: number(section(&msg, "balance")?, "balance")?,
        }),
        "candles" => {
            let records: Vec<RawBar> = match msg.get("candles") {
                Some(candles) => serde_json::from_value(candles.clone())?,
                None => Vec::new(),
            };
            Inbound::Core(InboundEvent::HistoricalBars { records })
        }
        "ohlc" => {
            let raw: RawBar = serde_json::from_value(section(&msg, "ohlc")?.clone())?;
            Inbound::Core(InboundEvent::IncrementalBarUpdate(raw))
        }
        "buy" => {
            let body = section(&msg, "buy")?;
            Inbound::ContractOpened {
                contract_id: contract_id(body)?,
                buy_price: number(body, "buy_price")?,
            }
        }
        "proposal_open_contract" => {
            let body = section(&msg, "proposal_open_contract")?;
            // the final frame of a finished subscription carries an empty body
            if body.as_object().map_or(true, |o| o.is_empty()) {
                Inbound::Ignored
            } else if body.get("is_sold").and_then(Value::as_u64) == Some(1) {
                Inbound::Core(InboundEvent::TradeConfirmation {
                    stake: number(body, "buy_price")?,
                    payout: number(body, "sell_price")?.max(0.0),
                })
            } else {
                Inbound::ContractPending {
                    contract_id: contract_id(body)?,
                }
            }
        }
        "ping" => Inbound::Pong,
        _ => Inbound::Ignored,
    };

    Ok(Decoded { req_id, inbound })
}

fn section<'a>(msg: &'a Value, key: &str) -> Result<&'a Value> {
    msg.get(key)
        .ok_or_else(|| Error::Protocol(format!("'{key}' frame without '{key}' body")))
}

/// Numeric field that may be sent as a number or a numeric string.
fn number(body: &Value, key: &str) -> Result<f64> {
    let value = match body.get(key) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    value
        .filter(|v| v.is_finite())
        .ok_or_else(|| Error::Protocol(format!("missing or non-numeric '{key}'")))
}

fn contract_id(body: &Value) -> Result<u64> {
    body.get("contract_id")
        .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
        .ok_or_else(|| Error::Protocol("missing 'contract_id'".into()))
}

// ─── Outbound ────────────────────────────────────────────────────────────────

pub fn encode(request: &OutboundRequest, req_id: u64) -> Value {
    match request {
        OutboundRequest::Trade(trade) => buy(trade, req_id),
        OutboundRequest::BalanceQuery => json!({ "balance": 1, "req_id": req_id }),
    }
}

fn buy(trade: &TradeRequest, req_id: u64) -> Value {
    let contract_type = match trade.direction {
        Direction::Call => "CALL",
        Direction::Put => "PUT",
    };
    json!({
        "buy": 1,
        "price": trade.stake,
        "parameters": {
            "amount": trade.stake,
            "basis": "stake",
            "contract_type": contract_type,
            "currency": trade.currency,
            "duration": trade.duration,
            "duration_unit": trade.duration_unit,
            "symbol": trade.symbol,
        },
        "passthrough": { "request_id": trade.id },
        "req_id": req_id,
    })
}

pub fn authorize(token: &str, req_id: u64) -> Value {
    json!({ "authorize": token, "req_id": req_id })
}

/// History of `max_series_len` candles followed by a live `ohlc` stream.
pub fn subscribe_candles(strategy: &StrategyConfig, req_id: u64) -> Value {
    json!({
        "ticks_history": strategy.symbol,
        "adjust_start_time": 1,
        "count": strategy.max_series_len,
        "end": "latest",
        "granularity": strategy.granularity_secs,
        "style": "candles",
        "subscribe": 1,
        "req_id": req_id,
    })
}

pub fn subscribe_contract(contract_id: u64, req_id: u64) -> Value {
    json!({
        "proposal_open_contract": 1,
        "contract_id": contract_id,
        "subscribe": 1,
        "req_id": req_id,
    })
}

pub fn ping(req_id: u64) -> Value {
    json!({ "ping": 1, "req_id": req_id })
}

/// Correlates responses with the requests that caused them.
#[derive(Debug, Default)]
pub struct RequestTracker {
    next_id: u64,
    pending: HashMap<u64, &'static str>,
}

impl RequestTracker {
    /// Allocate a `req_id` for a request of the given kind.
    pub fn issue(&mut self, kind: &'static str) -> u64 {
        self.next_id += 1;
        self.pending.insert(self.next_id, kind);
        self.next_id
    }

    /// Kind of the request a response answers. Subscriptions keep their
    /// entry so later stream frames still resolve.
    pub fn kind(&self, req_id: u64) -> Option<&'static str> {
        self.pending.get(&req_id).copied()
    }

    pub fn complete(&mut self, req_id: u64) -> Option<&'static str> {
        self.pending.remove(&req_id)
    }

    pub fn outstanding(&self) -> usize {
        self.pending.len()
    }

    /// Forget everything; request ids are not valid across sessions.
    pub fn reset(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_ohlc_with_string_prices() {
        let text = r#"{"msg_type":"ohlc","ohlc":{"open":"100.10","high":"101.00","low":"99.90",
            "close":"100.50","epoch":1700000030,"open_time":1700000000,"granularity":60,
            "symbol":"R_100"},"subscription":{"id":"abc"}}"#;
        let decoded = decode(text).unwrap();
        match decoded.inbound {
            Inbound::Core(InboundEvent::IncrementalBarUpdate(raw)) => {
                let bar = common::Bar::from_update(&raw).unwrap();
                assert_eq!(bar.open_time, 1_700_000_000);
                assert_eq!(bar.close, 100.5);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn decodes_candle_history() {
        let text = r#"{"msg_type":"candles","req_id":3,"candles":[
            {"open":1.0,"high":2.0,"low":0.5,"close":1.5,"epoch":60},
            {"open":1.5,"high":2.5,"low":1.0,"close":2.0,"epoch":120}]}"#;
        let decoded = decode(text).unwrap();
        assert_eq!(decoded.req_id, Some(3));
        match decoded.inbound {
            Inbound::Core(InboundEvent::HistoricalBars { records }) => {
                assert_eq!(records.len(), 2);
                assert_eq!(records[1], RawBar::history(1.5, 2.5, 1.0, 2.0, 120));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn candle_with_bad_field_still_decodes() {
        // validation happens per record in the aggregator, not here
        let text = r#"{"msg_type":"candles","candles":[{"open":"x","high":2.0,"low":0.5,"close":1.5,"epoch":60}]}"#;
        assert!(matches!(
            decode(text).unwrap().inbound,
            Inbound::Core(InboundEvent::HistoricalBars { .. })
        ));
    }

    #[test]
    fn decodes_balance_and_authorize() {
        let decoded = decode(r#"{"msg_type":"balance","balance":{"balance":"9876.5","currency":"USD"}}"#).unwrap();
        assert_eq!(
            decoded.inbound,
            Inbound::Core(InboundEvent::AuthoritativeBalanceReport { balance: 9876.5 })
        );

        let decoded = decode(r#"{"msg_type":"authorize","authorize":{"loginid":"CR1","balance":10}}"#).unwrap();
        assert_eq!(
            decoded.inbound,
            Inbound::Authorized {
                loginid: "CR1".into(),
                balance: 10.0
            }
        );
    }

    #[test]
    fn decodes_contract_lifecycle() {
        let opened = decode(r#"{"msg_type":"buy","buy":{"contract_id":42,"buy_price":1,"payout":1.95}}"#).unwrap();
        assert_eq!(
            opened.inbound,
            Inbound::ContractOpened {
                contract_id: 42,
                buy_price: 1.0
            }
        );

        let pending = decode(r#"{"msg_type":"proposal_open_contract","proposal_open_contract":{"contract_id":42,"is_sold":0,"buy_price":1}}"#).unwrap();
        assert_eq!(pending.inbound, Inbound::ContractPending { contract_id: 42 });

        let lost = decode(r#"{"msg_type":"proposal_open_contract","proposal_open_contract":{"contract_id":42,"is_sold":1,"buy_price":1,"sell_price":0,"status":"lost"}}"#).unwrap();
        assert_eq!(
            lost.inbound,
            Inbound::Core(InboundEvent::TradeConfirmation {
                stake: 1.0,
                payout: 0.0
            })
        );

        let won = decode(r#"{"msg_type":"proposal_open_contract","proposal_open_contract":{"contract_id":42,"is_sold":1,"buy_price":1,"sell_price":"1.95"}}"#).unwrap();
        assert_eq!(
            won.inbound,
            Inbound::Core(InboundEvent::TradeConfirmation {
                stake: 1.0,
                payout: 1.95
            })
        );
    }

    #[test]
    fn non_finite_prices_are_rejected() {
        for price in [r#""NaN""#, r#""inf""#, r#""-infinity""#] {
            let text = format!(
                r#"{{"msg_type":"proposal_open_contract","proposal_open_contract":{{"contract_id":42,"is_sold":1,"buy_price":{price},"sell_price":0}}}}"#
            );
            assert!(matches!(decode(&text), Err(Error::Protocol(_))), "{price} accepted");
        }
        assert!(matches!(
            decode(r#"{"msg_type":"balance","balance":{"balance":"NaN"}}"#),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn error_frames_become_protocol_failures() {
        let text = r#"{"msg_type":"buy","req_id":7,"error":{"code":"InsufficientBalance","message":"Not enough"}}"#;
        let decoded = decode(text).unwrap();
        assert_eq!(decoded.req_id, Some(7));
        assert_eq!(
            decoded.inbound,
            Inbound::Core(InboundEvent::ProtocolFailure {
                msg_type: "buy".into(),
                code: "InsufficientBalance".into(),
                message: "Not enough".into(),
            })
        );
    }

    #[test]
    fn unknown_and_malformed_frames() {
        assert_eq!(decode(r#"{"msg_type":"tick","tick":{}}"#).unwrap().inbound, Inbound::Ignored);
        assert!(matches!(decode("not json"), Err(Error::Json(_))));
        assert!(matches!(decode(r#"{"msg_type":"balance"}"#), Err(Error::Protocol(_))));
    }

    #[test]
    fn encodes_trade_as_buy() {
        let trade = TradeRequest::new("R_100", Direction::Put, 1.0, 5, "m", "USD", 0);
        let value = encode(&OutboundRequest::Trade(trade.clone()), 9);
        assert_eq!(value["buy"], 1);
        assert_eq!(value["req_id"], 9);
        assert_eq!(value["parameters"]["contract_type"], "PUT");
        assert_eq!(value["parameters"]["symbol"], "R_100");
        assert_eq!(value["parameters"]["duration"], 5);
        assert_eq!(value["parameters"]["duration_unit"], "m");
        assert_eq!(value["passthrough"]["request_id"], trade.id.as_str());

        let value = encode(&OutboundRequest::BalanceQuery, 10);
        assert_eq!(value, json!({ "balance": 1, "req_id": 10 }));
    }

    #[test]
    fn candle_subscription_uses_strategy_parameters() {
        let value = subscribe_candles(&StrategyConfig::default(), 1);
        assert_eq!(value["ticks_history"], "R_100");
        assert_eq!(value["granularity"], 60);
        assert_eq!(value["count"], 200);
        assert_eq!(value["style"], "candles");
        assert_eq!(value["subscribe"], 1);
    }

    #[test]
    fn tracker_correlates_requests() {
        let mut tracker = RequestTracker::default();
        let a = tracker.issue("authorize");
        let b = tracker.issue("buy");
        assert_ne!(a, b);
        assert_eq!(tracker.kind(b), Some("buy"));
        assert_eq!(tracker.complete(a), Some("authorize"));
        assert_eq!(tracker.outstanding(), 1);
        tracker.reset();
        assert_eq!(tracker.kind(b), None);
    }
}
