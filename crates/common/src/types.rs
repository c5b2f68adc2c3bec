use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// An OHLC record exactly as the venue delivered it.
///
/// Fields stay untyped until validation so that one malformed record can be
/// rejected on its own instead of failing the whole message. Numbers may
/// arrive either as JSON numbers or as numeric strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawBar {
    #[serde(default)]
    pub open: Option<Value>,
    #[serde(default)]
    pub high: Option<Value>,
    #[serde(default)]
    pub low: Option<Value>,
    #[serde(default)]
    pub close: Option<Value>,
    #[serde(default)]
    pub epoch: Option<Value>,
    /// Only present on incremental updates. Historical records are keyed by `epoch`.
    #[serde(default)]
    pub open_time: Option<Value>,
}

impl RawBar {
    /// Incremental update record.
    pub fn update(open: f64, high: f64, low: f64, close: f64, epoch: i64, open_time: i64) -> Self {
        Self {
            open: Some(Value::from(open)),
            high: Some(Value::from(high)),
            low: Some(Value::from(low)),
            close: Some(Value::from(close)),
            epoch: Some(Value::from(epoch)),
            open_time: Some(Value::from(open_time)),
        }
    }

    /// Historical record; `epoch` is the bucket's open time.
    pub fn history(open: f64, high: f64, low: f64, close: f64, epoch: i64) -> Self {
        Self {
            open_time: None,
            ..Self::update(open, high, low, close, epoch, 0)
        }
    }
}

fn number(field: &Option<Value>, name: &str) -> Result<f64> {
    let value = match field {
        None | Some(Value::Null) => {
            return Err(Error::Validation(format!("missing field '{name}'")))
        }
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };
    value
        .filter(|v| v.is_finite())
        .ok_or_else(|| Error::Validation(format!("field '{name}' is not numeric")))
}

fn timestamp(field: &Option<Value>, name: &str) -> Result<i64> {
    let value = number(field, name)?;
    if value.fract() != 0.0 {
        return Err(Error::Validation(format!(
            "field '{name}' is not an integer timestamp: {value}"
        )));
    }
    Ok(value as i64)
}

/// A candle: open/high/low/close over one fixed time bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Start of the bucket, epoch seconds. Stable for the bar's lifetime.
    pub open_time: i64,
    /// Epoch seconds of the latest update folded into this bar.
    pub last_update_time: i64,
}

impl Bar {
    /// Build a bar from an incremental update. Requires `epoch` and `open_time`.
    pub fn from_update(raw: &RawBar) -> Result<Self> {
        let open_time = timestamp(&raw.open_time, "open_time")?;
        let epoch = timestamp(&raw.epoch, "epoch")?;
        Self::from_parts(raw, open_time, epoch)
    }

    /// Build a bar from a historical record, whose `epoch` is the open time.
    pub fn from_history(raw: &RawBar) -> Result<Self> {
        let epoch = timestamp(&raw.epoch, "epoch")?;
        Self::from_parts(raw, epoch, epoch)
    }

    fn from_parts(raw: &RawBar, open_time: i64, last_update_time: i64) -> Result<Self> {
        let bar = Self {
            open: number(&raw.open, "open")?,
            high: number(&raw.high, "high")?,
            low: number(&raw.low, "low")?,
            close: number(&raw.close, "close")?,
            open_time,
            last_update_time,
        };
        if !bar.is_sane() {
            return Err(Error::Validation(format!(
                "inconsistent OHLC at {open_time}: o={} h={} l={} c={}",
                bar.open, bar.high, bar.low, bar.close
            )));
        }
        if last_update_time < open_time {
            return Err(Error::Validation(format!(
                "update epoch {last_update_time} precedes bar open time {open_time}"
            )));
        }
        Ok(bar)
    }

    /// OHLC envelope check: high bounds everything from above, low from below.
    pub fn is_sane(&self) -> bool {
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
    }

    /// Fold a later update for the same bucket into this bar.
    pub fn merge(&mut self, update: &Bar) {
        debug_assert_eq!(self.open_time, update.open_time);
        self.high = self.high.max(update.high);
        self.low = self.low.min(update.low);
        self.close = update.close;
        self.last_update_time = update.last_update_time;
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.open > self.close
    }

    /// `None` when `open_time` is outside chrono's representable range.
    pub fn opened_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.open_time, 0).single()
    }
}

/// Contract direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Call,
    Put,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Call => write!(f, "CALL"),
            Direction::Put => write!(f, "PUT"),
        }
    }
}

/// Output of the Pattern Detector. Transient, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    Call,
    Put,
    /// No pattern, or fewer than two completed bars.
    Neutral,
}

impl Signal {
    pub fn direction(&self) -> Option<Direction> {
        match self {
            Signal::Call => Some(Direction::Call),
            Signal::Put => Some(Direction::Put),
            Signal::Neutral => None,
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Signal::Call => write!(f, "call"),
            Signal::Put => write!(f, "put"),
            Signal::Neutral => write!(f, "neutral"),
        }
    }
}

/// A fixed-stake, fixed-duration contract purchase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRequest {
    pub id: String,
    pub symbol: String,
    pub direction: Direction,
    pub stake: f64,
    pub duration: u32,
    pub duration_unit: String,
    pub currency: String,
    /// Clock reading at which the Risk Gate approved the request.
    pub requested_at: i64,
}

impl TradeRequest {
    pub fn new(
        symbol: impl Into<String>,
        direction: Direction,
        stake: f64,
        duration: u32,
        duration_unit: impl Into<String>,
        currency: impl Into<String>,
        requested_at: i64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            symbol: symbol.into(),
            direction,
            stake,
            duration,
            duration_unit: duration_unit.into(),
            currency: currency.into(),
            requested_at,
        }
    }

    /// Contract lifetime in seconds. Ticks count as one second each.
    pub fn duration_secs(&self) -> Option<i64> {
        let unit = match self.duration_unit.as_str() {
            "t" | "s" => 1,
            "m" => 60,
            "h" => 3_600,
            "d" => 86_400,
            _ => return None,
        };
        Some(i64::from(self.duration) * unit)
    }
}

/// Requests the core hands to the execution collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OutboundRequest {
    Trade(TradeRequest),
    BalanceQuery,
}

/// Inbound events, already decoded at the transport boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InboundEvent {
    AuthoritativeBalanceReport { balance: f64 },
    HistoricalBars { records: Vec<RawBar> },
    IncrementalBarUpdate(RawBar),
    /// Settlement of a contract. `payout` is 0 when the position lost.
    TradeConfirmation { stake: f64, payout: f64 },
    /// The venue rejected an outstanding request.
    ProtocolFailure {
        msg_type: String,
        code: String,
        message: String,
    },
}

/// Whether the bot sends contracts to the real venue or simulates them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    Live,
    Paper,
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradingMode::Live => write!(f, "live"),
            TradingMode::Paper => write!(f, "paper"),
        }
    }
}

/// Guard that stopped an evaluation cycle, in check order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    Cooldown,
    SimulatedFloor,
    /// No balance report has arrived from the venue yet.
    AwaitingBalance,
    AuthoritativeFloor,
    Drawdown,
}

impl SkipReason {
    /// Floor breaches mean capital is exhausted and need operator attention.
    pub fn is_operational_error(&self) -> bool {
        matches!(self, SkipReason::SimulatedFloor | SkipReason::AuthoritativeFloor)
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Cooldown => write!(f, "cooldown active"),
            SkipReason::SimulatedFloor => write!(f, "paper capital exhausted"),
            SkipReason::AwaitingBalance => write!(f, "awaiting venue balance"),
            SkipReason::AuthoritativeFloor => write!(f, "real capital exhausted"),
            SkipReason::Drawdown => write!(f, "max drawdown exceeded"),
        }
    }
}

/// Structured events emitted by the core for the observability collaborator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CoreEvent {
    HistoryLoaded {
        bars: usize,
        rejected: usize,
    },
    BarFinalized {
        bar: Bar,
        series_len: usize,
    },
    UpdateRejected {
        reason: String,
    },
    SignalDetected {
        signal: Signal,
        at: i64,
    },
    GuardSkipped {
        reason: SkipReason,
        at: i64,
    },
    TradeRequested {
        request: TradeRequest,
    },
    LedgerUpdated {
        stake: f64,
        payout: f64,
        simulated_balance: f64,
        peak_balance: f64,
    },
    AuthoritativeBalance {
        balance: f64,
    },
    ProtocolFailure {
        msg_type: String,
        code: String,
        message: String,
    },
}
