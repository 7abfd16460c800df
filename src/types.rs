//! Core types used throughout FlipBot
//!
//! Defines the tick input surface (market snapshot, outcome-token quotes,
//! directional signal) and the trade events the engine emits.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Quotes above this are treated as cents-scale ([0,100]) and divided by 100.
const CENTS_SCALE_THRESHOLD: f64 = 1.05;

/// Normalize an outcome-token quote to a probability-price in [0,1].
///
/// Idempotent on already-normalized prices: anything at or below 1.05 passes
/// through unchanged.
pub fn normalize_price(raw: f64) -> f64 {
    if raw > CENTS_SCALE_THRESHOLD {
        raw / 100.0
    } else {
        raw
    }
}

/// Position direction on a binary market
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Up,
    Down,
}

impl Side {
    pub fn opposite(&self) -> Side {
        match self {
            Side::Up => Side::Down,
            Side::Down => Side::Up,
        }
    }

    /// Parse from a persisted label
    pub fn from_label(s: &str) -> Option<Self> {
        match s.trim_matches('"').to_ascii_uppercase().as_str() {
            "UP" => Some(Side::Up),
            "DOWN" => Some(Side::Down),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Up => write!(f, "UP"),
            Side::Down => write!(f, "DOWN"),
        }
    }
}

/// Coarse trend label supplied by the external signal pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    Rising,
    Falling,
    Neutral,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trend::Rising => write!(f, "RISING"),
            Trend::Falling => write!(f, "FALLING"),
            Trend::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// What the directional signal asks the engine to do this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalAction {
    Enter,
    Hold,
}

/// Directional trading signal (scoring happens upstream)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectionalSignal {
    pub action: SignalAction,
    /// Requested side; absent on HOLD or on a malformed signal
    pub side: Option<Side>,
    /// Model win probability; absent from weak signals
    pub probability: Option<f64>,
    pub edge: Option<f64>,
    pub strength: Option<f64>,
}

impl DirectionalSignal {
    pub fn hold() -> Self {
        Self {
            action: SignalAction::Hold,
            side: None,
            probability: None,
            edge: None,
            strength: None,
        }
    }
}

/// Per-tick snapshot of the active expiry-bound market
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    /// Identifier of the current market instance (e.g. "btc-updown-15m-1700000000")
    pub market_id: String,
    pub is_expired: bool,
    pub strike_price: Option<f64>,
    pub spot_price: Option<f64>,
    pub time_remaining_minutes: Option<f64>,
}

/// UP/DOWN token quotes; either [0,1] or [0,100] scale, auto-normalized
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PricePair {
    pub up: Option<f64>,
    pub down: Option<f64>,
}

impl PricePair {
    /// Normalized quote for one side, if present
    pub fn normalized(&self, side: Side) -> Option<f64> {
        let raw = match side {
            Side::Up => self.up,
            Side::Down => self.down,
        }?;
        Some(normalize_price(raw))
    }
}

/// Everything the engine consumes on one tick
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickInput {
    pub snapshot: MarketSnapshot,
    pub prices: PricePair,
    pub signal: DirectionalSignal,
    pub trend: Trend,
}

/// Trade event kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Open,
    Close,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Open => write!(f, "OPEN"),
            EventKind::Close => write!(f, "CLOSE"),
        }
    }
}

/// Why a position was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    StopLoss,
    StopLossBreakeven,
    HalfTime,
    EarlyTakeProfit,
    TakeProfit,
    FlipClose,
    Expiry,
}

impl ExitReason {
    /// Settlement redemptions are exempt from the exit fee
    pub fn is_settlement(&self) -> bool {
        matches!(self, ExitReason::Expiry)
    }

    /// Stop-loss closes anchor the re-entry cooldown
    pub fn is_stop_loss(&self) -> bool {
        matches!(self, ExitReason::StopLoss | ExitReason::StopLossBreakeven)
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::StopLoss => write!(f, "STOP_LOSS"),
            ExitReason::StopLossBreakeven => write!(f, "STOP_LOSS_BREAKEVEN"),
            ExitReason::HalfTime => write!(f, "HALF_TIME"),
            ExitReason::EarlyTakeProfit => write!(f, "EARLY_TAKE_PROFIT"),
            ExitReason::TakeProfit => write!(f, "TAKE_PROFIT"),
            ExitReason::FlipClose => write!(f, "FLIP_CLOSE"),
            ExitReason::Expiry => write!(f, "EXPIRY"),
        }
    }
}

/// One executed trade, emitted from `Engine::on_tick` in execution order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeEvent {
    pub timestamp: i64,
    pub trade_id: String,
    pub kind: EventKind,
    pub side: Side,
    /// Normalized execution price (settlement payouts record 1.0 / 0.0)
    pub price: f64,
    pub shares: f64,
    /// Trade amount before fee: committed cash on OPEN, gross proceeds on CLOSE
    pub amount: f64,
    pub fee: f64,
    /// Realized PnL; None on OPEN events
    pub pnl: Option<f64>,
    pub reason: String,
    pub balance_after: f64,
    pub market_id: String,
}
