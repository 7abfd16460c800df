//! Virtual ledger - the engine's single source of persisted mutable state
//!
//! Owns the cash balance, open positions and rolling risk counters. Exposes
//! only invariant-preserving mutation helpers; all trading decisions live in
//! the engine and its evaluators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use thiserror::Error;

use crate::types::Side;

/// Rolling WIN/LOSS window length
pub const OUTCOME_WINDOW: usize = 10;

/// Result classification of a closed trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeOutcome {
    Win,
    Loss,
}

impl TradeOutcome {
    pub fn from_label(s: &str) -> Option<Self> {
        match s.trim_matches('"').to_ascii_uppercase().as_str() {
            "WIN" => Some(TradeOutcome::Win),
            "LOSS" => Some(TradeOutcome::Loss),
            _ => None,
        }
    }
}

impl fmt::Display for TradeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeOutcome::Win => write!(f, "WIN"),
            TradeOutcome::Loss => write!(f, "LOSS"),
        }
    }
}

/// One open bet on a binary market
#[derive(Debug, Clone)]
pub struct Position {
    pub id: String,
    pub side: Side,
    /// Normalized probability-price in [0,1]
    pub entry_price: f64,
    /// Outcome tokens held, = pre-fee cost / entry_price
    pub shares: f64,
    /// Cash committed including the entry fee; immutable after open
    pub cost_basis: f64,
    /// Wall-clock open time (ms)
    pub entry_ts: i64,
    pub market_id: String,
    /// One-way latch: once set, non-positive-ROI closes realize at entry price
    pub breakeven_armed: bool,
}

impl Position {
    /// Unrealized ROI in percent at the given normalized mark
    pub fn roi_pct(&self, current_price: f64) -> f64 {
        if self.entry_price <= 0.0 {
            return 0.0;
        }
        (current_price - self.entry_price) / self.entry_price * 100.0
    }

    /// Cost basis net of the entry fee, = shares * entry_price
    pub fn cost_basis_pre_fee(&self) -> f64 {
        self.shares * self.entry_price
    }
}

/// Typed rejections from `Ledger::open`
#[derive(Debug, Error, PartialEq)]
pub enum LedgerError {
    #[error("insufficient balance: need {needed:.2}, have {available:.2}")]
    InsufficientBalance { needed: f64, available: f64 },
    #[error("max concurrent positions reached ({max})")]
    CapacityExhausted { max: usize },
    #[error("position already open for market {market_id} side {side}")]
    DuplicatePosition { market_id: String, side: Side },
}

/// Process-wide persisted trading state
#[derive(Debug, Clone)]
pub struct Ledger {
    pub balance: f64,
    pub(crate) positions: Vec<Position>,
    /// Realized net loss for the current UTC day; losses add, wins subtract
    pub daily_realized_net_loss: f64,
    pub last_stop_loss_ts: Option<i64>,
    pub last_entry_ts: Option<i64>,
    pub last_exit_ts: Option<i64>,
    pub(crate) recent_outcomes: VecDeque<TradeOutcome>,
    pub consecutive_losses: u32,
    pub last_daily_reset: i64,
}

impl Ledger {
    pub fn new(initial_balance: f64, now_ms: i64) -> Self {
        Self {
            balance: initial_balance,
            positions: Vec::new(),
            daily_realized_net_loss: 0.0,
            last_stop_loss_ts: None,
            last_entry_ts: None,
            last_exit_ts: None,
            recent_outcomes: VecDeque::with_capacity(OUTCOME_WINDOW),
            consecutive_losses: 0,
            last_daily_reset: now_ms,
        }
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn positions_mut(&mut self) -> &mut [Position] {
        &mut self.positions
    }

    pub fn open_position_count(&self) -> usize {
        self.positions.len()
    }

    pub fn find(&self, market_id: &str, side: Side) -> Option<&Position> {
        self.positions
            .iter()
            .find(|p| p.market_id == market_id && p.side == side)
    }

    pub fn get(&self, position_id: &str) -> Option<&Position> {
        self.positions.iter().find(|p| p.id == position_id)
    }

    pub fn recent_outcomes(&self) -> &VecDeque<TradeOutcome> {
        &self.recent_outcomes
    }

    /// Admit a new position, debiting its full cost basis.
    ///
    /// Rejects without mutating when the cost exceeds the balance, capacity
    /// is exhausted, or a same-market same-side position already exists.
    pub fn open(&mut self, position: Position, max_positions: usize) -> Result<(), LedgerError> {
        if self.balance < position.cost_basis {
            return Err(LedgerError::InsufficientBalance {
                needed: position.cost_basis,
                available: self.balance,
            });
        }
        if self.positions.len() >= max_positions {
            return Err(LedgerError::CapacityExhausted { max: max_positions });
        }
        if self.find(&position.market_id, position.side).is_some() {
            return Err(LedgerError::DuplicatePosition {
                market_id: position.market_id.clone(),
                side: position.side,
            });
        }

        self.balance -= position.cost_basis;
        self.last_entry_ts = Some(position.entry_ts);
        self.positions.push(position);
        Ok(())
    }

    /// Settle a close: credit after-fee proceeds, drop the position, roll the
    /// risk counters. `stop_loss` anchors the re-entry cooldown.
    pub fn close(
        &mut self,
        position_id: &str,
        proceeds: f64,
        pnl: f64,
        now_ms: i64,
        stop_loss: bool,
    ) -> Option<Position> {
        let idx = self.positions.iter().position(|p| p.id == position_id)?;
        let position = self.positions.remove(idx);

        self.balance += proceeds;
        self.daily_realized_net_loss -= pnl;

        let outcome = if pnl > 0.0 {
            TradeOutcome::Win
        } else {
            TradeOutcome::Loss
        };
        self.recent_outcomes.push_back(outcome);
        while self.recent_outcomes.len() > OUTCOME_WINDOW {
            self.recent_outcomes.pop_front();
        }
        match outcome {
            TradeOutcome::Win => self.consecutive_losses = 0,
            TradeOutcome::Loss => self.consecutive_losses += 1,
        }

        self.last_exit_ts = Some(now_ms);
        if stop_loss {
            self.last_stop_loss_ts = Some(now_ms);
        }

        Some(position)
    }

    /// Zero the daily loss accumulator when the UTC calendar day has rolled
    /// over. Idempotent within the same day.
    pub fn reset_daily_if_new_utc_day(&mut self, now_ms: i64) -> bool {
        let last = utc_date(self.last_daily_reset);
        let today = utc_date(now_ms);
        if last == today {
            return false;
        }
        self.daily_realized_net_loss = 0.0;
        self.last_daily_reset = now_ms;
        true
    }
}

fn utc_date(ts_ms: i64) -> chrono::NaiveDate {
    DateTime::<Utc>::from_timestamp_millis(ts_ms)
        .unwrap_or_else(|| DateTime::<Utc>::from_timestamp_millis(0).unwrap())
        .date_naive()
}
