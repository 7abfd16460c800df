//! State and trade-history persistence
//!
//! The ledger snapshots to a versioned JSON document once per tick; trade
//! events append to a CSV log. Both are best-effort: failures are logged and
//! the in-memory ledger stays authoritative.

use anyhow::{Context, Result};
use csv::WriterBuilder;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::ledger::{Ledger, Position, TradeOutcome, OUTCOME_WINDOW};
use crate::types::{Side, TradeEvent};

/// Current persisted schema version
pub const STATE_VERSION: u32 = 1;

/// Serializable open position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionRecord {
    #[serde(default)]
    pub id: String,
    pub side: String,
    pub entry_price: f64,
    pub shares: f64,
    pub cost_basis: f64,
    #[serde(default)]
    pub entry_ts: i64,
    pub market_id: String,
    #[serde(default)]
    pub breakeven_armed: bool,
}

/// Versioned on-disk ledger document.
///
/// Every field defaults so documents written by older builds merge forward
/// cleanly; `restore` is the single place defaults are decided.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateDocument {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub balance: Option<f64>,
    #[serde(default)]
    pub positions: Vec<PositionRecord>,
    #[serde(default)]
    pub daily_realized_net_loss: f64,
    #[serde(default)]
    pub last_stop_loss_ts: Option<i64>,
    #[serde(default)]
    pub last_entry_ts: Option<i64>,
    #[serde(default)]
    pub last_exit_ts: Option<i64>,
    #[serde(default)]
    pub recent_outcomes: Vec<String>,
    #[serde(default)]
    pub consecutive_losses: u32,
    #[serde(default)]
    pub last_daily_reset: Option<i64>,
    #[serde(default)]
    pub saved_at: i64,
}

impl StateDocument {
    /// Snapshot a ledger for writing
    pub fn capture(ledger: &Ledger, now_ms: i64) -> Self {
        Self {
            version: STATE_VERSION,
            balance: Some(ledger.balance),
            positions: ledger
                .positions()
                .iter()
                .map(|p| PositionRecord {
                    id: p.id.clone(),
                    side: p.side.to_string(),
                    entry_price: p.entry_price,
                    shares: p.shares,
                    cost_basis: p.cost_basis,
                    entry_ts: p.entry_ts,
                    market_id: p.market_id.clone(),
                    breakeven_armed: p.breakeven_armed,
                })
                .collect(),
            daily_realized_net_loss: ledger.daily_realized_net_loss,
            last_stop_loss_ts: ledger.last_stop_loss_ts,
            last_entry_ts: ledger.last_entry_ts,
            last_exit_ts: ledger.last_exit_ts,
            recent_outcomes: ledger.recent_outcomes().iter().map(|o| o.to_string()).collect(),
            consecutive_losses: ledger.consecutive_losses,
            last_daily_reset: Some(ledger.last_daily_reset),
            saved_at: now_ms,
        }
    }

    /// Rebuild a ledger, defaulting every missing field.
    ///
    /// Pure aside from diagnostics: unparseable position rows are dropped
    /// with a warning rather than failing the whole load.
    pub fn restore(self, initial_balance: f64, now_ms: i64) -> Ledger {
        let mut positions = Vec::with_capacity(self.positions.len());
        for record in self.positions {
            match Side::from_label(&record.side) {
                Some(side) => positions.push(Position {
                    id: if record.id.is_empty() {
                        Uuid::new_v4().to_string()
                    } else {
                        record.id
                    },
                    side,
                    entry_price: record.entry_price,
                    shares: record.shares,
                    cost_basis: record.cost_basis,
                    entry_ts: record.entry_ts,
                    market_id: record.market_id,
                    breakeven_armed: record.breakeven_armed,
                }),
                None => {
                    warn!(side = %record.side, market_id = %record.market_id, "dropping position with unknown side label");
                }
            }
        }

        let mut recent_outcomes: VecDeque<TradeOutcome> = self
            .recent_outcomes
            .iter()
            .filter_map(|s| TradeOutcome::from_label(s))
            .collect();
        while recent_outcomes.len() > OUTCOME_WINDOW {
            recent_outcomes.pop_front();
        }

        Ledger {
            balance: self.balance.unwrap_or(initial_balance),
            positions,
            daily_realized_net_loss: self.daily_realized_net_loss,
            last_stop_loss_ts: self.last_stop_loss_ts,
            last_entry_ts: self.last_entry_ts,
            last_exit_ts: self.last_exit_ts,
            recent_outcomes,
            consecutive_losses: self.consecutive_losses,
            last_daily_reset: self.last_daily_reset.unwrap_or(now_ms),
        }
    }
}

/// JSON state file wrapper
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted ledger; a missing file is a clean boot.
    pub fn load(&self, initial_balance: f64, now_ms: i64) -> Result<Ledger> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "💾 [STATE] No state file found, starting fresh");
            return Ok(Ledger::new(initial_balance, now_ms));
        }

        let json = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read state file {}", self.path.display()))?;
        let document: StateDocument =
            serde_json::from_str(&json).context("Failed to parse state document")?;

        let ledger = document.restore(initial_balance, now_ms);
        info!(
            path = %self.path.display(),
            balance = %format!("${:.2}", ledger.balance),
            positions = ledger.open_position_count(),
            "💾 [STATE] State loaded"
        );
        Ok(ledger)
    }

    /// Write the current ledger snapshot
    pub fn save(&self, ledger: &Ledger, now_ms: i64) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context("Failed to create state directory")?;
        }
        let document = StateDocument::capture(ledger, now_ms);
        let json = serde_json::to_string_pretty(&document)?;
        fs::write(&self.path, json)
            .with_context(|| format!("Failed to write state file {}", self.path.display()))?;
        Ok(())
    }
}

/// Flat CSV row for the trade log
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TradeLogRecord {
    timestamp: i64,
    trade_id: String,
    kind: String,
    side: String,
    price: f64,
    shares: f64,
    amount: f64,
    fee: f64,
    pnl: Option<f64>,
    reason: String,
    balance_after: f64,
    market_id: String,
}

/// Append-only CSV trade history
pub struct TradeLog {
    writer: Mutex<csv::Writer<std::fs::File>>,
    path: PathBuf,
}

impl TradeLog {
    /// Open (or create) the trade log under `data_dir`
    pub fn open(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir).context("Failed to create data directory")?;
        let path = data_dir.join("trades.csv");
        let file_has_data =
            path.exists() && fs::metadata(&path).map(|m| m.len() > 0).unwrap_or(false);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .context("Failed to open trade log")?;

        let writer = WriterBuilder::new()
            .has_headers(!file_has_data)
            .from_writer(file);

        Ok(Self {
            writer: Mutex::new(writer),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one trade event row
    pub fn append(&self, event: &TradeEvent) -> Result<()> {
        let record = TradeLogRecord {
            timestamp: event.timestamp,
            trade_id: event.trade_id.clone(),
            kind: event.kind.to_string(),
            side: event.side.to_string(),
            price: event.price,
            shares: event.shares,
            amount: event.amount,
            fee: event.fee,
            pnl: event.pnl,
            reason: event.reason.clone(),
            balance_after: event.balance_after,
            market_id: event.market_id.clone(),
        };

        let mut writer = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        writer
            .serialize(&record)
            .context("Failed to write trade record")?;
        writer.flush().context("Failed to flush trade log")?;
        Ok(())
    }
}
