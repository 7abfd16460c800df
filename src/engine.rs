//! Tick engine - orchestrates the position lifecycle
//!
//! One tick runs to completion under a single lock: daily counter rollover,
//! forced settlement of concluded markets, the per-position exit cascade,
//! then the flip/entry path, one persistence write, and finally event
//! hand-off to collaborators. Nothing in a tick propagates an error past
//! `on_tick`; every fallible step degrades to a logged no-op.

use chrono::Utc;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::entry::{self, EntryAttempt};
use crate::events::{self, EventSink, LogSink};
use crate::exit::{self, PlannedClose};
use crate::ledger::{Ledger, Position};
use crate::persistence::{StateStore, TradeLog};
use crate::resolution;
use crate::sizing;
use crate::types::{EventKind, ExitReason, Side, SignalAction, TickInput, TradeEvent};

/// Reason string recorded on OPEN events
const ENTRY_REASON: &str = "ENTRY";

pub struct Engine {
    config: EngineConfig,
    ledger: Mutex<Ledger>,
    state_store: Option<StateStore>,
    trade_log: Option<TradeLog>,
    sinks: Vec<Arc<dyn EventSink>>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let now = Utc::now().timestamp_millis();
        let ledger = Ledger::new(config.initial_balance, now);
        Self {
            config,
            ledger: Mutex::new(ledger),
            state_store: None,
            trade_log: None,
            sinks: Vec::new(),
        }
    }

    /// Wire state file, CSV trade log and the default log sink per config
    pub fn from_config(config: EngineConfig) -> anyhow::Result<Self> {
        let data_dir = PathBuf::from(&config.data_dir);
        let trade_log = if config.csv_enabled {
            Some(TradeLog::open(&data_dir)?)
        } else {
            None
        };

        let mut engine = Engine::new(config)
            .with_state_file(data_dir.join("engine_state.json"))
            .with_sink(Arc::new(LogSink));
        engine.trade_log = trade_log;
        engine.load_state()?;
        Ok(engine)
    }

    pub fn with_state_file(mut self, path: PathBuf) -> Self {
        self.state_store = Some(StateStore::new(path));
        self
    }

    pub fn with_trade_log(mut self, trade_log: TradeLog) -> Self {
        self.trade_log = Some(trade_log);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Replace the in-memory ledger with the persisted document, if any.
    /// A missing state file keeps clean boot defaults.
    pub fn load_state(&self) -> anyhow::Result<()> {
        let store = match &self.state_store {
            Some(s) => s,
            None => return Ok(()),
        };
        let now = Utc::now().timestamp_millis();
        let loaded = store.load(self.config.initial_balance, now)?;
        let mut ledger = self.lock_ledger();
        *ledger = loaded;
        Ok(())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn get_balance(&self) -> f64 {
        self.lock_ledger().balance
    }

    pub fn get_positions(&self) -> Vec<Position> {
        self.lock_ledger().positions().to_vec()
    }

    pub fn open_position_count(&self) -> usize {
        self.lock_ledger().open_position_count()
    }

    /// Process one tick. Serialized: overlapping callers queue on the ledger
    /// lock, never interleave.
    pub fn on_tick(&self, input: &TickInput) -> Vec<TradeEvent> {
        let mut ledger = self.lock_ledger();
        let now = Utc::now().timestamp_millis();
        let mut tick_events = Vec::new();

        ledger.reset_daily_if_new_utc_day(now);

        // 1. Forced settlement of concluded markets has highest priority.
        for planned in resolution::settlements(&input.snapshot, &input.prices, &ledger) {
            if let Some(event) = self.apply_close(&mut ledger, &planned, now) {
                tick_events.push(event);
            }
        }

        // 2. Exit cascade over the surviving positions.
        let planned_exits: Vec<PlannedClose> = {
            let config = &self.config;
            let snapshot = &input.snapshot;
            let prices = &input.prices;
            ledger
                .positions_mut()
                .iter_mut()
                .filter_map(|position| {
                    let side_price = prices.normalized(position.side);
                    // the snapshot clock only describes the active market
                    let remaining = if position.market_id == snapshot.market_id {
                        snapshot.time_remaining_minutes
                    } else {
                        None
                    };
                    exit::evaluate_position(config, position, side_price, remaining, now)
                })
                .collect()
        };
        for planned in planned_exits {
            if let Some(event) = self.apply_close(&mut ledger, &planned, now) {
                tick_events.push(event);
            }
        }

        // 3. Flip or fresh entry for this tick's signal.
        self.consider_entry(&mut ledger, input, now, &mut tick_events);

        // 4. One persistence write per tick, after all mutations.
        if let Some(store) = &self.state_store {
            if let Err(e) = store.save(&ledger, now) {
                warn!(error = %e, "failed to persist ledger state; retrying next tick");
            }
        }
        drop(ledger);

        // 5. Fire-and-forget hand-off to collaborators.
        for event in &tick_events {
            if let Some(log) = &self.trade_log {
                if let Err(e) = log.append(event) {
                    warn!(error = %e, "failed to append trade log row");
                }
            }
            events::dispatch(&self.sinks, event);
        }

        tick_events
    }

    fn lock_ledger(&self) -> std::sync::MutexGuard<'_, Ledger> {
        self.ledger
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Close a position: fee unless settlement, breakeven floor for armed
    /// positions, ledger bookkeeping, CLOSE event.
    fn apply_close(
        &self,
        ledger: &mut Ledger,
        planned: &PlannedClose,
        now_ms: i64,
    ) -> Option<TradeEvent> {
        let position = ledger.get(&planned.position_id)?.clone();

        let mut close_price = planned.price;
        if !planned.reason.is_settlement()
            && position.breakeven_armed
            && close_price < position.entry_price
        {
            // armed positions never realize below entry outside settlement
            close_price = position.entry_price;
        }

        let gross = position.shares * close_price;
        let fee = if planned.reason.is_settlement() {
            0.0
        } else {
            gross * self.config.fee_pct / 100.0
        };
        let proceeds = (gross - fee).max(0.0);
        let pnl = proceeds - position.cost_basis;

        ledger.close(
            &position.id,
            proceeds,
            pnl,
            now_ms,
            planned.reason.is_stop_loss(),
        )?;

        Some(TradeEvent {
            timestamp: now_ms,
            trade_id: position.id.clone(),
            kind: EventKind::Close,
            side: position.side,
            price: close_price,
            shares: position.shares,
            amount: gross,
            fee,
            pnl: Some(pnl),
            reason: planned.reason.to_string(),
            balance_after: ledger.balance,
            market_id: position.market_id.clone(),
        })
    }

    /// Entry path: a qualifying opposite-side signal flips the held position
    /// atomically; otherwise the signal goes through the normal gate.
    fn consider_entry(
        &self,
        ledger: &mut Ledger,
        input: &TickInput,
        now_ms: i64,
        tick_events: &mut Vec<TradeEvent>,
    ) {
        let signal = &input.signal;
        if signal.action != SignalAction::Enter {
            return;
        }
        let side = match signal.side {
            Some(side) => side,
            None => return, // malformed signal: no decision possible
        };
        if input.snapshot.is_expired {
            return;
        }
        let price = match input.prices.normalized(side) {
            Some(p) => p,
            None => {
                info!(side = %side, market_id = %input.snapshot.market_id, "no quote for entry side; skipping signal");
                return;
            }
        };

        let held_opposite = ledger
            .find(&input.snapshot.market_id, side.opposite())
            .cloned();

        match held_opposite {
            Some(existing) => {
                self.consider_flip(ledger, input, &existing, side, price, now_ms, tick_events)
            }
            None => {
                if let Some(event) = self.try_open(ledger, input, side, price, now_ms) {
                    tick_events.push(event);
                }
            }
        }
    }

    /// Two-phase flip: close and replacement open are dry-run on a scratch
    /// ledger; the real ledger only ever sees the whole flip or nothing.
    #[allow(clippy::too_many_arguments)]
    fn consider_flip(
        &self,
        ledger: &mut Ledger,
        input: &TickInput,
        existing: &Position,
        side: Side,
        price: f64,
        now_ms: i64,
        tick_events: &mut Vec<TradeEvent>,
    ) {
        let held_price = match input.prices.normalized(existing.side) {
            Some(p) => p,
            None => {
                info!(market_id = %existing.market_id, "held side unquoted; flip skipped");
                return;
            }
        };

        if self.config.flip_guard_enabled && held_price >= self.config.flip_guard_price {
            info!(
                held_price = %format!("{:.3}", held_price),
                guard = %format!("{:.3}", self.config.flip_guard_price),
                "flip vetoed: held position already favorable"
            );
            return;
        }

        let mut scratch = ledger.clone();
        let planned_close = PlannedClose {
            position_id: existing.id.clone(),
            price: held_price,
            reason: ExitReason::FlipClose,
        };
        let close_event = match self.apply_close(&mut scratch, &planned_close, now_ms) {
            Some(event) => event,
            None => return,
        };
        let open_event = match self.try_open(&mut scratch, input, side, price, now_ms) {
            Some(event) => event,
            None => {
                info!(market_id = %existing.market_id, incoming = %side, "flip abandoned: replacement entry blocked");
                return;
            }
        };

        *ledger = scratch;
        tick_events.push(close_event);
        tick_events.push(open_event);
    }

    /// Size, gate and open one position; `None` when any stage declines.
    fn try_open(
        &self,
        ledger: &mut Ledger,
        input: &TickInput,
        side: Side,
        price: f64,
        now_ms: i64,
    ) -> Option<TradeEvent> {
        let quote = sizing::entry_size(
            input.signal.probability,
            price,
            ledger.balance,
            self.config.kelly_fraction,
            self.config.min_bet,
            self.config.max_bet,
        );

        let attempt = EntryAttempt {
            market_id: &input.snapshot.market_id,
            side,
            price: Some(price),
            trend: input.trend,
            time_remaining_minutes: input.snapshot.time_remaining_minutes,
            candidate_size: quote.amount,
            now_ms,
        };
        if let Err(reason) = entry::evaluate(&self.config, ledger, &attempt) {
            info!(
                side = %side,
                market_id = %input.snapshot.market_id,
                reason = %reason,
                "entry blocked"
            );
            return None;
        }

        let amount = quote.amount;
        if amount <= 0.0 || price <= 0.0 {
            return None;
        }
        let fee = amount * self.config.fee_pct / 100.0;
        let cost_basis = amount + fee;
        let shares = amount / price;

        let position = Position {
            id: Uuid::new_v4().to_string(),
            side,
            entry_price: price,
            shares,
            cost_basis,
            entry_ts: now_ms,
            market_id: input.snapshot.market_id.clone(),
            breakeven_armed: false,
        };
        let trade_id = position.id.clone();
        let market_id = position.market_id.clone();

        if let Err(e) = ledger.open(position, self.config.max_concurrent_positions) {
            info!(side = %side, market_id = %market_id, error = %e, "ledger rejected open");
            return None;
        }

        Some(TradeEvent {
            timestamp: now_ms,
            trade_id,
            kind: EventKind::Open,
            side,
            price,
            shares,
            amount,
            fee,
            pnl: None,
            reason: ENTRY_REASON.to_string(),
            balance_after: ledger.balance,
            market_id,
        })
    }
}
