//! Entry gate - ordered pipeline of independent entry filters
//!
//! Each filter either passes or yields a human-readable blocking reason; the
//! first blocker halts the pipeline. Order matters for operator diagnostics,
//! not for the correctness of any single filter. Missing inputs skip the
//! affected filter (no decision possible is never a block).

use crate::config::EngineConfig;
use crate::ledger::Ledger;
use crate::types::{Side, Trend};

/// Context for one entry attempt
#[derive(Debug, Clone)]
pub struct EntryAttempt<'a> {
    pub market_id: &'a str,
    pub side: Side,
    /// Normalized candidate-side price, if quoted this tick
    pub price: Option<f64>,
    pub trend: Trend,
    pub time_remaining_minutes: Option<f64>,
    /// Stake proposed by the sizing model
    pub candidate_size: f64,
    pub now_ms: i64,
}

/// Run the full pipeline; `Err` carries the first blocking reason.
pub fn evaluate(cfg: &EngineConfig, ledger: &Ledger, attempt: &EntryAttempt) -> Result<(), String> {
    if let Some(reason) = price_band(cfg, attempt) {
        return Err(reason);
    }
    if let Some(reason) = circuit_breaker(cfg, ledger) {
        return Err(reason);
    }
    if let Some(reason) = duplicate_market(ledger, attempt) {
        return Err(reason);
    }
    if let Some(reason) = daily_loss_limit(cfg, ledger) {
        return Err(reason);
    }
    if let Some(reason) = stop_loss_cooldown(cfg, ledger, attempt.now_ms) {
        return Err(reason);
    }
    if let Some(reason) = entry_debounce(cfg, ledger, attempt.now_ms) {
        return Err(reason);
    }
    if let Some(reason) = trend_filter(attempt) {
        return Err(reason);
    }
    if let Some(reason) = entry_deadline(cfg, attempt) {
        return Err(reason);
    }
    if let Some(reason) = capacity(cfg, ledger, attempt) {
        return Err(reason);
    }
    Ok(())
}

fn price_band(cfg: &EngineConfig, attempt: &EntryAttempt) -> Option<String> {
    let price = attempt.price?;
    if price < cfg.min_entry_price || price > cfg.max_entry_price {
        return Some(format!(
            "price {:.3} outside entry band [{:.2}, {:.2}]",
            price, cfg.min_entry_price, cfg.max_entry_price
        ));
    }
    None
}

fn circuit_breaker(cfg: &EngineConfig, ledger: &Ledger) -> Option<String> {
    if ledger.consecutive_losses >= cfg.max_consecutive_losses {
        return Some(format!(
            "circuit breaker: {} consecutive losses (max {})",
            ledger.consecutive_losses, cfg.max_consecutive_losses
        ));
    }
    None
}

fn duplicate_market(ledger: &Ledger, attempt: &EntryAttempt) -> Option<String> {
    if ledger.find(attempt.market_id, attempt.side).is_some() {
        return Some(format!(
            "already holding {} on market {}",
            attempt.side, attempt.market_id
        ));
    }
    None
}

fn daily_loss_limit(cfg: &EngineConfig, ledger: &Ledger) -> Option<String> {
    if ledger.daily_realized_net_loss >= cfg.daily_loss_limit {
        return Some(format!(
            "daily loss limit reached: {:.2} (limit {:.2})",
            ledger.daily_realized_net_loss, cfg.daily_loss_limit
        ));
    }
    None
}

fn stop_loss_cooldown(cfg: &EngineConfig, ledger: &Ledger, now_ms: i64) -> Option<String> {
    let last = ledger.last_stop_loss_ts?;
    let cooldown_ms = (cfg.cooldown_minutes * 60_000.0) as i64;
    let elapsed = now_ms - last;
    if elapsed < cooldown_ms {
        return Some(format!(
            "stop-loss cooldown: {}s elapsed of {}s",
            elapsed / 1000,
            cooldown_ms / 1000
        ));
    }
    None
}

fn entry_debounce(cfg: &EngineConfig, ledger: &Ledger, now_ms: i64) -> Option<String> {
    let last = ledger.last_entry_ts?;
    let debounce_ms = (cfg.entry_cooldown_seconds * 1000.0) as i64;
    let elapsed = now_ms - last;
    if elapsed < debounce_ms {
        return Some(format!(
            "entry debounce: {}s elapsed of {}s",
            elapsed / 1000,
            debounce_ms / 1000
        ));
    }
    None
}

fn trend_filter(attempt: &EntryAttempt) -> Option<String> {
    match (attempt.side, attempt.trend) {
        (Side::Up, Trend::Falling) => Some("trend filter: UP entry blocked while FALLING".into()),
        (Side::Down, Trend::Rising) => Some("trend filter: DOWN entry blocked while RISING".into()),
        _ => None,
    }
}

fn entry_deadline(cfg: &EngineConfig, attempt: &EntryAttempt) -> Option<String> {
    let remaining = attempt.time_remaining_minutes?;
    if remaining <= cfg.entry_deadline_minutes {
        return Some(format!(
            "past entry deadline: {:.1}m remaining (deadline {:.1}m)",
            remaining, cfg.entry_deadline_minutes
        ));
    }
    None
}

fn capacity(cfg: &EngineConfig, ledger: &Ledger, attempt: &EntryAttempt) -> Option<String> {
    if ledger.open_position_count() >= cfg.max_concurrent_positions {
        return Some(format!(
            "max concurrent positions reached ({})",
            cfg.max_concurrent_positions
        ));
    }
    if ledger.balance < attempt.candidate_size {
        return Some(format!(
            "insufficient balance: need {:.2}, have {:.2}",
            attempt.candidate_size, ledger.balance
        ));
    }
    None
}
