//! Exit evaluation - priority-ordered trigger cascade per open position
//!
//! Runs once per position per tick. The first matching trigger decides the
//! close; positions are evaluated independently of each other. Breakeven
//! arming is the one pure side effect that never closes by itself.

use crate::config::EngineConfig;
use crate::ledger::Position;
use crate::types::ExitReason;

/// A close decided by the cascade, applied by the engine afterwards
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedClose {
    pub position_id: String,
    /// Normalized close price (entry price for breakeven-locked closes)
    pub price: f64,
    pub reason: ExitReason,
}

/// Evaluate the exit cascade for one position.
///
/// `side_price` is the normalized quote for the position's own token; when
/// it is absent no price-dependent trigger can fire this tick. Mutates the
/// position only to arm the breakeven latch.
pub fn evaluate_position(
    cfg: &EngineConfig,
    position: &mut Position,
    side_price: Option<f64>,
    time_remaining_minutes: Option<f64>,
    now_ms: i64,
) -> Option<PlannedClose> {
    let price = side_price?;
    let roi = position.roi_pct(price);

    // 1. Breakeven arming: one-way latch, never closes on its own.
    if !position.breakeven_armed && roi >= cfg.breakeven_trigger_roi_pct {
        position.breakeven_armed = true;
    }

    // 2. Hard stop, suppressed inside the post-entry grace period.
    let grace_ms = (cfg.stop_loss_grace_period_seconds * 1000.0) as i64;
    if roi <= -cfg.stop_loss_roi_pct && now_ms - position.entry_ts >= grace_ms {
        return Some(if position.breakeven_armed && roi < 0.0 {
            PlannedClose {
                position_id: position.id.clone(),
                price: position.entry_price,
                reason: ExitReason::StopLossBreakeven,
            }
        } else {
            PlannedClose {
                position_id: position.id.clone(),
                price,
                reason: ExitReason::StopLoss,
            }
        });
    }

    // 3. Breakeven protection: armed positions never ride back below entry.
    if position.breakeven_armed && roi <= 0.0 {
        return Some(PlannedClose {
            position_id: position.id.clone(),
            price: position.entry_price,
            reason: ExitReason::StopLossBreakeven,
        });
    }

    // 4. Half-time rule: cut losers before the illiquid end-game.
    if let Some(remaining) = time_remaining_minutes {
        if remaining <= cfg.half_time_threshold_minutes && roi < 0.0 {
            return Some(PlannedClose {
                position_id: position.id.clone(),
                price,
                reason: ExitReason::HalfTime,
            });
        }
    }

    // 5. Early take-profit: lock near-certain wins before settlement friction.
    if price >= cfg.early_take_profit_price || roi >= cfg.early_take_profit_roi_pct {
        return Some(PlannedClose {
            position_id: position.id.clone(),
            price,
            reason: ExitReason::EarlyTakeProfit,
        });
    }

    // 6. Take-profit: wider thresholds, reachable when the early trigger is
    // configured out of the way.
    if price >= cfg.take_profit_price || roi >= cfg.take_profit_roi_pct {
        return Some(PlannedClose {
            position_id: position.id.clone(),
            price,
            reason: ExitReason::TakeProfit,
        });
    }

    None
}
