//! Trade event hand-off to external collaborators
//!
//! Sinks receive every emitted event after the tick's state transition has
//! been committed. Delivery is strictly fire-and-forget: a failing sink is
//! logged and never rolls back or re-attempts the trade.

use anyhow::Result;
use tracing::{info, warn};

use crate::types::{EventKind, TradeEvent};

/// Notification collaborator interface
pub trait EventSink: Send + Sync {
    /// Human-readable name used in failure diagnostics
    fn name(&self) -> &str;

    fn publish(&self, event: &TradeEvent) -> Result<()>;
}

/// Default sink: structured log lines per event
pub struct LogSink;

impl EventSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    fn publish(&self, event: &TradeEvent) -> Result<()> {
        match event.kind {
            EventKind::Open => info!(
                trade_id = %event.trade_id,
                side = %event.side,
                price = %format!("{:.3}", event.price),
                shares = %format!("{:.2}", event.shares),
                amount = %format!("${:.2}", event.amount),
                fee = %format!("${:.4}", event.fee),
                market_id = %event.market_id,
                balance = %format!("${:.2}", event.balance_after),
                "POSITION OPENED"
            ),
            EventKind::Close => info!(
                trade_id = %event.trade_id,
                side = %event.side,
                price = %format!("{:.3}", event.price),
                shares = %format!("{:.2}", event.shares),
                proceeds = %format!("${:.2}", event.amount),
                fee = %format!("${:.4}", event.fee),
                pnl = %format!("${:+.2}", event.pnl.unwrap_or(0.0)),
                reason = %event.reason,
                market_id = %event.market_id,
                balance = %format!("${:.2}", event.balance_after),
                "POSITION CLOSED"
            ),
        }
        Ok(())
    }
}

/// Deliver one event to every sink, isolating failures per sink.
pub fn dispatch(sinks: &[std::sync::Arc<dyn EventSink>], event: &TradeEvent) {
    for sink in sinks {
        if let Err(e) = sink.publish(event) {
            warn!(sink = sink.name(), error = %e, "event sink failed; trade unaffected");
        }
    }
}
