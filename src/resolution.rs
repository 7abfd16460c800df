//! Market resolution - expiry detection and forced settlement
//!
//! A position is settled when its market reports expiry, or when the tick
//! snapshot has rolled over to a new market instance while the position is
//! still open for the prior one. Settlement is a redemption: binary payout,
//! no exit fee.

use tracing::warn;

use crate::exit::PlannedClose;
use crate::ledger::Ledger;
use crate::types::{ExitReason, MarketSnapshot, PricePair, Side};

/// Decide whether UP won given the expired market's strike and spot
pub fn settles_up(strike: f64, spot: f64) -> bool {
    spot >= strike
}

/// Collect forced settlements for every position whose market has concluded.
///
/// Settlement price is the binary payout (1.0 win / 0.0 loss). When the
/// snapshot carries no strike/spot for a rolled-over market, the position is
/// closed fee-exempt at its own last quoted price instead; with no quote
/// either, settlement waits for the next tick.
pub fn settlements(
    snapshot: &MarketSnapshot,
    prices: &PricePair,
    ledger: &Ledger,
) -> Vec<PlannedClose> {
    let mut planned = Vec::new();

    for position in ledger.positions() {
        let same_market = position.market_id == snapshot.market_id;
        let concluded = (same_market && snapshot.is_expired) || !same_market;
        if !concluded {
            continue;
        }

        match (snapshot.strike_price, snapshot.spot_price) {
            (Some(strike), Some(spot)) => {
                let won = match position.side {
                    Side::Up => settles_up(strike, spot),
                    Side::Down => !settles_up(strike, spot),
                };
                planned.push(PlannedClose {
                    position_id: position.id.clone(),
                    price: if won { 1.0 } else { 0.0 },
                    reason: ExitReason::Expiry,
                });
            }
            _ => {
                // Rollover without resolution data: flatten at the token's
                // last quote rather than hold a dead-market position.
                if let Some(price) = prices.normalized(position.side) {
                    planned.push(PlannedClose {
                        position_id: position.id.clone(),
                        price,
                        reason: ExitReason::Expiry,
                    });
                } else {
                    warn!(
                        market_id = %position.market_id,
                        position_id = %position.id,
                        "market concluded without strike/spot or quote; deferring settlement"
                    );
                }
            }
        }
    }

    planned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Position;

    fn ledger_with(side: Side, market_id: &str) -> Ledger {
        let mut ledger = Ledger::new(100.0, 0);
        ledger
            .open(
                Position {
                    id: format!("pos-{}", side),
                    side,
                    entry_price: 0.50,
                    shares: 20.0,
                    cost_basis: 10.2,
                    entry_ts: 0,
                    market_id: market_id.to_string(),
                    breakeven_armed: false,
                },
                5,
            )
            .unwrap();
        ledger
    }

    fn expired_snapshot(market_id: &str, strike: f64, spot: f64) -> MarketSnapshot {
        MarketSnapshot {
            market_id: market_id.to_string(),
            is_expired: true,
            strike_price: Some(strike),
            spot_price: Some(spot),
            time_remaining_minutes: Some(0.0),
        }
    }

    #[test]
    fn up_settles_win_when_spot_at_or_above_strike() {
        assert!(settles_up(60_000.0, 60_050.0));
        assert!(settles_up(60_000.0, 60_000.0));
        assert!(!settles_up(60_000.0, 59_999.0));
    }

    #[test]
    fn expired_market_settles_open_positions_binary() {
        let ledger = ledger_with(Side::Up, "m1");
        let planned = settlements(
            &expired_snapshot("m1", 60_000.0, 60_050.0),
            &PricePair::default(),
            &ledger,
        );
        assert_eq!(planned.len(), 1);
        assert_eq!(planned[0].reason, ExitReason::Expiry);
        assert_eq!(planned[0].price, 1.0);

        let ledger = ledger_with(Side::Down, "m1");
        let planned = settlements(
            &expired_snapshot("m1", 60_000.0, 60_050.0),
            &PricePair::default(),
            &ledger,
        );
        assert_eq!(planned[0].price, 0.0);
    }

    #[test]
    fn rollover_to_new_market_forces_settlement() {
        let ledger = ledger_with(Side::Up, "m1");
        let snapshot = MarketSnapshot {
            market_id: "m2".to_string(),
            is_expired: false,
            strike_price: Some(60_000.0),
            spot_price: Some(59_900.0),
            time_remaining_minutes: Some(15.0),
        };
        let planned = settlements(&snapshot, &PricePair::default(), &ledger);
        assert_eq!(planned.len(), 1);
        assert_eq!(planned[0].price, 0.0);
    }

    #[test]
    fn rollover_without_resolution_data_flattens_at_quote_or_defers() {
        let ledger = ledger_with(Side::Up, "m1");
        let snapshot = MarketSnapshot {
            market_id: "m2".to_string(),
            is_expired: false,
            strike_price: None,
            spot_price: None,
            time_remaining_minutes: Some(15.0),
        };

        let prices = PricePair {
            up: Some(0.40),
            down: None,
        };
        let planned = settlements(&snapshot, &prices, &ledger);
        assert_eq!(planned.len(), 1);
        assert!((planned[0].price - 0.40).abs() < 1e-9);
        assert_eq!(planned[0].reason, ExitReason::Expiry);

        let planned = settlements(&snapshot, &PricePair::default(), &ledger);
        assert!(planned.is_empty());
    }

    #[test]
    fn live_market_settles_nothing() {
        let ledger = ledger_with(Side::Up, "m1");
        let snapshot = MarketSnapshot {
            market_id: "m1".to_string(),
            is_expired: false,
            strike_price: None,
            spot_price: None,
            time_remaining_minutes: Some(10.0),
        };
        assert!(settlements(&snapshot, &PricePair::default(), &ledger).is_empty());
    }
}
