//! End-to-end lifecycle scenarios through the public engine API

use std::fs;
use std::sync::Arc;
use std::sync::Mutex;

use flipbot::config::EngineConfig;
use flipbot::engine::Engine;
use flipbot::events::EventSink;
use flipbot::types::{
    DirectionalSignal, EventKind, MarketSnapshot, PricePair, Side, SignalAction, TickInput,
    TradeEvent, Trend,
};
use uuid::Uuid;

fn config() -> EngineConfig {
    EngineConfig {
        entry_cooldown_seconds: 0.0,
        stop_loss_grace_period_seconds: 0.0,
        csv_enabled: false,
        ..EngineConfig::default()
    }
}

fn enter(side: Side, probability: Option<f64>) -> DirectionalSignal {
    DirectionalSignal {
        action: SignalAction::Enter,
        side: Some(side),
        probability,
        edge: None,
        strength: None,
    }
}

fn tick(market_id: &str, up: f64, down: f64, signal: DirectionalSignal) -> TickInput {
    TickInput {
        snapshot: MarketSnapshot {
            market_id: market_id.to_string(),
            is_expired: false,
            strike_price: None,
            spot_price: None,
            time_remaining_minutes: Some(12.0),
        },
        prices: PricePair {
            up: Some(up),
            down: Some(down),
        },
        signal,
        trend: Trend::Neutral,
    }
}

fn expiry_tick(market_id: &str, strike: f64, spot: f64) -> TickInput {
    let mut input = tick(market_id, 0.50, 0.50, DirectionalSignal::hold());
    input.snapshot.is_expired = true;
    input.snapshot.strike_price = Some(strike);
    input.snapshot.spot_price = Some(spot);
    input.snapshot.time_remaining_minutes = Some(0.0);
    input
}

// Scenario A: enter UP at 0.50 with $100 balance, $10 max bet, 2% fee.
#[test]
fn scenario_a_open_amounts() {
    let engine = Engine::new(config());
    let events = engine.on_tick(&tick("m1", 0.50, 0.50, enter(Side::Up, None)));

    assert_eq!(events.len(), 1);
    let open = &events[0];
    assert_eq!(open.kind, EventKind::Open);
    assert_eq!(open.side, Side::Up);
    assert_eq!(open.reason, "ENTRY");
    assert!((open.amount - 10.0).abs() < 1e-9);
    assert!((open.fee - 0.20).abs() < 1e-9);
    assert!((open.shares - 20.0).abs() < 1e-9);
    assert!((open.balance_after - 89.80).abs() < 1e-9);
    assert!(open.pnl.is_none());
}

// Scenario B: ROI +30% arms breakeven; a later drop to -10% closes at entry
// price for a fee-only loss.
#[test]
fn scenario_b_breakeven_lock() {
    let engine = Engine::new(config());
    engine.on_tick(&tick("m1", 0.50, 0.50, enter(Side::Up, None)));

    // price rises to 0.65 (+30%): arming only, no event
    let events = engine.on_tick(&tick("m1", 0.65, 0.35, DirectionalSignal::hold()));
    assert!(events.is_empty());
    assert!(engine.get_positions()[0].breakeven_armed);

    // price falls to 0.45 (-10%): protective close at the 0.50 entry price
    let events = engine.on_tick(&tick("m1", 0.45, 0.55, DirectionalSignal::hold()));
    assert_eq!(events.len(), 1);
    let close = &events[0];
    assert_eq!(close.reason, "STOP_LOSS_BREAKEVEN");
    assert!((close.price - 0.50).abs() < 1e-9);
    // proceeds 20 * 0.50 = 10.0 minus 2% fee, against a 10.20 cost basis
    assert!((close.pnl.unwrap() - (-0.40)).abs() < 1e-9);
}

// Scenario C: a deep crash stops out at market once past the grace period.
// (Grace-period suppression itself is covered by the exit unit tests with
// synthetic entry timestamps.)
#[test]
fn scenario_c_hard_stop_at_market() {
    let engine = Engine::new(config());
    engine.on_tick(&tick("m1", 0.50, 0.50, enter(Side::Up, None)));

    let events = engine.on_tick(&tick("m1", 0.30, 0.70, DirectionalSignal::hold()));
    assert_eq!(events.len(), 1);
    let close = &events[0];
    assert_eq!(close.reason, "STOP_LOSS");
    assert!((close.price - 0.30).abs() < 1e-9);
    assert!(close.pnl.unwrap() < 0.0);
}

// Scenario D: expiry settles the UP position as a fee-free binary win.
#[test]
fn scenario_d_settlement() {
    let engine = Engine::new(config());
    engine.on_tick(&tick("m1", 0.50, 0.50, enter(Side::Up, None)));

    let events = engine.on_tick(&expiry_tick("m1", 60_000.0, 60_050.0));
    assert_eq!(events.len(), 1);
    let close = &events[0];
    assert_eq!(close.reason, "EXPIRY");
    assert_eq!(close.price, 1.0);
    assert_eq!(close.fee, 0.0);
    assert!((close.pnl.unwrap() - 9.8).abs() < 1e-9);
    assert_eq!(engine.open_position_count(), 0);
}

#[test]
fn losing_settlement_zeroes_the_position() {
    let engine = Engine::new(config());
    engine.on_tick(&tick("m1", 0.50, 0.50, enter(Side::Up, None)));

    let events = engine.on_tick(&expiry_tick("m1", 60_000.0, 59_950.0));
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].price, 0.0);
    assert!((events[0].pnl.unwrap() - (-10.2)).abs() < 1e-9);
}

// Market rollover settles positions left open on the prior instance and the
// engine re-enters the new market on the same tick.
#[test]
fn rollover_settles_then_reenters() {
    let mut cfg = config();
    cfg.cooldown_minutes = 0.0;
    let engine = Engine::new(cfg);
    engine.on_tick(&tick("m1", 0.50, 0.50, enter(Side::Up, None)));

    let mut input = tick("m2", 0.50, 0.50, enter(Side::Up, None));
    input.snapshot.strike_price = Some(60_000.0);
    input.snapshot.spot_price = Some(60_100.0);
    let events = engine.on_tick(&input);

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].kind, EventKind::Close);
    assert_eq!(events[0].reason, "EXPIRY");
    assert_eq!(events[0].market_id, "m1");
    assert_eq!(events[1].kind, EventKind::Open);
    assert_eq!(events[1].market_id, "m2");
}

// Cents-scale quotes are normalized before any storage or math.
#[test]
fn cents_scale_quotes_are_normalized() {
    let engine = Engine::new(config());
    let events = engine.on_tick(&tick("m1", 50.0, 50.0, enter(Side::Up, None)));
    assert_eq!(events.len(), 1);
    assert!((events[0].price - 0.50).abs() < 1e-9);
    assert!((events[0].shares - 20.0).abs() < 1e-9);
    assert!((engine.get_positions()[0].entry_price - 0.50).abs() < 1e-9);
}

// Circuit breaker: consecutive losses eventually lock the gate.
#[test]
fn circuit_breaker_blocks_after_streak() {
    let mut cfg = config();
    cfg.cooldown_minutes = 0.0;
    cfg.daily_loss_limit = 1_000.0;
    cfg.max_consecutive_losses = 2;
    let engine = Engine::new(cfg);

    for i in 0..2 {
        let market = format!("m{}", i);
        let events = engine.on_tick(&tick(&market, 0.50, 0.50, enter(Side::Up, None)));
        assert_eq!(events.len(), 1, "entry {} should open", i);
        let events = engine.on_tick(&tick(&market, 0.30, 0.70, DirectionalSignal::hold()));
        assert_eq!(events.len(), 1, "entry {} should stop out", i);
    }

    let events = engine.on_tick(&tick("m9", 0.50, 0.50, enter(Side::Up, None)));
    assert!(events.is_empty());
}

// Concurrency invariants: never more than max_concurrent_positions open,
// never two positions sharing (market_id, side).
#[test]
fn at_most_n_positions() {
    let mut cfg = config();
    cfg.max_concurrent_positions = 2;
    let engine = Engine::new(cfg);

    for market in ["m1", "m1", "m2", "m3"] {
        engine.on_tick(&tick(market, 0.50, 0.50, enter(Side::Up, None)));
        let positions = engine.get_positions();
        assert!(positions.len() <= 2);
        let mut keys: Vec<(String, String)> = positions
            .iter()
            .map(|p| (p.market_id.clone(), p.side.to_string()))
            .collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), positions.len());
    }
}

// Balance conservation across a full open/close round trip.
#[test]
fn balance_conservation() {
    let engine = Engine::new(config());
    let start = engine.get_balance();

    let open = &engine.on_tick(&tick("m1", 0.50, 0.50, enter(Side::Up, None)))[0];
    assert!((open.balance_after - (start - open.amount - open.fee)).abs() < 1e-9);
    let after_open = engine.get_balance();

    let close = &engine.on_tick(&tick("m1", 0.30, 0.70, DirectionalSignal::hold()))[0];
    let proceeds_after_fee = close.amount - close.fee;
    assert!((close.balance_after - (after_open + proceeds_after_fee)).abs() < 1e-9);
}

// Restart recovery: state file round trips the ledger, including the
// breakeven latch on open positions.
#[test]
fn state_survives_restart() {
    let dir = std::env::temp_dir().join(format!("flipbot_restart_{}", Uuid::new_v4()));
    let state_path = dir.join("engine_state.json");

    let engine = Engine::new(config()).with_state_file(state_path.clone());
    engine.load_state().unwrap();
    engine.on_tick(&tick("m1", 0.50, 0.50, enter(Side::Up, None)));
    engine.on_tick(&tick("m1", 0.65, 0.35, DirectionalSignal::hold()));
    let balance = engine.get_balance();

    // fresh engine, same state file
    let revived = Engine::new(config()).with_state_file(state_path);
    revived.load_state().unwrap();
    assert!((revived.get_balance() - balance).abs() < 1e-9);
    let positions = revived.get_positions();
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].side, Side::Up);
    assert!(positions[0].breakeven_armed);

    // the revived engine continues the lifecycle where it left off
    let events = revived.on_tick(&tick("m1", 0.45, 0.55, DirectionalSignal::hold()));
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].reason, "STOP_LOSS_BREAKEVEN");

    let _ = fs::remove_dir_all(dir);
}

// Sink failures never affect the trade or later sinks.
#[test]
fn sink_errors_are_isolated() {
    struct Recorder(Mutex<Vec<TradeEvent>>);
    impl EventSink for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }
        fn publish(&self, event: &TradeEvent) -> anyhow::Result<()> {
            self.0.lock().unwrap().push(event.clone());
            Ok(())
        }
    }
    struct Exploder;
    impl EventSink for Exploder {
        fn name(&self) -> &str {
            "exploder"
        }
        fn publish(&self, _event: &TradeEvent) -> anyhow::Result<()> {
            anyhow::bail!("notification channel down")
        }
    }

    let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
    let engine = Engine::new(config())
        .with_sink(Arc::new(Exploder))
        .with_sink(recorder.clone());

    let events = engine.on_tick(&tick("m1", 0.50, 0.50, enter(Side::Up, None)));
    assert_eq!(events.len(), 1);
    assert_eq!(engine.open_position_count(), 1);
    assert_eq!(recorder.0.lock().unwrap().len(), 1);
}

// Kelly sizing: a strong probability scales the stake, a weak one probes.
#[test]
fn probability_drives_position_size() {
    let mut cfg = config();
    cfg.max_bet = 50.0;
    let engine = Engine::new(cfg);

    // p=0.6 at 0.50: quarter Kelly = 5% of 100 = $5
    let events = engine.on_tick(&tick("m1", 0.50, 0.50, enter(Side::Up, Some(0.60))));
    assert!((events[0].amount - 5.0).abs() < 1e-9);

    // negative edge probes with min_bet (the m2 rollover also flattens the
    // m1 position first, so the open is the last event of the tick)
    let events = engine.on_tick(&tick("m2", 0.50, 0.50, enter(Side::Up, Some(0.40))));
    let open = events
        .iter()
        .find(|e| e.kind == EventKind::Open)
        .expect("probe entry should open");
    assert!((open.amount - 1.0).abs() < 1e-9);
}
