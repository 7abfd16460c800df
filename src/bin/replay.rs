//! Tick replay utility
//!
//! Usage: cargo run --bin replay -- data/ticks.jsonl
//!
//! Feeds a recorded tick stream (one `TickInput` JSON object per line)
//! through a fresh engine and prints the resulting trade activity. Useful
//! for dry-running a risk configuration against captured market sessions.

use anyhow::{Context, Result};
use std::fs;
use tracing::{info, warn};

use flipbot::config::EngineConfig;
use flipbot::engine::Engine;
use flipbot::types::{EventKind, TickInput};

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "data/ticks.jsonl".to_string());

    let config = EngineConfig::load()?;
    info!(config = %config.digest(), "replaying {}", path);
    let engine = Engine::from_config(config)?;

    let raw = fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path))?;

    let mut ticks = 0u64;
    let mut opens = 0u64;
    let mut closes = 0u64;
    for (lineno, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let input: TickInput = match serde_json::from_str(line) {
            Ok(input) => input,
            Err(e) => {
                warn!(line = lineno + 1, error = %e, "skipping malformed tick");
                continue;
            }
        };
        ticks += 1;
        for event in engine.on_tick(&input) {
            match event.kind {
                EventKind::Open => opens += 1,
                EventKind::Close => closes += 1,
            }
        }
    }

    info!(
        ticks = ticks,
        opens = opens,
        closes = closes,
        open_positions = engine.open_position_count(),
        balance = %format!("${:.2}", engine.get_balance()),
        "replay complete"
    );
    Ok(())
}
