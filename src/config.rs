//! Configuration management for FlipBot
//!
//! Loads from optional config files + environment variables via .env into a
//! single immutable value handed to the engine at construction. Components
//! never read configuration ambiently.

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

/// Engine configuration, frozen at startup
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Starting virtual balance when no persisted state exists
    pub initial_balance: f64,
    /// Proportional fee on opens and non-settlement closes (percent of notional)
    pub fee_pct: f64,
    /// Take-profit ROI threshold (percent)
    pub take_profit_roi_pct: f64,
    /// Hard stop ROI threshold (percent, applied as -stop_loss_roi_pct)
    pub stop_loss_roi_pct: f64,
    /// Take-profit price level on the normalized scale
    pub take_profit_price: f64,
    /// Unrealized ROI (percent) at which breakeven protection arms
    pub breakeven_trigger_roi_pct: f64,
    /// Cut losing positions once this little time remains (minutes)
    pub half_time_threshold_minutes: f64,
    /// Early take-profit price level on the normalized scale
    pub early_take_profit_price: f64,
    /// Early take-profit ROI threshold (percent)
    pub early_take_profit_roi_pct: f64,
    /// Fraction of full Kelly to deploy
    pub kelly_fraction: f64,
    /// Minimum stake per entry
    pub min_bet: f64,
    /// Maximum stake per entry (also the base unit for probability-free signals)
    pub max_bet: f64,
    pub max_concurrent_positions: usize,
    /// Re-entry cooldown after a stop-loss close (minutes)
    pub cooldown_minutes: f64,
    /// Debounce between consecutive entries (seconds)
    pub entry_cooldown_seconds: f64,
    /// Hard stop is suppressed for this long after entry (seconds)
    pub stop_loss_grace_period_seconds: f64,
    /// Entries blocked once realized net loss for the UTC day reaches this
    pub daily_loss_limit: f64,
    /// Entries blocked at this many consecutive losing closes
    pub max_consecutive_losses: u32,
    /// Entry price band on the normalized scale
    pub min_entry_price: f64,
    pub max_entry_price: f64,
    /// No entries once this little time remains in the market (minutes)
    pub entry_deadline_minutes: f64,
    /// Veto flips away from positions already quoting at/above flip_guard_price
    pub flip_guard_enabled: bool,
    pub flip_guard_price: f64,
    /// Data directory for the CSV trade log
    pub data_dir: String,
    pub csv_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_balance: 100.0,
            fee_pct: 2.0,
            take_profit_roi_pct: 100.0,
            stop_loss_roi_pct: 25.0,
            take_profit_price: 0.95,
            breakeven_trigger_roi_pct: 30.0,
            half_time_threshold_minutes: 7.5,
            early_take_profit_price: 0.92,
            early_take_profit_roi_pct: 80.0,
            kelly_fraction: 0.25,
            min_bet: 1.0,
            max_bet: 10.0,
            max_concurrent_positions: 3,
            cooldown_minutes: 10.0,
            entry_cooldown_seconds: 30.0,
            stop_loss_grace_period_seconds: 15.0,
            daily_loss_limit: 20.0,
            max_consecutive_losses: 3,
            min_entry_price: 0.15,
            max_entry_price: 0.85,
            entry_deadline_minutes: 2.0,
            flip_guard_enabled: false,
            flip_guard_price: 0.85,
            data_dir: "./data".to_string(),
            csv_enabled: true,
        }
    }
}

impl EngineConfig {
    /// Load configuration from files and environment (FLIPBOT__ prefix)
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let defaults = EngineConfig::default();

        let config = Config::builder()
            .set_default("initial_balance", defaults.initial_balance)?
            .set_default("fee_pct", defaults.fee_pct)?
            .set_default("take_profit_roi_pct", defaults.take_profit_roi_pct)?
            .set_default("stop_loss_roi_pct", defaults.stop_loss_roi_pct)?
            .set_default("take_profit_price", defaults.take_profit_price)?
            .set_default("breakeven_trigger_roi_pct", defaults.breakeven_trigger_roi_pct)?
            .set_default(
                "half_time_threshold_minutes",
                defaults.half_time_threshold_minutes,
            )?
            .set_default("early_take_profit_price", defaults.early_take_profit_price)?
            .set_default("early_take_profit_roi_pct", defaults.early_take_profit_roi_pct)?
            .set_default("kelly_fraction", defaults.kelly_fraction)?
            .set_default("min_bet", defaults.min_bet)?
            .set_default("max_bet", defaults.max_bet)?
            .set_default(
                "max_concurrent_positions",
                defaults.max_concurrent_positions as i64,
            )?
            .set_default("cooldown_minutes", defaults.cooldown_minutes)?
            .set_default("entry_cooldown_seconds", defaults.entry_cooldown_seconds)?
            .set_default(
                "stop_loss_grace_period_seconds",
                defaults.stop_loss_grace_period_seconds,
            )?
            .set_default("daily_loss_limit", defaults.daily_loss_limit)?
            .set_default(
                "max_consecutive_losses",
                defaults.max_consecutive_losses as i64,
            )?
            .set_default("min_entry_price", defaults.min_entry_price)?
            .set_default("max_entry_price", defaults.max_entry_price)?
            .set_default("entry_deadline_minutes", defaults.entry_deadline_minutes)?
            .set_default("flip_guard_enabled", defaults.flip_guard_enabled)?
            .set_default("flip_guard_price", defaults.flip_guard_price)?
            .set_default("data_dir", defaults.data_dir.as_str())?
            .set_default("csv_enabled", defaults.csv_enabled)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (FLIPBOT_*)
            .add_source(Environment::with_prefix("FLIPBOT").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let engine_config: EngineConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        Ok(engine_config)
    }

    /// Generate a digest of the config for logging
    pub fn digest(&self) -> String {
        format!(
            "balance={:.2} fee_pct={:.2} kelly={:.2} bets=[{:.2},{:.2}] max_pos={} band=[{:.2},{:.2}] daily_limit={:.2}",
            self.initial_balance,
            self.fee_pct,
            self.kelly_fraction,
            self.min_bet,
            self.max_bet,
            self.max_concurrent_positions,
            self.min_entry_price,
            self.max_entry_price,
            self.daily_loss_limit
        )
    }
}

impl std::fmt::Display for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}
