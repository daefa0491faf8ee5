//! Configuration loading from TOML.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! All engine knobs live in `[trader]` and `[stagnation]`; the exchange
//! and database sections configure the collaborators the engine talks to.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub trader: TraderConfig,
    pub stagnation: StagnationConfig,
    pub exchange: ExchangeConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TraderConfig {
    /// Target number of held positions.
    pub k: usize,
    /// Lookback window for the growth ranking.
    pub growth_hours: i64,
    /// Minimum age of a position before it may be sold again.
    pub min_hold_hours: i64,
    /// Assets that must never be sold (they may still be bought).
    #[serde(default)]
    pub never_sell: Vec<String>,
    /// If true, plans are computed and logged but never executed.
    pub dry_run: bool,
    pub cycle_interval_secs: u64,
    /// Cooldown before the single retry of a failed collaborator call.
    pub retry_cooldown_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StagnationConfig {
    pub use_stagnation_detection: bool,
    /// Lookback window for the price-change computation.
    pub stagnation_hours: i64,
    /// Relative change below which an asset counts as stagnating.
    pub stagnation_threshold: f64,
    /// Selects the dynamic top-N strategy instead of the static threshold.
    pub use_dynamic_stagnation_detection: bool,
    /// How many top gainers are exempt from sale under the dynamic strategy.
    pub dynamic_top_nr: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExchangeConfig {
    /// The currency all valuations and spend amounts are denominated in.
    pub base_currency: String,
    /// Starting free funds for the paper exchange.
    pub paper_starting_funds: f64,
    /// Proportional fee charged by the paper exchange per fill.
    pub paper_fee: f64,
    /// Flat minimum notional enforced by the paper exchange, in base currency.
    pub paper_min_spend: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }
}
