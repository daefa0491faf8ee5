//! Shared types for the rebalancer.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that exchange, data, and engine
//! modules can depend on them without circular references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Asset
// ---------------------------------------------------------------------------

/// A tradeable symbol paired against the configured base currency.
///
/// Identity is the uppercase ticker symbol ("ETH", "LTC", ...). The base
/// currency itself is never an `Asset` from the engine's point of view.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Asset(String);

impl Asset {
    pub fn new(symbol: impl Into<String>) -> Self {
        Asset(symbol.into().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Asset {
    fn from(s: &str) -> Self {
        Asset::new(s)
    }
}

// ---------------------------------------------------------------------------
// Holdings
// ---------------------------------------------------------------------------

/// A held position as the engine sees it at cycle start.
///
/// The exchange owns the raw balance; the engine only needs the
/// base-currency valuation, whether the exchange would accept a sell at
/// all, and when the position was last acquired. `last_acquired` is `None`
/// for balances with no recorded buy (e.g. deposits), which the engine
/// treats as old enough to sell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Holding {
    pub asset: Asset,
    /// Valuation in base currency.
    pub value: f64,
    /// Whether the exchange would accept a sell order for the full balance.
    pub can_sell: bool,
    pub last_acquired: Option<DateTime<Utc>>,
}

impl fmt::Display for Holding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (value {:.8}, sellable: {})",
            self.asset, self.value, self.can_sell
        )
    }
}

// ---------------------------------------------------------------------------
// Growth ranking
// ---------------------------------------------------------------------------

/// One entry of the externally computed growth ranking.
///
/// Produced fresh each cycle by the ranking source, ordered descending by
/// score; `rank` is the zero-based position in that ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthEntry {
    pub asset: Asset,
    pub score: f64,
    pub rank: usize,
}

impl fmt::Display for GrowthEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {} ({:+.4})", self.rank + 1, self.asset, self.score)
    }
}

// ---------------------------------------------------------------------------
// Price history
// ---------------------------------------------------------------------------

/// A single observed price for an asset at a point in time.
///
/// Samples are consumed as ordered windows for stagnation computation and
/// discarded after the cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSample {
    pub asset: Asset,
    pub at: DateTime<Utc>,
    /// Price in base currency.
    pub price: f64,
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// The output of one rebalancing cycle: which assets to liquidate and how
/// much base currency to spend on each acquisition.
///
/// Invariants upheld by the engine:
/// - no never-sell asset appears in `sell`;
/// - `sell` and `spend` key sets are disjoint;
/// - `sum(spend)` never exceeds the value of `sell` plus free funds;
/// - every `spend` value clears the exchange minimum for its asset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RebalancePlan {
    pub sell: BTreeSet<Asset>,
    pub spend: BTreeMap<Asset, f64>,
}

impl RebalancePlan {
    pub fn total_spend(&self) -> f64 {
        self.spend.values().sum()
    }

    /// A plan with nothing to sell and nothing to buy (a skipped cycle or
    /// convergence exhaustion).
    pub fn is_empty(&self) -> bool {
        self.sell.is_empty() && self.spend.is_empty()
    }
}

impl fmt::Display for RebalancePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sells: Vec<&str> = self.sell.iter().map(|a| a.as_str()).collect();
        let spends: Vec<String> = self
            .spend
            .iter()
            .map(|(a, v)| format!("{a}: {v:.8}"))
            .collect();
        write!(
            f,
            "sell [{}] | spend {{{}}} (total {:.8})",
            sells.join(", "),
            spends.join(", "),
            self.total_spend(),
        )
    }
}

// ---------------------------------------------------------------------------
// Trade outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => f.write_str("buy"),
            Side::Sell => f.write_str("sell"),
        }
    }
}

/// Receipt for a single executed order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeOutcome {
    pub order_id: String,
    pub asset: Asset,
    pub side: Side,
    /// Base-currency amount: spend for buys, proceeds for sells.
    pub amount: f64,
    pub at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Bot state
// ---------------------------------------------------------------------------

/// Persistent counters across restarts. Saved after every cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotState {
    pub cycle_count: u64,
    pub plans_executed: u64,
    pub sells_executed: u64,
    pub buys_executed: u64,
    pub orders_failed: u64,
    pub started_at: DateTime<Utc>,
    pub last_cycle_at: Option<DateTime<Utc>>,
    /// The most recent non-empty plan, kept for inspection.
    pub last_plan: Option<RebalancePlan>,
}

impl BotState {
    pub fn new() -> Self {
        Self {
            cycle_count: 0,
            plans_executed: 0,
            sells_executed: 0,
            buys_executed: 0,
            orders_failed: 0,
            started_at: Utc::now(),
            last_cycle_at: None,
            last_plan: None,
        }
    }
}

impl Default for BotState {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Cycle errors
// ---------------------------------------------------------------------------

/// Reasons a cycle aborts without emitting a plan.
///
/// Each variant means a collaborator failed twice (the initial call plus
/// one retry after the cooldown). The cycle is skipped; the next scheduled
/// cycle starts over with fresh data.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("exchange unavailable: {0}")]
    ExchangeUnavailable(String),
    #[error("growth ranking unavailable: {0}")]
    RankingUnavailable(String),
    #[error("price history unavailable: {0}")]
    PriceHistoryUnavailable(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
