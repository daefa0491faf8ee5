//! Exchange integrations.
//!
//! Defines the `ExchangeAdapter` trait — the capability contract the
//! engine requires from an exchange — and provides the in-process paper
//! exchange used for dry runs and simulation. Live venues implement the
//! same trait out of tree.

pub mod paper;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

#[cfg(test)]
use mockall::automock;

use crate::types::{Asset, TradeOutcome};

/// Abstraction over a spot exchange trading against a single base currency.
///
/// All valuations and amounts are denominated in the base currency.
/// Query methods may fail transiently; the engine retries each call once
/// before aborting the cycle. `sell_all` and `buy` are fire-and-forget:
/// the outcome is surfaced as a status, never awaited for confirmation.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    /// The currency all valuations and spend amounts are denominated in.
    fn base_currency(&self) -> Asset;

    /// Current non-zero balances with their base-currency valuation.
    /// May include the base currency itself; the engine strips it.
    async fn holdings_value(&self) -> Result<BTreeMap<Asset, f64>>;

    /// Uncommitted base currency available for purchases.
    async fn free_funds(&self) -> Result<f64>;

    /// Exchange-imposed minimum trade value for the asset, in base currency.
    async fn minimum_spend(&self, asset: &Asset) -> Result<f64>;

    /// Whether the exchange would accept a sell of the full held balance.
    /// `false` means the position is too small to sell at all.
    async fn can_sell(&self, asset: &Asset) -> Result<bool>;

    /// Whether the exchange would accept a buy of `amount` base currency.
    async fn can_buy(&self, asset: &Asset, amount: f64) -> Result<bool>;

    /// Timestamp of the most recent confirmed acquisition of the asset.
    /// `None` when no buy is on record (e.g. deposited balances).
    async fn last_acquired(&self, asset: &Asset) -> Result<Option<DateTime<Utc>>>;

    /// Liquidate the full balance of the asset at market.
    async fn sell_all(&self, asset: &Asset) -> Result<TradeOutcome>;

    /// Spend `amount` base currency on the asset at market.
    async fn buy(&self, asset: &Asset, amount: f64) -> Result<TradeOutcome>;
}
