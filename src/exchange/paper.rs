//! Paper exchange.
//!
//! An in-process `ExchangeAdapter` that fills orders against the stored
//! price history instead of a live venue. Used for dry runs, simulation,
//! and integration tests. Charges a proportional fee per fill and
//! enforces a flat minimum notional, mirroring real spot exchanges.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

use super::ExchangeAdapter;
use crate::data::PriceHistory;
use crate::types::{Asset, Side, TradeOutcome};

/// How far back to look for the most recent price when valuing a position.
const PRICE_LOOKBACK_HOURS: i64 = 48;

#[derive(Debug, Clone)]
struct PaperPosition {
    amount: f64,
    last_acquired: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct Book {
    funds: f64,
    positions: BTreeMap<Asset, PaperPosition>,
}

/// Simulated exchange trading against a single base currency.
pub struct PaperExchange {
    base: Asset,
    fee: f64,
    min_spend: f64,
    prices: Arc<dyn PriceHistory>,
    book: Mutex<Book>,
}

impl PaperExchange {
    pub fn new(
        base: Asset,
        starting_funds: f64,
        fee: f64,
        min_spend: f64,
        prices: Arc<dyn PriceHistory>,
    ) -> Self {
        Self {
            base,
            fee,
            min_spend,
            prices,
            book: Mutex::new(Book {
                funds: starting_funds,
                positions: BTreeMap::new(),
            }),
        }
    }

    /// Seed a held position directly (simulation setup and tests).
    pub fn seed_position(
        &self,
        asset: Asset,
        amount: f64,
        last_acquired: Option<DateTime<Utc>>,
    ) {
        let mut book = self.book.lock().unwrap();
        book.positions.insert(
            asset,
            PaperPosition {
                amount,
                last_acquired,
            },
        );
    }

    /// Most recent stored price for the asset, if any.
    async fn latest_price(&self, asset: &Asset) -> Result<Option<f64>> {
        let now = Utc::now();
        let samples = self
            .prices
            .samples(asset, now - Duration::hours(PRICE_LOOKBACK_HOURS), now)
            .await
            .with_context(|| format!("Price lookup failed for {asset}"))?;
        Ok(samples.last().map(|s| s.price))
    }

    async fn price_or_fail(&self, asset: &Asset) -> Result<f64> {
        self.latest_price(asset)
            .await?
            .ok_or_else(|| anyhow!("No recent price for {asset}"))
    }
}

#[async_trait]
impl ExchangeAdapter for PaperExchange {
    fn base_currency(&self) -> Asset {
        self.base.clone()
    }

    async fn holdings_value(&self) -> Result<BTreeMap<Asset, f64>> {
        let positions: Vec<(Asset, f64)> = {
            let book = self.book.lock().unwrap();
            book.positions
                .iter()
                .filter(|(_, p)| p.amount > 0.0)
                .map(|(a, p)| (a.clone(), p.amount))
                .collect()
        };

        let mut values = BTreeMap::new();
        for (asset, amount) in positions {
            let price = self.price_or_fail(&asset).await?;
            values.insert(asset, amount * price);
        }
        Ok(values)
    }

    async fn free_funds(&self) -> Result<f64> {
        Ok(self.book.lock().unwrap().funds)
    }

    async fn minimum_spend(&self, _asset: &Asset) -> Result<f64> {
        Ok(self.min_spend)
    }

    async fn can_sell(&self, asset: &Asset) -> Result<bool> {
        let amount = {
            let book = self.book.lock().unwrap();
            match book.positions.get(asset) {
                Some(p) if p.amount > 0.0 => p.amount,
                _ => return Ok(false),
            }
        };
        match self.latest_price(asset).await? {
            Some(price) => Ok(amount * price >= self.min_spend),
            None => {
                warn!(asset = %asset, "No recent price, treating position as unsellable");
                Ok(false)
            }
        }
    }

    async fn can_buy(&self, asset: &Asset, amount: f64) -> Result<bool> {
        if amount < self.min_spend {
            return Ok(false);
        }
        Ok(self.latest_price(asset).await?.is_some())
    }

    async fn last_acquired(&self, asset: &Asset) -> Result<Option<DateTime<Utc>>> {
        let book = self.book.lock().unwrap();
        Ok(book.positions.get(asset).and_then(|p| p.last_acquired))
    }

    async fn sell_all(&self, asset: &Asset) -> Result<TradeOutcome> {
        let price = self.price_or_fail(asset).await?;

        let mut book = self.book.lock().unwrap();
        let position = book
            .positions
            .remove(asset)
            .filter(|p| p.amount > 0.0)
            .ok_or_else(|| anyhow!("No {asset} balance to sell"))?;

        let proceeds = position.amount * price * (1.0 - self.fee);
        book.funds += proceeds;

        info!(
            asset = %asset,
            amount = position.amount,
            proceeds = format!("{proceeds:.8}"),
            "Paper sell filled"
        );

        Ok(TradeOutcome {
            order_id: format!("paper-{}", Uuid::new_v4()),
            asset: asset.clone(),
            side: Side::Sell,
            amount: proceeds,
            at: Utc::now(),
        })
    }

    async fn buy(&self, asset: &Asset, amount: f64) -> Result<TradeOutcome> {
        if amount < self.min_spend {
            anyhow::bail!("Buy of {asset} for {amount:.8} is below the exchange minimum");
        }
        let price = self.price_or_fail(asset).await?;

        let mut book = self.book.lock().unwrap();
        if book.funds < amount {
            anyhow::bail!(
                "Insufficient funds: need {amount:.8}, have {:.8}",
                book.funds
            );
        }
        book.funds -= amount;

        let coins = amount * (1.0 - self.fee) / price;
        let now = Utc::now();
        let entry = book.positions.entry(asset.clone()).or_insert(PaperPosition {
            amount: 0.0,
            last_acquired: None,
        });
        entry.amount += coins;
        entry.last_acquired = Some(now);

        info!(
            asset = %asset,
            spend = format!("{amount:.8}"),
            coins = format!("{coins:.8}"),
            "Paper buy filled"
        );

        Ok(TradeOutcome {
            order_id: format!("paper-{}", Uuid::new_v4()),
            asset: asset.clone(),
            side: Side::Buy,
            amount,
            at: now,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
