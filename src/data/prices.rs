//! SQLite-backed price history reader.
//!
//! The price collector writes one row per asset per observation into
//! `price_sample`. The engine only ever reads ordered windows; samples
//! are not retained past the cycle that fetched them.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use super::PriceHistory;
use crate::types::{Asset, PriceSample};

/// Create the `price_sample` table if it does not exist.
///
/// Timestamps are stored as unix seconds.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS price_sample (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            symbol TEXT NOT NULL,
            observed_at INTEGER NOT NULL,
            price REAL NOT NULL
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create price_sample table")?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_price_sample_symbol_time
         ON price_sample (symbol, observed_at)",
    )
    .execute(pool)
    .await
    .context("Failed to create price_sample index")?;
    Ok(())
}

/// Insert a single price observation (used by the collector and tests).
pub async fn insert_sample(
    pool: &SqlitePool,
    asset: &Asset,
    observed_at: DateTime<Utc>,
    price: f64,
) -> Result<()> {
    sqlx::query("INSERT INTO price_sample (symbol, observed_at, price) VALUES (?, ?, ?)")
        .bind(asset.as_str())
        .bind(observed_at.timestamp())
        .bind(price)
        .execute(pool)
        .await
        .context("Failed to insert price sample")?;
    Ok(())
}

/// Price history read from the shared SQLite database.
pub struct SqlitePriceHistory {
    pool: SqlitePool,
}

impl SqlitePriceHistory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PriceHistory for SqlitePriceHistory {
    async fn samples(
        &self,
        asset: &Asset,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PriceSample>> {
        let rows: Vec<(i64, f64)> = sqlx::query_as(
            "SELECT observed_at, price
             FROM price_sample
             WHERE symbol = ? AND observed_at >= ? AND observed_at <= ?
             ORDER BY observed_at ASC",
        )
        .bind(asset.as_str())
        .bind(start.timestamp())
        .bind(end.timestamp())
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to query price samples for {asset}"))?;

        debug!(asset = %asset, samples = rows.len(), "Price samples loaded");

        Ok(rows
            .into_iter()
            .map(|(ts, price)| PriceSample {
                asset: asset.clone(),
                at: Utc.timestamp_opt(ts, 0).single().unwrap_or_else(Utc::now),
                price,
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
