//! SQLite-backed growth ranking reader.
//!
//! The signal collector writes one scored row per asset per observation
//! interval into `growth_signal`. This reader aggregates the scores over
//! the requested window and returns them ordered best-first, which is the
//! "already ranked" sequence the engine consumes.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use super::GrowthSource;
use crate::types::{Asset, GrowthEntry};

/// Create the `growth_signal` table if it does not exist.
///
/// Timestamps are stored as unix seconds.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS growth_signal (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            symbol TEXT NOT NULL,
            observed_at INTEGER NOT NULL,
            score REAL NOT NULL
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create growth_signal table")?;
    Ok(())
}

/// Insert a single growth observation (used by the collector and tests).
pub async fn insert_signal(
    pool: &SqlitePool,
    asset: &Asset,
    observed_at: DateTime<Utc>,
    score: f64,
) -> Result<()> {
    sqlx::query("INSERT INTO growth_signal (symbol, observed_at, score) VALUES (?, ?, ?)")
        .bind(asset.as_str())
        .bind(observed_at.timestamp())
        .bind(score)
        .execute(pool)
        .await
        .context("Failed to insert growth signal")?;
    Ok(())
}

/// Growth ranking read from the shared SQLite database.
pub struct SqliteGrowthSource {
    pool: SqlitePool,
}

impl SqliteGrowthSource {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GrowthSource for SqliteGrowthSource {
    async fn rank(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<GrowthEntry>> {
        let rows: Vec<(String, f64)> = sqlx::query_as(
            "SELECT symbol, AVG(score) AS score
             FROM growth_signal
             WHERE observed_at >= ? AND observed_at <= ?
             GROUP BY symbol
             ORDER BY score DESC",
        )
        .bind(start.timestamp())
        .bind(end.timestamp())
        .fetch_all(&self.pool)
        .await
        .context("Failed to query growth ranking")?;

        debug!(
            entries = rows.len(),
            window_start = start.timestamp(),
            window_end = end.timestamp(),
            "Growth ranking loaded"
        );

        Ok(rows
            .into_iter()
            .enumerate()
            .map(|(rank, (symbol, score))| GrowthEntry {
                asset: Asset::new(symbol),
                score,
                rank,
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
