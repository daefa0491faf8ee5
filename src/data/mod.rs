//! Data collaborators.
//!
//! The engine consumes two read-only feeds: the externally computed growth
//! ranking and the stored price history. Both are behind traits so tests
//! and alternative backends can substitute them; the SQLite readers here
//! are the production implementations. Ranking computation and sample
//! collection happen in a separate process that writes the same tables.

pub mod growth;
pub mod prices;

pub use growth::SqliteGrowthSource;
pub use prices::SqlitePriceHistory;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[cfg(test)]
use mockall::automock;

use crate::types::{Asset, GrowthEntry, PriceSample};

/// Source of the per-window growth ranking, best growth first.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait GrowthSource: Send + Sync {
    /// Ranked growth entries for the window, descending by score.
    async fn rank(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<GrowthEntry>>;
}

/// Source of historical price samples for stagnation computation.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PriceHistory: Send + Sync {
    /// Samples for the asset within the window, oldest first.
    /// An empty vector means no data — the engine resolves that by policy,
    /// it is not an error.
    async fn samples(
        &self,
        asset: &Asset,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PriceSample>>;
}
