//! Allocation planner.
//!
//! Third stage of the planning pipeline: turns the growth ranking and the
//! final sell set into an ordered buy-candidate list, resolving wash-trade
//! conflicts and occupied slots. The ranking tail beyond the initial
//! candidates is an explicit backfill queue consumed only by the
//! substitution step here.

use std::collections::{BTreeSet, VecDeque};
use tracing::{debug, info};

use crate::types::{Asset, GrowthEntry};

/// Outcome of the allocation pass.
#[derive(Debug)]
pub struct Allocation {
    /// Sell set after wash-trade cancellations.
    pub sell: BTreeSet<Asset>,
    /// Buy candidates ordered by growth rank, worst-ranked last.
    pub buys: Vec<Asset>,
}

/// Build the buy-candidate list from the ranking.
///
/// `buy_count = max(k - occupied, 0)` leading ranking entries seed the
/// candidate list; the remainder forms the backfill queue. Candidates are
/// then resolved in rank order:
///
/// - wash-trade cancellation is checked first: a candidate that is also in
///   the sell set (and independently sellable) cancels both sides — the
///   retained holding fills the slot and no backfill entry is consumed;
/// - a candidate that is an occupied slot is replaced by the next backfill
///   entry, which goes through the same resolution.
pub fn plan_buys(
    ranking: &[GrowthEntry],
    mut sell: BTreeSet<Asset>,
    occupied: &BTreeSet<Asset>,
    sellable: &BTreeSet<Asset>,
    k: usize,
) -> Allocation {
    let buy_count = k.saturating_sub(occupied.len());
    debug!(
        k,
        occupied = occupied.len(),
        buy_count,
        ranking = ranking.len(),
        "Planning buys"
    );

    let mut worklist: VecDeque<Asset> = ranking
        .iter()
        .take(buy_count)
        .map(|e| e.asset.clone())
        .collect();
    let mut backfill: VecDeque<Asset> = ranking
        .iter()
        .skip(buy_count)
        .map(|e| e.asset.clone())
        .collect();

    let mut buys: Vec<Asset> = Vec::new();
    while let Some(asset) = worklist.pop_front() {
        if sell.contains(&asset) {
            if sellable.contains(&asset) {
                info!(asset = %asset, "Prevented sell and rebuy, holding retained");
                sell.remove(&asset);
                continue;
            }
            // Unsellable entries never reach the sell set; if one does,
            // keep the sale off the books and substitute the buy.
            sell.remove(&asset);
            if let Some(next) = backfill.pop_front() {
                worklist.push_back(next);
            }
            continue;
        }
        if occupied.contains(&asset) {
            debug!(asset = %asset, "Already held, substituting from backfill");
            if let Some(next) = backfill.pop_front() {
                worklist.push_back(next);
            }
            continue;
        }
        buys.push(asset);
    }

    Allocation { sell, buys }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
