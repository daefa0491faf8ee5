//! Feasibility converger.
//!
//! Final stage of the planning pipeline: splits the available funds
//! equally across the buy candidates and shrinks the list until every
//! remaining share clears the exchange minimum. A descending-elimination
//! fixed point — candidates are only ever dropped from the worst-ranked
//! end, never reordered. Bounded by the initial candidate count.

use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::types::Asset;

/// Split `available_funds` equally over the candidates, dropping the
/// worst-ranked candidate until every share clears that asset's minimum
/// spend. An asset with no known minimum never clears (fail closed).
///
/// Returns the spend map; empty when no allocation is feasible, which is
/// a valid do-nothing outcome rather than an error.
pub fn converge(
    available_funds: f64,
    mut candidates: Vec<Asset>,
    min_spend: &BTreeMap<Asset, f64>,
) -> BTreeMap<Asset, f64> {
    if available_funds <= 0.0 {
        if !candidates.is_empty() {
            warn!("No funds available, skipping all buys");
        }
        return BTreeMap::new();
    }

    while !candidates.is_empty() {
        let share = available_funds / candidates.len() as f64;
        let all_clear = candidates.iter().all(|asset| {
            share >= min_spend.get(asset).copied().unwrap_or(f64::INFINITY)
        });

        if all_clear {
            debug!(
                candidates = candidates.len(),
                share = format!("{share:.8}"),
                "Allocation accepted"
            );
            return candidates
                .into_iter()
                .map(|asset| (asset, share))
                .collect();
        }

        // Always drop the worst-ranked (last) candidate, regardless of
        // which share failed.
        if let Some(dropped) = candidates.pop() {
            debug!(
                asset = %dropped,
                share = format!("{share:.8}"),
                "Equal share below minimum, dropping worst-ranked candidate"
            );
        }
    }

    debug!("All buy candidates eliminated, empty spend map");
    BTreeMap::new()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
