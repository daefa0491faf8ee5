//! Sell eligibility filter.
//!
//! First stage of the planning pipeline: decides which held assets may be
//! sold this cycle at all. Pure function of the frozen holdings snapshot —
//! decisions are computed in one pass and materialised afterwards, never
//! by mutating a list mid-scan.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeSet;
use tracing::debug;

use crate::types::{Asset, Holding};

pub struct EligibilityConfig {
    /// Assets that must never be sold.
    pub never_sell: BTreeSet<Asset>,
    /// Minimum age of a position before it may be sold again.
    pub min_hold: Duration,
}

/// Outcome of the eligibility pass.
#[derive(Debug, Default)]
pub struct Eligibility {
    /// Assets that may be offered to the stagnation classifier.
    pub sell_candidates: BTreeSet<Asset>,
    /// Held positions that cannot be sold this cycle but still fill a
    /// target position (too young to sell).
    pub occupied: BTreeSet<Asset>,
}

/// Classify every held asset as sell candidate, occupied slot, or ignored.
///
/// - never-sell assets are excluded from consideration entirely;
/// - positions the exchange reports as unsellable (dust) are dropped and
///   fill no slot;
/// - positions younger than the minimum hold duration become occupied
///   slots;
/// - everything else is a sell candidate.
pub fn filter_holdings(
    holdings: &[Holding],
    cfg: &EligibilityConfig,
    now: DateTime<Utc>,
) -> Eligibility {
    let cutoff = now - cfg.min_hold;
    let mut result = Eligibility::default();

    for holding in holdings {
        if cfg.never_sell.contains(&holding.asset) {
            debug!(asset = %holding.asset, "Never-sell asset, excluded from sale");
            continue;
        }
        if !holding.can_sell {
            debug!(asset = %holding.asset, value = holding.value, "Too small to sell, ignored");
            continue;
        }
        let too_young = holding
            .last_acquired
            .map(|acquired| acquired > cutoff)
            .unwrap_or(false);
        if too_young {
            debug!(asset = %holding.asset, "Too young to sell, occupies a slot");
            result.occupied.insert(holding.asset.clone());
        } else {
            result.sell_candidates.insert(holding.asset.clone());
        }
    }

    result
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
