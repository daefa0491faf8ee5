//! Stagnation classifier.
//!
//! Second stage of the planning pipeline: narrows the sell candidates to
//! assets whose price trend justifies selling. Two mutually exclusive
//! strategies — a static per-asset threshold and a dynamic top-N gainer
//! exemption. Pure function of a precomputed price-change view; the
//! orchestrator fetches the samples and computes the changes.

use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use crate::types::{Asset, PriceSample};

/// Which stagnation strategy is in effect.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StagnationMode {
    /// Every eligible candidate is sold; no trend check.
    Disabled,
    /// Sell a candidate only when its relative change over the window is
    /// below the threshold.
    Static { threshold: f64 },
    /// Exempt the N strongest gainers across the whole universe from sale,
    /// regardless of any individual threshold.
    DynamicTopN { top_n: usize },
}

/// Outcome of the classification pass.
#[derive(Debug, Default)]
pub struct Classification {
    /// Candidates confirmed as stagnating — the final sell set.
    pub sell: BTreeSet<Asset>,
    /// Candidates exempted from sale; their held positions still fill a
    /// target position each.
    pub newly_occupied: BTreeSet<Asset>,
}

/// Relative price change over an ordered window of samples.
///
/// `None` when the window is empty or the oldest price is unusable;
/// callers resolve that by policy.
pub fn relative_change(samples: &[PriceSample]) -> Option<f64> {
    let oldest = samples.first()?;
    let newest = samples.last()?;
    if oldest.price <= 0.0 {
        return None;
    }
    Some((newest.price - oldest.price) / oldest.price)
}

/// Split the sell candidates into stagnating (sell) and rising (exempt).
///
/// `changes` maps each relevant asset to its relative change over the
/// lookback window, `None` marking missing price data. `universe` is the
/// ordered set of assets the dynamic strategy ranks (ranking order first);
/// the static strategy only consults the candidates themselves.
pub fn classify(
    mode: StagnationMode,
    candidates: &BTreeSet<Asset>,
    universe: &[Asset],
    changes: &BTreeMap<Asset, Option<f64>>,
) -> Classification {
    match mode {
        StagnationMode::Disabled => Classification {
            sell: candidates.clone(),
            newly_occupied: BTreeSet::new(),
        },
        StagnationMode::Static { threshold } => {
            classify_static(candidates, changes, threshold)
        }
        StagnationMode::DynamicTopN { top_n } => {
            classify_dynamic(candidates, universe, changes, top_n)
        }
    }
}

fn classify_static(
    candidates: &BTreeSet<Asset>,
    changes: &BTreeMap<Asset, Option<f64>>,
    threshold: f64,
) -> Classification {
    let mut result = Classification::default();

    for asset in candidates {
        match changes.get(asset).copied().flatten() {
            Some(change) if change < threshold => {
                debug!(
                    asset = %asset,
                    change = format!("{change:+.4}"),
                    threshold,
                    "Stagnating, eligible to sell"
                );
                result.sell.insert(asset.clone());
            }
            Some(change) => {
                debug!(
                    asset = %asset,
                    change = format!("{change:+.4}"),
                    threshold,
                    "Rising, exempt from sale"
                );
                result.newly_occupied.insert(asset.clone());
            }
            None => {
                // Fail safe: without data we do not sell.
                warn!(asset = %asset, "No price data in window, not selling");
                result.newly_occupied.insert(asset.clone());
            }
        }
    }

    result
}

fn classify_dynamic(
    candidates: &BTreeSet<Asset>,
    universe: &[Asset],
    changes: &BTreeMap<Asset, Option<f64>>,
    top_n: usize,
) -> Classification {
    // Missing data ranks first as a gainer and is never considered
    // stagnating.
    let mut scored: Vec<(&Asset, f64)> = universe
        .iter()
        .map(|asset| {
            let change = match changes.get(asset).copied().flatten() {
                Some(c) => c,
                None => {
                    warn!(asset = %asset, "No price data in window, ranking as gainer");
                    f64::INFINITY
                }
            };
            (asset, change)
        })
        .collect();

    // Stable sort: equal changes keep universe order.
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let exempt: BTreeSet<&Asset> = scored.iter().take(top_n).map(|(a, _)| *a).collect();
    debug!(
        exempt = exempt.len(),
        universe = universe.len(),
        "Dynamic top-N exemption computed"
    );

    let mut result = Classification::default();
    for asset in candidates {
        if exempt.contains(asset) {
            result.newly_occupied.insert(asset.clone());
        } else {
            result.sell.insert(asset.clone());
        }
    }
    result
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
