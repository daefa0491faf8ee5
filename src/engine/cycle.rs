//! Cycle orchestrator.
//!
//! Runs one rebalancing evaluation end to end: freeze an input snapshot
//! from the collaborators, run eligibility → stagnation → allocation →
//! convergence over it, then execute the plan (sales before purchases).
//! Exactly one cycle may be active per account; the main loop provides
//! that by running cycles strictly in sequence.
//!
//! Every collaborator call is retried once after a fixed cooldown. A
//! second failure aborts the whole cycle with no plan and no orders —
//! better to skip a cycle than to act on stale or partial data.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use futures::future;
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use tracing::{info, warn};

use super::allocation;
use super::convergence;
use super::eligibility::{self, EligibilityConfig};
use super::stagnation::{self, relative_change, StagnationMode};
use crate::config::AppConfig;
use crate::data::{GrowthSource, PriceHistory};
use crate::exchange::ExchangeAdapter;
use crate::types::{Asset, CycleError, Holding, RebalancePlan, Side, TradeOutcome};

// ---------------------------------------------------------------------------
// Engine configuration
// ---------------------------------------------------------------------------

/// Frozen engine settings for the lifetime of the bot.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Target number of held positions.
    pub k: usize,
    pub growth_window: Duration,
    pub min_hold: Duration,
    pub never_sell: BTreeSet<Asset>,
    pub stagnation: StagnationMode,
    pub stagnation_window: Duration,
    pub dry_run: bool,
    pub retry_cooldown: std::time::Duration,
}

impl EngineConfig {
    /// Derive the engine settings from the application config.
    pub fn from_app(cfg: &AppConfig) -> Self {
        let stagnation = if cfg.stagnation.use_dynamic_stagnation_detection {
            if cfg.stagnation.use_stagnation_detection {
                warn!("Both stagnation strategies configured, using dynamic top-N");
            }
            StagnationMode::DynamicTopN {
                top_n: cfg.stagnation.dynamic_top_nr,
            }
        } else if cfg.stagnation.use_stagnation_detection {
            StagnationMode::Static {
                threshold: cfg.stagnation.stagnation_threshold,
            }
        } else {
            StagnationMode::Disabled
        };

        Self {
            k: cfg.trader.k,
            growth_window: Duration::hours(cfg.trader.growth_hours),
            min_hold: Duration::hours(cfg.trader.min_hold_hours),
            never_sell: cfg
                .trader
                .never_sell
                .iter()
                .map(|s| Asset::new(s.as_str()))
                .collect(),
            stagnation,
            stagnation_window: Duration::hours(cfg.stagnation.stagnation_hours),
            dry_run: cfg.trader.dry_run,
            retry_cooldown: std::time::Duration::from_secs(cfg.trader.retry_cooldown_secs),
        }
    }
}

// ---------------------------------------------------------------------------
// Cycle report
// ---------------------------------------------------------------------------

/// An order the exchange refused or failed during execution.
#[derive(Debug, Clone)]
pub struct FailedOrder {
    pub asset: Asset,
    pub side: Side,
    pub reason: String,
}

/// Result of one completed cycle.
#[derive(Debug)]
pub struct CycleReport {
    pub plan: RebalancePlan,
    pub holdings_seen: usize,
    pub sell_candidates: usize,
    pub occupied_slots: usize,
    pub available_funds: f64,
    pub executed: Vec<TradeOutcome>,
    pub failed: Vec<FailedOrder>,
    pub dry_run: bool,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Sequences the planning pipeline once per evaluation cycle and hands the
/// resulting plan to the exchange.
pub struct Rebalancer {
    cfg: EngineConfig,
}

impl Rebalancer {
    pub fn new(cfg: EngineConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    /// Call a collaborator, retrying once after the cooldown on failure.
    async fn with_retry<T, F, Fut>(&self, what: &'static str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match op().await {
            Ok(value) => Ok(value),
            Err(first) => {
                warn!(
                    what,
                    error = %first,
                    cooldown_ms = self.cfg.retry_cooldown.as_millis() as u64,
                    "Collaborator call failed, retrying once"
                );
                tokio::time::sleep(self.cfg.retry_cooldown).await;
                op().await.with_context(|| format!("{what} failed twice"))
            }
        }
    }

    /// Run one complete evaluation cycle against a frozen input snapshot.
    pub async fn run_cycle(
        &self,
        exchange: &dyn ExchangeAdapter,
        growth: &dyn GrowthSource,
        prices: &dyn PriceHistory,
        now: DateTime<Utc>,
    ) -> Result<CycleReport, CycleError> {
        let exchange_err = |e: anyhow::Error| CycleError::ExchangeUnavailable(format!("{e:#}"));

        // -- Frozen snapshot ---------------------------------------------

        let base = exchange.base_currency();
        let mut values = self
            .with_retry("holdings valuation", || exchange.holdings_value())
            .await
            .map_err(exchange_err)?;
        // The base currency funds purchases, it is never a position.
        values.remove(&base);

        let free_funds = self
            .with_retry("free funds", || exchange.free_funds())
            .await
            .map_err(exchange_err)?;

        let mut holdings = Vec::with_capacity(values.len());
        for (asset, value) in &values {
            let can_sell = self
                .with_retry("sell capability", || exchange.can_sell(asset))
                .await
                .map_err(exchange_err)?;
            let last_acquired = self
                .with_retry("last acquisition", || exchange.last_acquired(asset))
                .await
                .map_err(exchange_err)?;
            holdings.push(Holding {
                asset: asset.clone(),
                value: *value,
                can_sell,
                last_acquired,
            });
        }

        let ranking = self
            .with_retry("growth ranking", || {
                growth.rank(now - self.cfg.growth_window, now)
            })
            .await
            .map_err(|e| CycleError::RankingUnavailable(format!("{e:#}")))?;

        info!(
            holdings = holdings.len(),
            free_funds = format!("{free_funds:.8}"),
            ranking = ranking.len(),
            "Cycle snapshot frozen"
        );

        // -- Eligibility --------------------------------------------------

        let eligibility = eligibility::filter_holdings(
            &holdings,
            &EligibilityConfig {
                never_sell: self.cfg.never_sell.clone(),
                min_hold: self.cfg.min_hold,
            },
            now,
        );
        let sell_candidates = eligibility.sell_candidates.len();

        let sellable: BTreeSet<Asset> = holdings
            .iter()
            .filter(|h| h.can_sell)
            .map(|h| h.asset.clone())
            .collect();

        // -- Stagnation ---------------------------------------------------

        let classification = if self.cfg.stagnation == StagnationMode::Disabled {
            stagnation::classify(
                StagnationMode::Disabled,
                &eligibility.sell_candidates,
                &[],
                &BTreeMap::new(),
            )
        } else {
            // The static strategy only inspects the candidates; dynamic
            // ranks the whole universe (ranking order, then held assets
            // missing from the ranking).
            let universe: Vec<Asset> = match self.cfg.stagnation {
                StagnationMode::DynamicTopN { .. } => {
                    let mut universe: Vec<Asset> =
                        ranking.iter().map(|e| e.asset.clone()).collect();
                    for holding in &holdings {
                        if !universe.contains(&holding.asset) {
                            universe.push(holding.asset.clone());
                        }
                    }
                    universe
                }
                _ => eligibility.sell_candidates.iter().cloned().collect(),
            };

            // Per-asset fetches are independent; a failure in any one
            // aborts the cycle either way.
            let window_start = now - self.cfg.stagnation_window;
            let fetches = universe.iter().map(|asset| {
                self.with_retry("price samples", move || {
                    prices.samples(asset, window_start, now)
                })
            });
            let windows = future::try_join_all(fetches)
                .await
                .map_err(|e| CycleError::PriceHistoryUnavailable(format!("{e:#}")))?;

            let changes: BTreeMap<Asset, Option<f64>> = universe
                .iter()
                .cloned()
                .zip(windows.iter().map(|samples| relative_change(samples)))
                .collect();

            stagnation::classify(
                self.cfg.stagnation,
                &eligibility.sell_candidates,
                &universe,
                &changes,
            )
        };

        let mut occupied = eligibility.occupied;
        occupied.extend(classification.newly_occupied.iter().cloned());
        let occupied_slots = occupied.len();

        // -- Allocation ---------------------------------------------------

        let allocation = allocation::plan_buys(
            &ranking,
            classification.sell,
            &occupied,
            &sellable,
            self.cfg.k,
        );

        // -- Convergence --------------------------------------------------

        let sell_value: f64 = allocation
            .sell
            .iter()
            .map(|a| values.get(a).copied().unwrap_or(0.0))
            .sum();
        let available_funds = sell_value + free_funds;

        let mut min_spend: BTreeMap<Asset, f64> = BTreeMap::new();
        for asset in &allocation.buys {
            let min = self
                .with_retry("minimum spend", || exchange.minimum_spend(asset))
                .await
                .map_err(exchange_err)?;
            min_spend.insert(asset.clone(), min);
        }

        let spend = convergence::converge(available_funds, allocation.buys, &min_spend);
        let plan = RebalancePlan {
            sell: allocation.sell,
            spend,
        };

        info!(
            plan = %plan,
            available = format!("{available_funds:.8}"),
            occupied = occupied_slots,
            "Plan constructed"
        );

        // -- Execution ----------------------------------------------------

        let (executed, failed) = if self.cfg.dry_run {
            info!(plan = %plan, "[DRY RUN] Plan not executed");
            (Vec::new(), Vec::new())
        } else {
            self.execute(exchange, &plan).await
        };

        Ok(CycleReport {
            plan,
            holdings_seen: holdings.len(),
            sell_candidates,
            occupied_slots,
            available_funds,
            executed,
            failed,
            dry_run: self.cfg.dry_run,
        })
    }

    /// Execute a constructed plan: liquidate every sell in full, then
    /// issue the purchases, so sale proceeds are available as funds.
    /// Individual order failures are recorded and never stop the batch.
    async fn execute(
        &self,
        exchange: &dyn ExchangeAdapter,
        plan: &RebalancePlan,
    ) -> (Vec<TradeOutcome>, Vec<FailedOrder>) {
        let mut executed = Vec::new();
        let mut failed = Vec::new();

        for asset in &plan.sell {
            match exchange.sell_all(asset).await {
                Ok(outcome) => {
                    info!(
                        asset = %asset,
                        proceeds = format!("{:.8}", outcome.amount),
                        "Sold full balance"
                    );
                    executed.push(outcome);
                }
                Err(e) => {
                    warn!(asset = %asset, error = %e, "Sell failed");
                    failed.push(FailedOrder {
                        asset: asset.clone(),
                        side: Side::Sell,
                        reason: e.to_string(),
                    });
                }
            }
        }

        for (asset, amount) in &plan.spend {
            match exchange.can_buy(asset, *amount).await {
                Ok(true) => {}
                Ok(false) => {
                    warn!(
                        asset = %asset,
                        amount = format!("{amount:.8}"),
                        "Buy rejected by exchange, skipping"
                    );
                    failed.push(FailedOrder {
                        asset: asset.clone(),
                        side: Side::Buy,
                        reason: "rejected by exchange minimum".to_string(),
                    });
                    continue;
                }
                Err(e) => {
                    warn!(asset = %asset, error = %e, "Buy capability check failed, skipping");
                    failed.push(FailedOrder {
                        asset: asset.clone(),
                        side: Side::Buy,
                        reason: e.to_string(),
                    });
                    continue;
                }
            }

            match exchange.buy(asset, *amount).await {
                Ok(outcome) => {
                    info!(
                        asset = %asset,
                        spend = format!("{amount:.8}"),
                        "Buy issued"
                    );
                    executed.push(outcome);
                }
                Err(e) => {
                    warn!(asset = %asset, error = %e, "Buy failed");
                    failed.push(FailedOrder {
                        asset: asset.clone(),
                        side: Side::Buy,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            executed = executed.len(),
            failed = failed.len(),
            "Plan execution complete"
        );

        (executed, failed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
