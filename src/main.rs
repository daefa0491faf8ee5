//! REBALANCER — Autonomous Portfolio Rebalancing Bot
//!
//! Entry point. Loads configuration, initialises structured logging,
//! restores state from disk (or creates fresh), and runs the main
//! evaluate→plan→execute loop with graceful shutdown.

use anyhow::Result;
use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use rebalancer::config;
use rebalancer::data::{growth, prices, SqliteGrowthSource, SqlitePriceHistory};
use rebalancer::engine::{CycleReport, EngineConfig, Rebalancer};
use rebalancer::exchange::paper::PaperExchange;
use rebalancer::storage;
use rebalancer::types::{Asset, BotState};

const BANNER: &str = r#"
 ____  _____ ____    _    _        _    _   _  ____ _____ ____
|  _ \| ____| __ )  / \  | |      / \  | \ | |/ ___| ____|  _ \
| |_) |  _| |  _ \ / _ \ | |     / _ \ |  \| | |   |  _| | |_) |
|  _ <| |___| |_) / ___ \| |___ / ___ \| |\  | |___| |___|  _ <
|_| \_\_____|____/_/   \_\_____/_/   \_\_| \_|\____|_____|_| \_\

  Growth-Following Portfolio Rebalancer
  v0.1.0 — Autonomous Bot
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    // Load configuration from TOML
    let cfg = config::AppConfig::load("config.toml")?;

    // Initialise structured logging
    init_logging();

    // Print startup banner
    println!("{BANNER}");
    info!(
        k = cfg.trader.k,
        base = %cfg.exchange.base_currency,
        cycle_interval_secs = cfg.trader.cycle_interval_secs,
        dry_run = cfg.trader.dry_run,
        "REBALANCER starting up"
    );

    // -- Restore or create state -----------------------------------------

    let mut state = match storage::load_state(None)? {
        Some(s) => {
            info!(
                cycles = s.cycle_count,
                plans = s.plans_executed,
                "Resumed from saved state"
            );
            s
        }
        None => {
            info!("Fresh start");
            BotState::new()
        }
    };

    // -- Initialise components -------------------------------------------

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&cfg.database.url)
        .await?;
    growth::ensure_schema(&pool).await?;
    prices::ensure_schema(&pool).await?;

    let growth_source = SqliteGrowthSource::new(pool.clone());
    let price_history = Arc::new(SqlitePriceHistory::new(pool));

    let exchange = PaperExchange::new(
        Asset::new(cfg.exchange.base_currency.as_str()),
        cfg.exchange.paper_starting_funds,
        cfg.exchange.paper_fee,
        cfg.exchange.paper_min_spend,
        price_history.clone(),
    );

    let engine = Rebalancer::new(EngineConfig::from_app(&cfg));

    // -- Main loop -------------------------------------------------------

    let cycle_interval = Duration::from_secs(cfg.trader.cycle_interval_secs);
    let mut interval = tokio::time::interval(cycle_interval);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        interval_secs = cfg.trader.cycle_interval_secs,
        "Entering main loop. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                state.cycle_count += 1;
                info!(cycle = state.cycle_count, "Starting cycle");

                match engine
                    .run_cycle(&exchange, &growth_source, &*price_history, Utc::now())
                    .await
                {
                    Ok(report) => {
                        log_cycle_report(state.cycle_count, &report);
                        record_cycle(&mut state, &report);
                        if let Err(e) = storage::save_state(&state, None) {
                            error!(error = %e, "Failed to save state");
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "Cycle aborted — continuing to next");
                    }
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    // Save final state
    storage::save_state(&state, None)?;
    info!(
        cycles = state.cycle_count,
        plans = state.plans_executed,
        sells = state.sells_executed,
        buys = state.buys_executed,
        "REBALANCER shut down cleanly."
    );

    Ok(())
}

/// Fold a cycle report into the persistent counters.
fn record_cycle(state: &mut BotState, report: &CycleReport) {
    state.last_cycle_at = Some(Utc::now());
    if !report.plan.is_empty() {
        state.last_plan = Some(report.plan.clone());
    }
    if !report.dry_run && !report.plan.is_empty() {
        state.plans_executed += 1;
    }
    for outcome in &report.executed {
        match outcome.side {
            rebalancer::types::Side::Sell => state.sells_executed += 1,
            rebalancer::types::Side::Buy => state.buys_executed += 1,
        }
    }
    state.orders_failed += report.failed.len() as u64;
}

/// Log a human-readable cycle summary.
fn log_cycle_report(cycle: u64, report: &CycleReport) {
    info!(
        cycle,
        holdings = report.holdings_seen,
        candidates = report.sell_candidates,
        occupied = report.occupied_slots,
        sells = report.plan.sell.len(),
        buys = report.plan.spend.len(),
        spend = format!("{:.8}", report.plan.total_spend()),
        executed = report.executed.len(),
        failed = report.failed.len(),
        dry_run = report.dry_run,
        "Cycle complete"
    );
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("rebalancer=info"));

    let json_logging = std::env::var("REBALANCER_LOG_JSON").is_ok();

    if json_logging {
        fmt().json().with_env_filter(env_filter).with_target(true).init();
    } else {
        fmt().with_env_filter(env_filter).with_target(false).init();
    }
}
