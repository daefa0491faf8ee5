//! End-to-end cycle scenarios.
//!
//! Drive the full engine against the SQLite-backed data readers and the
//! deterministic mock exchange (and the paper exchange for the full
//! simulated round trip).

use chrono::{Duration, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::collections::BTreeSet;
use std::sync::Arc;

use rebalancer::data::{growth, prices, SqliteGrowthSource, SqlitePriceHistory};
use rebalancer::engine::{EngineConfig, Rebalancer, StagnationMode};
use rebalancer::exchange::paper::PaperExchange;
use rebalancer::types::{Asset, CycleError, Side};

use crate::mock_exchange::MockExchange;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn memory_pool() -> SqlitePool {
    // A single connection so every query sees the same in-memory DB.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    growth::ensure_schema(&pool).await.unwrap();
    prices::ensure_schema(&pool).await.unwrap();
    pool
}

/// Seed growth signals (1h old) and price pairs (20h-old, 1h-old).
async fn seed_data(pool: &SqlitePool, signals: &[(&str, f64)], price_pairs: &[(&str, f64, f64)]) {
    let now = Utc::now();
    for (symbol, score) in signals {
        growth::insert_signal(pool, &Asset::new(*symbol), now - Duration::hours(1), *score)
            .await
            .unwrap();
    }
    for (symbol, oldest, newest) in price_pairs {
        let asset = Asset::new(*symbol);
        prices::insert_sample(pool, &asset, now - Duration::hours(20), *oldest)
            .await
            .unwrap();
        prices::insert_sample(pool, &asset, now - Duration::hours(1), *newest)
            .await
            .unwrap();
    }
}

fn engine_config(k: usize, stagnation: StagnationMode, dry_run: bool) -> EngineConfig {
    EngineConfig {
        k,
        growth_window: Duration::hours(23),
        min_hold: Duration::hours(23),
        never_sell: BTreeSet::new(),
        stagnation,
        stagnation_window: Duration::hours(24),
        dry_run,
        retry_cooldown: std::time::Duration::from_millis(0),
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_reference_rebalance_cycle() {
    // K=4: ETH is old and stagnating, LTC too young to sell.
    let pool = memory_pool().await;
    seed_data(
        &pool,
        &[("AAA", 0.5), ("BBB", 0.4), ("CCC", 0.3), ("DDD", 0.2)],
        &[("ETH", 100.0, 102.0)],
    )
    .await;
    let growth_source = SqliteGrowthSource::new(pool.clone());
    let price_history = SqlitePriceHistory::new(pool);

    let exchange = MockExchange::new("BTC", 20.0, 1.0);
    exchange.seed("ETH", 50.0, true, Some(30));
    exchange.seed("LTC", 30.0, true, Some(2));

    let engine = Rebalancer::new(engine_config(
        4,
        StagnationMode::Static { threshold: 0.045 },
        false,
    ));
    let report = engine
        .run_cycle(&exchange, &growth_source, &price_history, Utc::now())
        .await
        .unwrap();

    // ETH sold (2% gain is below the 4.5% threshold), LTC occupies a slot.
    assert_eq!(report.plan.sell, [Asset::new("ETH")].into_iter().collect());
    assert_eq!(report.occupied_slots, 1);

    // Three buys split the ETH value plus free funds equally.
    assert_eq!(report.plan.spend.len(), 3);
    for symbol in ["AAA", "BBB", "CCC"] {
        let share = report.plan.spend[&Asset::new(symbol)];
        assert!((share - 70.0 / 3.0).abs() < 1e-9);
    }

    let outcomes = exchange.get_outcomes();
    assert_eq!(outcomes.len(), 4);
    // The sale is issued before any purchase.
    assert_eq!(outcomes[0].side, Side::Sell);
    assert_eq!(outcomes[0].asset, Asset::new("ETH"));
    assert!(outcomes[1..].iter().all(|o| o.side == Side::Buy));
}

#[tokio::test]
async fn test_wash_trade_never_trades_the_same_asset() {
    // ETH is eligible to sell AND tops the growth ranking: both sides
    // must cancel and ETH must not be touched at all.
    let pool = memory_pool().await;
    seed_data(&pool, &[("ETH", 0.9), ("AAA", 0.5), ("BBB", 0.4)], &[]).await;
    let growth_source = SqliteGrowthSource::new(pool.clone());
    let price_history = SqlitePriceHistory::new(pool);

    let exchange = MockExchange::new("BTC", 10.0, 0.5);
    exchange.seed("ETH", 50.0, true, Some(30));

    let engine = Rebalancer::new(engine_config(3, StagnationMode::Disabled, false));
    let report = engine
        .run_cycle(&exchange, &growth_source, &price_history, Utc::now())
        .await
        .unwrap();

    for asset in report.plan.spend.keys() {
        assert!(!report.plan.sell.contains(asset));
    }
    let eth = Asset::new("ETH");
    assert!(!report.plan.sell.contains(&eth));
    assert!(!report.plan.spend.contains_key(&eth));
    assert!(exchange.get_outcomes().iter().all(|o| o.asset != eth));
    // The retained ETH position fills a slot: only two fresh buys.
    assert_eq!(report.plan.spend.len(), 2);
}

#[tokio::test]
async fn test_never_sell_is_never_traded_away() {
    let pool = memory_pool().await;
    seed_data(&pool, &[("AAA", 0.5), ("BBB", 0.4)], &[]).await;
    let growth_source = SqliteGrowthSource::new(pool.clone());
    let price_history = SqlitePriceHistory::new(pool);

    let exchange = MockExchange::new("BTC", 10.0, 0.5);
    exchange.seed("BNB", 40.0, true, Some(500));
    exchange.seed("ETH", 50.0, true, Some(500));

    let mut cfg = engine_config(4, StagnationMode::Disabled, false);
    cfg.never_sell = [Asset::new("BNB")].into_iter().collect();
    let engine = Rebalancer::new(cfg);
    let report = engine
        .run_cycle(&exchange, &growth_source, &price_history, Utc::now())
        .await
        .unwrap();

    assert!(!report.plan.sell.contains(&Asset::new("BNB")));
    assert!(report.plan.sell.contains(&Asset::new("ETH")));
    assert!(exchange
        .get_outcomes()
        .iter()
        .all(|o| !(o.asset == Asset::new("BNB") && o.side == Side::Sell)));
}

#[tokio::test]
async fn test_spend_respects_funds_and_minimums() {
    // 50 available with a minimum of 30: only a single buy is feasible.
    let pool = memory_pool().await;
    seed_data(
        &pool,
        &[("AAA", 0.5), ("BBB", 0.4), ("CCC", 0.3), ("DDD", 0.2)],
        &[],
    )
    .await;
    let growth_source = SqliteGrowthSource::new(pool.clone());
    let price_history = SqlitePriceHistory::new(pool);

    let exchange = MockExchange::new("BTC", 50.0, 30.0);

    let engine = Rebalancer::new(engine_config(4, StagnationMode::Disabled, false));
    let report = engine
        .run_cycle(&exchange, &growth_source, &price_history, Utc::now())
        .await
        .unwrap();

    assert_eq!(report.plan.spend.len(), 1);
    let share = report.plan.spend[&Asset::new("AAA")];
    assert!((share - 50.0).abs() < 1e-9);
    assert!(report.plan.total_spend() <= report.available_funds + 1e-9);
    for value in report.plan.spend.values() {
        assert!(*value >= 30.0);
    }
}

#[tokio::test]
async fn test_dynamic_top_n_protects_gainers() {
    // ETH gained 30%, LTC lost 10%. With top_n=3 the two unpriced ranking
    // entries and ETH are exempt; only LTC is sold.
    let pool = memory_pool().await;
    seed_data(
        &pool,
        &[("AAA", 0.5), ("BBB", 0.4)],
        &[("ETH", 100.0, 130.0), ("LTC", 100.0, 90.0)],
    )
    .await;
    let growth_source = SqliteGrowthSource::new(pool.clone());
    let price_history = SqlitePriceHistory::new(pool);

    let exchange = MockExchange::new("BTC", 10.0, 0.5);
    exchange.seed("ETH", 50.0, true, Some(30));
    exchange.seed("LTC", 30.0, true, Some(30));

    let engine = Rebalancer::new(engine_config(
        3,
        StagnationMode::DynamicTopN { top_n: 3 },
        false,
    ));
    let report = engine
        .run_cycle(&exchange, &growth_source, &price_history, Utc::now())
        .await
        .unwrap();

    assert_eq!(report.plan.sell, [Asset::new("LTC")].into_iter().collect());
    // ETH keeps its slot: two fresh buys for k=3.
    assert_eq!(report.plan.spend.len(), 2);
    assert!(report.plan.spend.contains_key(&Asset::new("AAA")));
    assert!(report.plan.spend.contains_key(&Asset::new("BBB")));
}

#[tokio::test]
async fn test_dry_run_issues_no_orders() {
    let pool = memory_pool().await;
    seed_data(&pool, &[("AAA", 0.5), ("BBB", 0.4)], &[]).await;
    let growth_source = SqliteGrowthSource::new(pool.clone());
    let price_history = SqlitePriceHistory::new(pool);

    let exchange = MockExchange::new("BTC", 20.0, 0.5);
    exchange.seed("ETH", 50.0, true, Some(30));

    let engine = Rebalancer::new(engine_config(2, StagnationMode::Disabled, true));
    let report = engine
        .run_cycle(&exchange, &growth_source, &price_history, Utc::now())
        .await
        .unwrap();

    assert!(report.dry_run);
    assert!(!report.plan.is_empty());
    assert_eq!(exchange.sell_calls(), 0);
    assert_eq!(exchange.buy_calls(), 0);
    assert!(exchange.get_outcomes().is_empty());
}

#[tokio::test]
async fn test_transient_failure_recovers_within_the_cycle() {
    let pool = memory_pool().await;
    seed_data(&pool, &[("AAA", 0.5)], &[]).await;
    let growth_source = SqliteGrowthSource::new(pool.clone());
    let price_history = SqlitePriceHistory::new(pool);

    let exchange = MockExchange::new("BTC", 20.0, 0.5);
    exchange.fail_holdings_times(1);

    let engine = Rebalancer::new(engine_config(2, StagnationMode::Disabled, true));
    let report = engine
        .run_cycle(&exchange, &growth_source, &price_history, Utc::now())
        .await
        .unwrap();

    // One failure plus the retry.
    assert_eq!(exchange.holdings_calls(), 2);
    assert_eq!(report.plan.spend.len(), 1);
}

#[tokio::test]
async fn test_persistent_failure_aborts_without_orders() {
    let pool = memory_pool().await;
    seed_data(&pool, &[("AAA", 0.5)], &[]).await;
    let growth_source = SqliteGrowthSource::new(pool.clone());
    let price_history = SqlitePriceHistory::new(pool);

    let exchange = MockExchange::new("BTC", 20.0, 0.5);
    exchange.seed("ETH", 50.0, true, Some(30));
    exchange.set_error("API down");

    let engine = Rebalancer::new(engine_config(2, StagnationMode::Disabled, false));
    let result = engine
        .run_cycle(&exchange, &growth_source, &price_history, Utc::now())
        .await;

    assert!(matches!(result, Err(CycleError::ExchangeUnavailable(_))));
    assert_eq!(exchange.sell_calls(), 0);
    assert_eq!(exchange.buy_calls(), 0);
}

#[tokio::test]
async fn test_paper_exchange_full_round_trip() {
    // The whole pipeline against the paper exchange: stagnating ETH is
    // liquidated and the proceeds are spread over the top-ranked assets.
    let pool = memory_pool().await;
    seed_data(
        &pool,
        &[("AAA", 0.5), ("BBB", 0.4)],
        &[("ETH", 0.0500, 0.0501), ("AAA", 0.0100, 0.0100), ("BBB", 0.0200, 0.0200)],
    )
    .await;
    let growth_source = SqliteGrowthSource::new(pool.clone());
    let price_history = Arc::new(SqlitePriceHistory::new(pool));

    // Zero fee keeps the arithmetic exact for the assertions below.
    let exchange = PaperExchange::new(
        Asset::new("BTC"),
        0.05,
        0.0,
        0.0005,
        price_history.clone(),
    );
    exchange.seed_position(
        Asset::new("ETH"),
        10.0,
        Some(Utc::now() - Duration::hours(30)),
    );

    let engine = Rebalancer::new(engine_config(
        2,
        StagnationMode::Static { threshold: 0.045 },
        false,
    ));
    let report = engine
        .run_cycle(&exchange, &growth_source, &*price_history, Utc::now())
        .await
        .unwrap();

    // ETH (0.2% gain) was sold; AAA and BBB bought with the proceeds.
    assert_eq!(report.plan.sell, [Asset::new("ETH")].into_iter().collect());
    assert_eq!(report.plan.spend.len(), 2);
    assert!(report.failed.is_empty());

    let holdings = rebalancer::exchange::ExchangeAdapter::holdings_value(&exchange)
        .await
        .unwrap();
    assert!(!holdings.contains_key(&Asset::new("ETH")));
    assert!(holdings.contains_key(&Asset::new("AAA")));
    assert!(holdings.contains_key(&Asset::new("BBB")));
    // All funds were deployed.
    let funds = rebalancer::exchange::ExchangeAdapter::free_funds(&exchange)
        .await
        .unwrap();
    assert!(funds.abs() < 1e-9);
}
