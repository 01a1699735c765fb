//! End-to-end scenario tests against the in-memory exchange fake, covering
//! the testable-properties scenarios: crash mid-pair, orphan recovery,
//! balance drift, and a config change forcing a cold start.

use std::sync::Arc;

use async_trait::async_trait;
use grid_trader::config::MarketConfig;
use grid_trader::engine::{health, reconciler};
use grid_trader::exchange::{ExchangeGateway, Side};
use grid_trader::ladder::GapMode;
use grid_trader::notify::Notifier;
use grid_trader::state::StateStore;
use grid_trader::testing::FakeGateway;
use grid_trader::GridEngine;

struct NoopNotifier;
#[async_trait]
impl Notifier for NoopNotifier {
    async fn send(&self, _text: &str) -> bool {
        true
    }
}

fn sample_config() -> MarketConfig {
    MarketConfig {
        market: "BTC".into(),
        enabled: true,
        start_price: 10000.0,
        krw_amount: 1_000_000.0,
        max_levels: 3,
        resume: None,
        buy_gap: 1.0,
        buy_mode: GapMode::Percent,
        sell_gap: 2.0,
        sell_mode: GapMode::Percent,
        fee_rate: grid_trader::config::DEFAULT_FEE_RATE,
    }
}

/// Scenario 2: crash mid-pair. After buy@L1 fills, the engine persists,
/// cancels, places sell@L1, then "crashes" before placing buy@L2. On
/// restart, reconciliation must confirm sell@L1 and register the missing
/// buy@L2.
#[tokio::test]
async fn crash_mid_pair_reconciles_missing_buy() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(FakeGateway::new());
    let mut engine = GridEngine::cold_start(
        gateway.clone(),
        Arc::new(NoopNotifier),
        StateStore::new(dir.path()),
        sample_config(),
        1000.0,
    )
    .await
    .unwrap();

    let buy1 = engine.snapshot().level(1).unwrap().buy_order_id.clone().unwrap();
    gateway.fill_order(&buy1).await;
    engine.tick().await.unwrap();
    assert!(engine.snapshot().level(1).unwrap().sell_order_id.is_some());

    // Simulate the crash: the buy@L2 leg never landed, as if the process
    // died between the sell and buy legs of PlacePair.
    if let Some(id) = engine.snapshot().level(2).unwrap().buy_order_id.clone() {
        gateway.cancel_order(&id).await.unwrap();
    }
    engine.snapshot_mut().level_mut(2).unwrap().buy_order_id = None;
    engine.persist_now().unwrap();

    let snapshot = StateStore::new(dir.path()).load_snapshot("BTC").unwrap().unwrap();
    let mut restarted = GridEngine::warm_start(
        gateway.clone(),
        Arc::new(NoopNotifier),
        StateStore::new(dir.path()),
        1000.0,
        snapshot,
    );
    reconciler::reconcile(&mut restarted).await.unwrap();

    assert!(restarted.snapshot().level(1).unwrap().sell_order_id.is_some());
    assert!(restarted.snapshot().level(2).unwrap().buy_order_id.is_some());
}

/// Scenario 3: orphan recovery. The exchange has a stray sell order at an
/// old price no level references; the reconciler must cancel it.
#[tokio::test]
async fn orphan_order_at_stale_price_is_cancelled_on_reconcile() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(FakeGateway::new());
    gateway.inject_orphan("BTC", Side::Sell, 123456.0, 1.0).await;

    let mut engine = GridEngine::cold_start(
        gateway.clone(),
        Arc::new(NoopNotifier),
        StateStore::new(dir.path()),
        sample_config(),
        1000.0,
    )
    .await
    .unwrap();

    reconciler::reconcile(&mut engine).await.unwrap();

    // Only the legitimate buy@L1 should remain open.
    assert_eq!(gateway.open_order_count("BTC").await, 1);
}

/// Scenario 4: balance drift. The snapshot says nothing is filled, but the
/// exchange balance shows the level-1 volume sitting in the account; the
/// reconciler must reconstruct level 1 as filled and register sell@L1 +
/// buy@L2.
#[tokio::test]
async fn balance_drift_reconstructs_anchor_level() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(FakeGateway::new());

    let mut engine = GridEngine::cold_start(
        gateway.clone(),
        Arc::new(NoopNotifier),
        StateStore::new(dir.path()),
        sample_config(),
        1000.0,
    )
    .await
    .unwrap();

    let level1_volume = engine.snapshot().level(1).unwrap().volume;
    gateway.set_balance("BTC", level1_volume).await;

    reconciler::reconcile(&mut engine).await.unwrap();

    assert!(engine.snapshot().level(1).unwrap().buy_filled);
    assert!(engine.snapshot().level(1).unwrap().sell_order_id.is_some());
    assert!(engine.snapshot().level(2).unwrap().buy_order_id.is_some());
}

/// Scenario 5: config change. A persisted snapshot with max_levels=3
/// doesn't match a config now requesting max_levels=5 — the snapshot must
/// be discarded and a fresh ladder built.
#[tokio::test]
async fn config_change_forces_cold_start() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(FakeGateway::new());
    let store = StateStore::new(dir.path());

    let original = GridEngine::cold_start(
        gateway.clone(),
        Arc::new(NoopNotifier),
        StateStore::new(dir.path()),
        sample_config(),
        1000.0,
    )
    .await
    .unwrap();
    assert_eq!(original.snapshot().levels.len(), 3);

    let mut changed_config = sample_config();
    changed_config.max_levels = 5;

    let snapshot = store.load_snapshot("BTC").unwrap().unwrap();
    assert!(!snapshot.matches_config(&changed_config));

    let fresh = GridEngine::cold_start(
        gateway.clone(),
        Arc::new(NoopNotifier),
        StateStore::new(dir.path()),
        changed_config,
        1000.0,
    )
    .await
    .unwrap();
    assert_eq!(fresh.snapshot().levels.len(), 5);
}

/// Health checker repairs a manually-cancelled order without any fill
/// having occurred.
#[tokio::test]
async fn health_check_repairs_externally_cancelled_order() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(FakeGateway::new());
    let mut engine = GridEngine::cold_start(
        gateway.clone(),
        Arc::new(NoopNotifier),
        StateStore::new(dir.path()),
        sample_config(),
        1000.0,
    )
    .await
    .unwrap();

    let id = engine.snapshot().level(1).unwrap().buy_order_id.clone().unwrap();
    gateway.cancel_order(&id).await.unwrap();

    health::check(&mut engine).await.unwrap();

    assert!(engine.snapshot().level(1).unwrap().buy_order_id.is_some());
    assert_eq!(gateway.open_order_count("BTC").await, 1);
}
