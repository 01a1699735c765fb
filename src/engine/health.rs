//! Health Checker: periodically confirms the live order set matches what
//! level state implies it should be, repairing drift that reconciliation at
//! start-up wouldn't catch (e.g. an order cancelled out-of-band).

use anyhow::{Context, Result};
use log::warn;

use super::{price_tolerance, volume_tolerance, GridEngine, PairTargets};
use crate::exchange::Side;
use crate::notify::format_alert;

pub const DEFAULT_HEALTH_CHECK_INTERVAL: u64 = 12;

/// Infer the desired order set from level state, per the three cases in
/// order: a sell open, else a buy open, else the anchor/fresh-start case.
fn desired_targets(engine: &GridEngine) -> PairTargets {
    let max_level = engine.snapshot.config.max_levels;

    if let Some(l) = engine.snapshot.levels.iter().find(|l| l.is_sell_open()) {
        let next = l.level + 1;
        let buy_level = (next <= max_level).then_some(next);
        return PairTargets {
            sell_level: Some(l.level),
            buy_level,
        };
    }

    if let Some(m) = engine.snapshot.levels.iter().find(|l| l.is_buy_open()) {
        let prev = m.level.checked_sub(1).filter(|p| *p > 0);
        let sell_level = prev.filter(|p| engine.snapshot.level(*p).map(|l| l.buy_filled).unwrap_or(false));
        return PairTargets {
            sell_level,
            buy_level: Some(m.level),
        };
    }

    let anchor = engine.snapshot.levels.iter().filter(|l| l.is_anchor()).map(|l| l.level).max();
    match anchor {
        Some(a) => PairTargets {
            sell_level: None,
            buy_level: (a + 1 <= max_level).then_some(a + 1),
        },
        None => PairTargets {
            sell_level: None,
            buy_level: Some(1),
        },
    }
}

/// Check whether the live open-orders set matches `targets` exactly: one
/// order per desired leg, and nothing extra.
fn matches_desired(engine: &GridEngine, targets: PairTargets, open: &[crate::exchange::OpenOrder]) -> bool {
    let mut expected = 0;
    let mut matched = 0;

    if let Some(level) = targets.sell_level.and_then(|l| engine.snapshot.level(l)) {
        expected += 1;
        if open.iter().any(|o| {
            o.side == Side::Sell
                && (o.price - level.sell_price).abs() <= price_tolerance(level.sell_price, engine.tick)
                && (o.volume - level.volume).abs() <= volume_tolerance(level.volume)
        }) {
            matched += 1;
        }
    }
    if let Some(level) = targets.buy_level.and_then(|l| engine.snapshot.level(l)) {
        expected += 1;
        if open.iter().any(|o| {
            o.side == Side::Buy
                && (o.price - level.buy_price).abs() <= price_tolerance(level.buy_price, engine.tick)
                && (o.volume - level.volume).abs() <= volume_tolerance(level.volume)
        }) {
            matched += 1;
        }
    }

    expected == matched && open.len() == expected
}

/// Run one health check. Caller decides the tick cadence via
/// `GridEngine::ticks_since_health_check`.
pub async fn check(engine: &mut GridEngine) -> Result<()> {
    let targets = desired_targets(engine);
    let open = engine
        .gateway
        .get_open_orders(&engine.market, 200)
        .await
        .context("failed to fetch open orders for health check")?;

    if matches_desired(engine, targets, &open) {
        engine.reset_health_check_counter();
        return Ok(());
    }

    warn!(
        "{} health check found drift, desired={targets:?}, actual_count={}",
        engine.market,
        open.len()
    );

    engine.gateway.cancel_all_orders(&engine.market).await?;
    for level in engine.snapshot.levels.iter_mut() {
        level.clear_ids();
    }
    engine.persist()?;

    engine.place_pair(targets).await?;
    engine.reset_health_check_counter();

    let msg = format_alert(&engine.market, None, &format!("health check repaired order set to {targets:?}"));
    engine.notifier.send(&msg).await;

    Ok(())
}
