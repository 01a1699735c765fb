//! Three-way reconciliation: persisted snapshot ⇄ exchange open-orders list
//! ⇄ on-exchange balance. Invoked on warm start and opportunistically; each
//! pass may mutate level state and persists before the next pass runs.

use anyhow::{Context, Result};
use log::{info, warn};

use super::{price_tolerance, volume_tolerance, GridEngine, PairTargets};
use crate::exchange::{normalize, Side};
use crate::notify::format_alert;

const BALANCE_MISMATCH_THRESHOLD: f64 = 0.10;
const BALANCE_ACCEPTANCE_FACTOR: f64 = 0.99;

/// Run all three passes in order, then register any missing anchor pair.
pub async fn reconcile(engine: &mut GridEngine) -> Result<()> {
    id_based_sync(engine).await?;
    balance_based_recovery(engine).await?;
    orphan_sweep(engine).await?;
    register_anchor_pair(engine).await?;
    Ok(())
}

/// (a) For every level with a non-empty order ID and unfilled flag, poll the
/// order. Filled → set the flag. Unknown/failed → clear the ID.
async fn id_based_sync(engine: &mut GridEngine) -> Result<()> {
    let level_numbers: Vec<u64> = engine.snapshot.levels.iter().map(|l| l.level).collect();

    for level_num in level_numbers {
        let (buy_id, buy_filled) = {
            let l = engine.snapshot.level(level_num).unwrap();
            (l.buy_order_id.clone(), l.buy_filled)
        };
        if let Some(id) = buy_id {
            if !buy_filled {
                match engine.gateway.get_order_detail(&id).await {
                    Ok(payload) => {
                        let verdict = normalize(&payload);
                        if verdict.filled {
                            engine.snapshot.level_mut(level_num).unwrap().buy_filled = true;
                        }
                    }
                    Err(_) => {
                        engine.snapshot.level_mut(level_num).unwrap().buy_order_id = None;
                    }
                }
            }
        }

        let (sell_id, sell_filled) = {
            let l = engine.snapshot.level(level_num).unwrap();
            (l.sell_order_id.clone(), l.sell_filled)
        };
        if let Some(id) = sell_id {
            if !sell_filled {
                match engine.gateway.get_order_detail(&id).await {
                    Ok(payload) => {
                        let verdict = normalize(&payload);
                        if verdict.filled {
                            engine.snapshot.level_mut(level_num).unwrap().sell_filled = true;
                        }
                    }
                    Err(_) => {
                        engine.snapshot.level_mut(level_num).unwrap().sell_order_id = None;
                    }
                }
            }
        }
    }
    engine.persist()
}

/// (b) Compare on-exchange base-asset balance to the sum of volume over
/// anchor-eligible levels; greedily reconstruct ownership from the top down
/// when the two disagree by more than 10%.
async fn balance_based_recovery(engine: &mut GridEngine) -> Result<()> {
    let balances = engine
        .gateway
        .get_balance()
        .await
        .context("failed to fetch balance for reconciliation")?;

    // The base asset is the market code itself (markets are named by base
    // asset in this configuration, e.g. "BTC").
    let base_balance = balances
        .iter()
        .find(|b| b.currency == engine.market)
        .map(|b| b.free + b.locked)
        .unwrap_or(0.0);

    let expected: f64 = engine
        .snapshot
        .levels
        .iter()
        .filter(|l| l.buy_filled && !l.sell_filled)
        .map(|l| l.volume)
        .sum();

    let denom = expected.max(1e-12);
    if (base_balance - expected).abs() / denom <= BALANCE_MISMATCH_THRESHOLD {
        return Ok(());
    }

    let mut remaining = base_balance;
    let mut reconstructed = Vec::new();
    let mut level_numbers: Vec<u64> = engine.snapshot.levels.iter().map(|l| l.level).collect();
    level_numbers.sort_unstable_by(|a, b| b.cmp(a));

    for level_num in level_numbers {
        let level = engine.snapshot.level_mut(level_num).unwrap();
        if remaining >= level.volume * BALANCE_ACCEPTANCE_FACTOR {
            level.buy_filled = true;
            level.sell_filled = false;
            level.clear_ids();
            remaining -= level.volume;
            reconstructed.push(level_num);
        }
    }

    engine.persist()?;

    if !reconstructed.is_empty() {
        warn!(
            "{} balance-based recovery reconstructed levels {reconstructed:?}",
            engine.market
        );
        let msg = format_alert(
            &engine.market,
            None,
            &format!("balance-based recovery: reconstructed levels {reconstructed:?}"),
        );
        engine.notifier.send(&msg).await;
    }

    Ok(())
}

/// (c) Reattach IDs for live orders matching an ID-less level; cancel any
/// remaining live order not tracked by any level.
async fn orphan_sweep(engine: &mut GridEngine) -> Result<()> {
    let open = engine
        .gateway
        .get_open_orders(&engine.market, 200)
        .await
        .context("failed to fetch open orders for orphan sweep")?;

    let mut matched_ids = std::collections::HashSet::new();

    for order in &open {
        let candidate = engine.snapshot.levels.iter_mut().find(|l| {
            let tol_price = price_tolerance(
                if order.side == Side::Buy { l.buy_price } else { l.sell_price },
                engine.tick,
            );
            let price_target = if order.side == Side::Buy { l.buy_price } else { l.sell_price };
            let id_missing = match order.side {
                Side::Buy => l.buy_order_id.is_none() && !l.buy_filled,
                Side::Sell => l.sell_order_id.is_none() && l.buy_filled && !l.sell_filled,
            };
            id_missing
                && (order.price - price_target).abs() <= tol_price
                && (order.volume - l.volume).abs() <= volume_tolerance(l.volume)
        });

        if let Some(level) = candidate {
            match order.side {
                Side::Buy => level.buy_order_id = Some(order.order_id.clone()),
                Side::Sell => level.sell_order_id = Some(order.order_id.clone()),
            }
            matched_ids.insert(order.order_id.clone());
            info!(
                "{} reattached {:?} order {} to level {}",
                engine.market, order.side, order.order_id, level.level
            );
        }
    }

    // Anything already tracked by a level's own ID also counts as matched.
    for level in &engine.snapshot.levels {
        if let Some(id) = &level.buy_order_id {
            matched_ids.insert(id.clone());
        }
        if let Some(id) = &level.sell_order_id {
            matched_ids.insert(id.clone());
        }
    }

    let orphans: Vec<_> = open
        .iter()
        .filter(|o| !matched_ids.contains(&o.order_id))
        .collect();

    for orphan in &orphans {
        warn!("{} cancelling orphan order {}", engine.market, orphan.order_id);
        let _ = engine.gateway.cancel_order(&orphan.order_id).await;
    }

    engine.persist()?;

    if !orphans.is_empty() {
        let ids: Vec<_> = orphans.iter().map(|o| o.order_id.clone()).collect();
        let msg = format_alert(&engine.market, None, &format!("cancelled orphan orders {ids:?}"));
        engine.notifier.send(&msg).await;
    }

    Ok(())
}

/// Locate the anchor and register whatever of `(sell@anchor, buy@anchor+1)`
/// is missing; if no anchor exists, register `buy@1`.
async fn register_anchor_pair(engine: &mut GridEngine) -> Result<()> {
    let anchor_level = engine
        .snapshot
        .levels
        .iter()
        .filter(|l| l.is_anchor())
        .map(|l| l.level)
        .max();

    let max_level = engine.snapshot.config.max_levels;

    let targets = match anchor_level {
        Some(anchor) => {
            let needs_sell = engine.snapshot.level(anchor).map(|l| l.sell_order_id.is_none()).unwrap_or(false);
            let next = anchor + 1;
            let needs_buy = next <= max_level
                && engine.snapshot.level(next).map(|l| l.buy_order_id.is_none() && !l.buy_filled).unwrap_or(false);
            PairTargets {
                sell_level: needs_sell.then_some(anchor),
                buy_level: needs_buy.then_some(next),
            }
        }
        None => {
            let needs_buy = engine
                .snapshot
                .level(1)
                .map(|l| l.buy_order_id.is_none() && !l.buy_filled)
                .unwrap_or(false);
            PairTargets {
                sell_level: None,
                buy_level: needs_buy.then_some(1),
            }
        }
    };

    if targets.sell_level.is_some() || targets.buy_level.is_some() {
        engine.place_pair(targets).await?;
    }
    Ok(())
}
