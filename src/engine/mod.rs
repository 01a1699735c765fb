//! The Grid Engine: the core per-tick state machine. Detects fills, cancels
//! stale orders, and places buy/sell pairs, persisting before and after every
//! external side-effect that would desync the snapshot on crash.

pub mod health;
pub mod reconciler;

use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};

use crate::config::MarketConfig;
use crate::exchange::{normalize, retry::with_backoff, ExchangeGateway, Side};
use crate::ladder::{build_ladder, GridLevel};
use crate::notify::{format_alert, Notifier};
use crate::state::{Heartbeat, LadderSnapshot, StateStore, TradeRecord};

/// Price tolerance for confirming a placed order actually landed:
/// `max(tick, price * 0.1%)`.
fn price_tolerance(price: f64, tick: f64) -> f64 {
    (price * 0.001).max(tick)
}

/// Volume tolerance for confirming a placed order actually landed:
/// `max(volume * 2%, 1e-10)`.
fn volume_tolerance(volume: f64) -> f64 {
    (volume * 0.02).max(1e-10)
}

fn approx(a: f64, b: f64, tol: f64) -> bool {
    (a - b).abs() <= tol
}

/// What `PlacePair` should register after a fill or repair.
#[derive(Debug, Clone, Copy, Default)]
pub struct PairTargets {
    pub sell_level: Option<u64>,
    pub buy_level: Option<u64>,
}

pub struct GridEngine {
    gateway: Arc<dyn ExchangeGateway>,
    notifier: Arc<dyn Notifier>,
    store: StateStore,
    market: String,
    tick: f64,
    snapshot: LadderSnapshot,
    ticks_since_health_check: u64,
}

impl GridEngine {
    /// Cold start: build a fresh ladder, place buy at level 1, persist.
    pub async fn cold_start(
        gateway: Arc<dyn ExchangeGateway>,
        notifier: Arc<dyn Notifier>,
        store: StateStore,
        config: MarketConfig,
        tick: f64,
    ) -> Result<Self> {
        let levels = build_ladder(
            &config.market,
            config.start_price,
            config.krw_amount,
            config.max_levels,
            config.buy_gap,
            config.buy_mode,
            config.sell_gap,
            config.sell_mode,
        )?;
        let market = config.market.clone();
        let snapshot = LadderSnapshot::new(&market, config, levels);
        store.save_snapshot(&snapshot)?;

        let mut engine = Self {
            gateway,
            notifier,
            store,
            market,
            tick,
            snapshot,
            ticks_since_health_check: 0,
        };
        engine.place_level_buy(1).await?;
        engine.persist()?;
        info!("{} cold start complete, buy placed at level 1", engine.market);
        Ok(engine)
    }

    /// Warm start: snapshot matches config. Caller is responsible for having
    /// already invoked the reconciler against `snapshot` before calling this.
    pub fn warm_start(
        gateway: Arc<dyn ExchangeGateway>,
        notifier: Arc<dyn Notifier>,
        store: StateStore,
        tick: f64,
        snapshot: LadderSnapshot,
    ) -> Self {
        let market = snapshot.market.clone();
        Self {
            gateway,
            notifier,
            store,
            market,
            tick,
            snapshot,
            ticks_since_health_check: 0,
        }
    }

    /// Manual resume at level K: mark levels `[1, K-1]` as fully done, cancel
    /// everything, place buy at K and sell at K-1.
    pub async fn manual_resume(
        gateway: Arc<dyn ExchangeGateway>,
        notifier: Arc<dyn Notifier>,
        store: StateStore,
        config: MarketConfig,
        tick: f64,
        resume_level: u64,
    ) -> Result<Self> {
        let levels = build_ladder(
            &config.market,
            config.start_price,
            config.krw_amount,
            config.max_levels,
            config.buy_gap,
            config.buy_mode,
            config.sell_gap,
            config.sell_mode,
        )?;
        let market = config.market.clone();
        let mut snapshot = LadderSnapshot::new(&market, config, levels);

        for level in snapshot.levels.iter_mut() {
            if level.level < resume_level {
                level.buy_filled = true;
                level.sell_filled = true;
                level.clear_ids();
            }
        }

        gateway.cancel_all_orders(&market).await?;

        let mut engine = Self {
            gateway,
            notifier,
            store,
            market,
            tick,
            snapshot,
            ticks_since_health_check: 0,
        };
        engine.persist()?;

        if let Some(prev) = resume_level.checked_sub(1).filter(|p| *p > 0) {
            if let Some(l) = engine.snapshot.level_mut(prev) {
                l.buy_filled = true;
                l.sell_filled = false;
            }
            engine.place_level_sell(prev).await.ok();
        }

        if !engine.place_level_buy(resume_level).await? {
            let msg = format_alert(
                &engine.market,
                Some(resume_level),
                "manual resume failed: buy registration did not land",
            );
            engine.notifier.send(&msg).await;
            anyhow::bail!("manual resume failed to place buy at level {resume_level}");
        }
        engine.persist()?;
        Ok(engine)
    }

    fn persist(&self) -> Result<()> {
        self.store.save_snapshot(&self.snapshot)
    }

    fn pending_order_count(&self) -> usize {
        self.snapshot
            .levels
            .iter()
            .filter(|l| l.buy_order_id.is_some() || l.sell_order_id.is_some())
            .count()
    }

    fn write_heartbeat(&self, status: &str) -> Result<()> {
        let last_buy_level = self
            .snapshot
            .levels
            .iter()
            .find(|l| l.is_buy_open())
            .map(|l| l.level);
        let heartbeat = Heartbeat {
            market: self.market.clone(),
            timestamp: chrono::Local::now(),
            status: status.to_string(),
            realized_profit: self.snapshot.realized_profit,
            last_buy_level,
            pending_orders: self.pending_order_count(),
        };
        self.store.save_heartbeat(&heartbeat)
    }

    async fn place_level_buy(&mut self, level: u64) -> Result<bool> {
        let Some(l) = self.snapshot.level(level).cloned() else {
            return Ok(true);
        };
        let gateway = self.gateway.clone();
        let market = self.market.clone();
        let result = with_backoff("place_limit_order(buy)", || {
            let gateway = gateway.clone();
            let market = market.clone();
            async move {
                gateway
                    .place_limit_order(&market, Side::Buy, l.volume, l.buy_price)
                    .await
            }
        })
        .await?;
        if let Some(id) = result.order_id {
            if let Some(level) = self.snapshot.level_mut(level) {
                level.buy_order_id = Some(id);
            }
            Ok(true)
        } else {
            warn!(
                "{} level {level} buy order rejected: {:?}",
                self.market, result.error
            );
            Ok(false)
        }
    }

    async fn place_level_sell(&mut self, level: u64) -> Result<bool> {
        let Some(l) = self.snapshot.level(level).cloned() else {
            return Ok(true);
        };
        let gateway = self.gateway.clone();
        let market = self.market.clone();
        let result = with_backoff("place_limit_order(sell)", || {
            let gateway = gateway.clone();
            let market = market.clone();
            async move {
                gateway
                    .place_limit_order(&market, Side::Sell, l.volume, l.sell_price)
                    .await
            }
        })
        .await?;
        if let Some(id) = result.order_id {
            if let Some(level) = self.snapshot.level_mut(level) {
                level.sell_order_id = Some(id);
            }
            Ok(true)
        } else {
            warn!(
                "{} level {level} sell order rejected: {:?}",
                self.market, result.error
            );
            Ok(false)
        }
    }

    /// Cancel every tracked order except the given level's, clearing IDs.
    async fn cancel_all_except_self(&mut self, keep_level: u64) -> Result<()> {
        for level in self.snapshot.levels.iter_mut() {
            if level.level == keep_level {
                continue;
            }
            if let Some(id) = level.buy_order_id.take() {
                let _ = self.gateway.cancel_order(&id).await;
            }
            if let Some(id) = level.sell_order_id.take() {
                let _ = self.gateway.cancel_order(&id).await;
            }
        }
        self.persist()
    }

    /// §4.4.1 PlacePair: register sell then buy, verify against live open
    /// orders, retry once on verification failure.
    pub async fn place_pair(&mut self, targets: PairTargets) -> Result<bool> {
        if let Some(sell_level) = targets.sell_level {
            self.place_level_sell(sell_level).await?;
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        }
        if let Some(buy_level) = targets.buy_level {
            self.place_level_buy(buy_level).await?;
        }
        self.persist()?;

        if self.verify_pair(targets).await? {
            return Ok(true);
        }

        warn!(
            "{} pair verification failed for {targets:?}, cancelling all and retrying once",
            self.market
        );
        self.gateway.cancel_all_orders(&self.market).await?;
        for level in self.snapshot.levels.iter_mut() {
            level.clear_ids();
        }
        self.persist()?;

        if let Some(sell_level) = targets.sell_level {
            self.place_level_sell(sell_level).await?;
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        }
        if let Some(buy_level) = targets.buy_level {
            self.place_level_buy(buy_level).await?;
        }
        self.persist()?;

        let verified = self.verify_pair(targets).await?;
        if !verified {
            let msg = format_alert(
                &self.market,
                None,
                &format!("pair registration failed to verify after retry: {targets:?}"),
            );
            self.notifier.send(&msg).await;
        }
        Ok(verified)
    }

    async fn verify_pair(&self, targets: PairTargets) -> Result<bool> {
        let open = self
            .gateway
            .get_open_orders(&self.market, 100)
            .await
            .context("failed to fetch open orders for pair verification")?;

        let mut ok = true;
        if let Some(level) = targets.sell_level.and_then(|l| self.snapshot.level(l)) {
            ok &= open.iter().any(|o| {
                o.side == Side::Sell
                    && approx(o.price, level.sell_price, price_tolerance(level.sell_price, self.tick))
                    && approx(o.volume, level.volume, volume_tolerance(level.volume))
            });
        }
        if let Some(level) = targets.buy_level.and_then(|l| self.snapshot.level(l)) {
            ok &= open.iter().any(|o| {
                o.side == Side::Buy
                    && approx(o.price, level.buy_price, price_tolerance(level.buy_price, self.tick))
                    && approx(o.volume, level.volume, volume_tolerance(level.volume))
            });
        }
        Ok(ok)
    }

    /// One iteration of the main loop: poll every level's tracked order,
    /// react to fills. Returns once every level has been checked.
    pub async fn tick(&mut self) -> Result<()> {
        let level_numbers: Vec<u64> = self.snapshot.levels.iter().map(|l| l.level).collect();

        for level_num in level_numbers {
            let is_buy_open = self.snapshot.level(level_num).map(|l| l.is_buy_open()).unwrap_or(false);
            if is_buy_open {
                self.handle_buy_side(level_num).await?;
                continue;
            }
            let is_sell_open = self.snapshot.level(level_num).map(|l| l.is_sell_open()).unwrap_or(false);
            if is_sell_open {
                self.handle_sell_side(level_num).await?;
            }
        }

        self.ticks_since_health_check += 1;
        self.write_heartbeat("running")?;
        Ok(())
    }

    async fn handle_buy_side(&mut self, level_num: u64) -> Result<()> {
        let order_id = self
            .snapshot
            .level(level_num)
            .and_then(|l| l.buy_order_id.clone());
        let Some(order_id) = order_id else { return Ok(()) };

        let gateway = self.gateway.clone();
        let payload = with_backoff("get_order_detail", || {
            let gateway = gateway.clone();
            let order_id = order_id.clone();
            async move { gateway.get_order_detail(&order_id).await }
        })
        .await?;
        let verdict = normalize(&payload);
        if !verdict.filled {
            return Ok(());
        }

        info!("{} level {level_num} buy filled", self.market);
        if let Some(level) = self.snapshot.level_mut(level_num) {
            level.buy_filled = true;
        }
        self.persist()?;

        self.cancel_all_except_self(level_num).await?;

        let max_level = self.snapshot.config.max_levels;
        let buy_target = if level_num < max_level { Some(level_num + 1) } else { None };
        self.place_pair(PairTargets {
            sell_level: Some(level_num),
            buy_level: buy_target,
        })
        .await?;
        self.persist()
    }

    async fn handle_sell_side(&mut self, level_num: u64) -> Result<()> {
        let order_id = self
            .snapshot
            .level(level_num)
            .and_then(|l| l.sell_order_id.clone());
        let Some(order_id) = order_id else { return Ok(()) };

        let gateway = self.gateway.clone();
        let payload = with_backoff("get_order_detail", || {
            let gateway = gateway.clone();
            let order_id = order_id.clone();
            async move { gateway.get_order_detail(&order_id).await }
        })
        .await?;
        let verdict = normalize(&payload);
        if !verdict.filled {
            return Ok(());
        }

        let (buy_price, sell_price, volume) = {
            let level = self.snapshot.level(level_num).expect("level exists");
            (level.buy_price, level.sell_price, level.volume)
        };
        let fee_rate = self.snapshot.config.fee_rate;
        let profit = (sell_price * (1.0 - fee_rate) - buy_price * (1.0 + fee_rate)) * volume;

        info!("{} level {level_num} sell filled, profit={profit:.2}", self.market);

        self.snapshot.trade_history.push(TradeRecord {
            level: level_num,
            buy_price,
            sell_price,
            volume,
            profit,
            filled_time: chrono::Local::now(),
        });
        self.snapshot.realized_profit += profit;

        if let Some(level) = self.snapshot.level_mut(level_num) {
            level.reset_to_idle();
        }
        self.persist()?;

        self.cancel_all_except_self(level_num).await?;

        // Open Question resolution: only pre-stage the L-2 sell when that
        // rung still has a filled buy pending a sell from an earlier round.
        let l_minus_2 = level_num.checked_sub(2).filter(|l| *l > 0);
        let sell_target = l_minus_2.filter(|l| {
            self.snapshot.level(*l).map(|lvl| lvl.buy_filled && !lvl.sell_filled).unwrap_or(false)
        });

        self.place_pair(PairTargets {
            sell_level: sell_target,
            buy_level: Some(level_num),
        })
        .await?;
        self.persist()
    }

    pub fn snapshot(&self) -> &LadderSnapshot {
        &self.snapshot
    }

    pub fn ticks_since_health_check(&self) -> u64 {
        self.ticks_since_health_check
    }

    pub fn reset_health_check_counter(&mut self) {
        self.ticks_since_health_check = 0;
    }

    pub fn market(&self) -> &str {
        &self.market
    }

    pub fn gateway(&self) -> Arc<dyn ExchangeGateway> {
        self.gateway.clone()
    }

    pub fn notifier(&self) -> Arc<dyn Notifier> {
        self.notifier.clone()
    }

    pub fn tick_size(&self) -> f64 {
        self.tick
    }

    pub fn snapshot_mut(&mut self) -> &mut LadderSnapshot {
        &mut self.snapshot
    }

    pub fn persist_now(&self) -> Result<()> {
        self.persist()
    }
}
