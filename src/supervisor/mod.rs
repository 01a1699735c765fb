//! Watchdog: monitors per-market worker subprocesses via their heartbeat
//! files and respawns any that go stale. Read-only with respect to worker
//! state — it never touches a snapshot file, only observes heartbeats and
//! process lifetimes.

use std::collections::HashMap;
use std::process::{Child, Command};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Local;
use log::{info, warn};

use crate::config::MarketConfig;
use crate::exchange::{ExchangeGateway, Side};
use crate::notify::Notifier;
use crate::state::StateStore;

/// Most-recent live orders to include per market in a summary report.
const RECENT_ORDERS_LIMIT: usize = 5;

pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_SUMMARY_INTERVAL: Duration = Duration::from_secs(3600);

/// One monitored market's current worker handle, if we spawned it.
struct Monitored {
    config: MarketConfig,
    child: Option<Child>,
}

/// Per-market liveness summary assembled from a worker's heartbeat.
#[derive(Debug, Clone)]
pub struct MarketStatus {
    pub market: String,
    pub healthy: bool,
    pub realized_profit: f64,
    pub last_buy_level: Option<u64>,
    pub pending_orders: usize,
}

pub struct Supervisor {
    store: StateStore,
    notifier: Arc<dyn Notifier>,
    gateway: Arc<dyn ExchangeGateway>,
    worker_binary: std::path::PathBuf,
    markets: HashMap<String, Monitored>,
    started_at: Instant,
    heartbeat_timeout: Duration,
    check_interval: Duration,
    summary_interval: Duration,
}

impl Supervisor {
    pub fn new(
        store: StateStore,
        notifier: Arc<dyn Notifier>,
        gateway: Arc<dyn ExchangeGateway>,
        worker_binary: impl Into<std::path::PathBuf>,
        configs: impl IntoIterator<Item = MarketConfig>,
    ) -> Self {
        let markets = configs
            .into_iter()
            .filter(|c| c.enabled)
            .map(|c| (c.market.clone(), Monitored { config: c, child: None }))
            .collect();
        Self {
            store,
            notifier,
            gateway,
            worker_binary: worker_binary.into(),
            markets,
            started_at: Instant::now(),
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT,
            check_interval: DEFAULT_CHECK_INTERVAL,
            summary_interval: DEFAULT_SUMMARY_INTERVAL,
        }
    }

    fn is_stale(&self, market: &str) -> bool {
        match self.store.load_heartbeat(market) {
            Ok(Some(hb)) => {
                let elapsed = Local::now().signed_duration_since(hb.timestamp);
                elapsed.num_seconds() as u64 > self.heartbeat_timeout.as_secs()
            }
            Ok(None) => true,
            Err(e) => {
                warn!("{market} heartbeat unreadable, treating as stale: {e}");
                true
            }
        }
    }

    fn spawn_worker(&mut self, market: &str) -> Result<()> {
        let monitored = self
            .markets
            .get_mut(market)
            .with_context(|| format!("{market} is not a monitored market"))?;
        let cfg = &monitored.config;

        if let Some(child) = monitored.child.as_mut() {
            let _ = child.kill();
        }

        let child = Command::new(&self.worker_binary)
            .arg("--market")
            .arg(&cfg.market)
            .arg("--start-price")
            .arg(cfg.start_price.to_string())
            .arg("--krw-amount")
            .arg(cfg.krw_amount.to_string())
            .arg("--max-levels")
            .arg(cfg.max_levels.to_string())
            .arg("--buy-gap")
            .arg(cfg.buy_gap.to_string())
            .arg("--sell-gap")
            .arg(cfg.sell_gap.to_string())
            .arg("--resume-level")
            .arg(cfg.resume.unwrap_or(0).to_string())
            .spawn()
            .with_context(|| format!("failed to spawn worker for {market}"))?;

        info!("{market} worker respawned, pid={}", child.id());
        monitored.child = Some(child);
        Ok(())
    }

    /// One watchdog sweep: respawn every stale market. Returns the markets
    /// that were restarted this pass.
    pub async fn check_and_restart(&mut self) -> Vec<String> {
        let stale: Vec<String> = self
            .markets
            .keys()
            .filter(|m| self.is_stale(m))
            .cloned()
            .collect();

        for market in &stale {
            warn!("{market} heartbeat stale, respawning worker");
            if let Err(e) = self.spawn_worker(market) {
                warn!("{market} respawn failed: {e}");
                let msg = crate::notify::format_alert(market, None, &format!("worker respawn failed: {e}"));
                self.notifier.send(&msg).await;
                continue;
            }
            let msg = crate::notify::format_alert(market, None, "worker respawned after heartbeat timeout");
            self.notifier.send(&msg).await;
        }

        stale
    }

    /// One-shot `--status` snapshot: current heartbeat state per market,
    /// no side effects.
    pub fn status(&self) -> Vec<MarketStatus> {
        self.markets
            .keys()
            .map(|market| match self.store.load_heartbeat(market) {
                Ok(Some(hb)) => MarketStatus {
                    market: market.clone(),
                    healthy: !self.is_stale(market),
                    realized_profit: hb.realized_profit,
                    last_buy_level: hb.last_buy_level,
                    pending_orders: hb.pending_orders,
                },
                _ => MarketStatus {
                    market: market.clone(),
                    healthy: false,
                    realized_profit: 0.0,
                    last_buy_level: None,
                    pending_orders: 0,
                },
            })
            .collect()
    }

    /// Up to [`RECENT_ORDERS_LIMIT`] most-recent live orders for `market`,
    /// formatted as report lines. A gateway failure is reported inline
    /// rather than propagated, matching the rest of the summary report's
    /// best-effort posture.
    async fn recent_orders_block(&self, market: &str) -> String {
        let orders = match self.gateway.get_open_orders(market, 100).await {
            Ok(orders) => orders,
            Err(e) => return format!("    order list unavailable: {e}\n"),
        };

        if orders.is_empty() {
            return "    no open orders\n".to_string();
        }

        let mut orders = orders;
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let mut block = String::new();
        for o in orders.iter().take(RECENT_ORDERS_LIMIT) {
            let side = match o.side {
                Side::Buy => "buy",
                Side::Sell => "sell",
            };
            block.push_str(&format!(
                "    {side} {:.2} x {:.8} ({})\n",
                o.price,
                o.volume,
                o.created_at.format("%H:%M:%S")
            ));
        }
        if orders.len() > RECENT_ORDERS_LIMIT {
            block.push_str(&format!("    ... and {} more\n", orders.len() - RECENT_ORDERS_LIMIT));
        }
        block
    }

    /// Aggregated report body sent every `summary_interval`: per-market
    /// status, up to 5 most-recent live orders, plus uptime and total profit
    /// across all monitored markets.
    pub async fn summary_report(&self) -> String {
        let uptime = self.started_at.elapsed();
        let hours = uptime.as_secs() / 3600;
        let minutes = (uptime.as_secs() % 3600) / 60;

        let statuses = self.status();
        let total_profit: f64 = statuses.iter().map(|s| s.realized_profit).sum();
        let unhealthy: Vec<&str> = statuses
            .iter()
            .filter(|s| !s.healthy)
            .map(|s| s.market.as_str())
            .collect();

        let mut body = format!("watchdog summary — uptime {hours}h{minutes}m, total profit {total_profit:.2}\n");
        for s in &statuses {
            body.push_str(&format!(
                "  {} level={:?} profit={:.2} pending={}\n",
                s.market, s.last_buy_level, s.realized_profit, s.pending_orders
            ));
            body.push_str(&self.recent_orders_block(&s.market).await);
        }
        if !unhealthy.is_empty() {
            body.push_str(&format!("  unhealthy: {unhealthy:?}\n"));
        }
        body
    }

    pub fn check_interval(&self) -> Duration {
        self.check_interval
    }

    pub fn summary_interval(&self) -> Duration {
        self.summary_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ladder::GapMode;
    use crate::state::Heartbeat;
    use crate::testing::FakeGateway;
    use async_trait::async_trait;

    struct NoopNotifier;
    #[async_trait]
    impl Notifier for NoopNotifier {
        async fn send(&self, _text: &str) -> bool {
            true
        }
    }

    fn sample_config(market: &str) -> MarketConfig {
        MarketConfig {
            market: market.into(),
            enabled: true,
            start_price: 10000.0,
            krw_amount: 1_000_000.0,
            max_levels: 3,
            resume: None,
            buy_gap: 1.0,
            buy_mode: GapMode::Percent,
            sell_gap: 2.0,
            sell_mode: GapMode::Percent,
            fee_rate: crate::config::DEFAULT_FEE_RATE,
        }
    }

    #[test]
    fn missing_heartbeat_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let sup = Supervisor::new(store, Arc::new(NoopNotifier), Arc::new(FakeGateway::new()), "true", [sample_config("BTC")]);
        assert!(sup.is_stale("BTC"));
    }

    #[test]
    fn fresh_heartbeat_is_not_stale() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        store
            .save_heartbeat(&Heartbeat {
                market: "BTC".into(),
                timestamp: Local::now(),
                status: "running".into(),
                realized_profit: 10.0,
                last_buy_level: Some(1),
                pending_orders: 2,
            })
            .unwrap();
        let sup = Supervisor::new(store, Arc::new(NoopNotifier), Arc::new(FakeGateway::new()), "true", [sample_config("BTC")]);
        assert!(!sup.is_stale("BTC"));
    }

    #[test]
    fn stale_boundary_at_timeout_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        store
            .save_heartbeat(&Heartbeat {
                market: "BTC".into(),
                timestamp: Local::now() - chrono::Duration::seconds(130),
                status: "running".into(),
                realized_profit: 0.0,
                last_buy_level: None,
                pending_orders: 0,
            })
            .unwrap();
        let sup = Supervisor::new(store, Arc::new(NoopNotifier), Arc::new(FakeGateway::new()), "true", [sample_config("BTC")]);
        assert!(sup.is_stale("BTC"));
    }

    #[test]
    fn status_reports_per_market_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        store
            .save_heartbeat(&Heartbeat {
                market: "BTC".into(),
                timestamp: Local::now(),
                status: "running".into(),
                realized_profit: 500.0,
                last_buy_level: Some(2),
                pending_orders: 2,
            })
            .unwrap();
        let sup = Supervisor::new(store, Arc::new(NoopNotifier), Arc::new(FakeGateway::new()), "true", [sample_config("BTC")]);
        let statuses = sup.status();
        assert_eq!(statuses.len(), 1);
        assert!(statuses[0].healthy);
        assert_eq!(statuses[0].realized_profit, 500.0);
    }

    #[tokio::test]
    async fn summary_report_lists_up_to_five_recent_orders_per_market() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        store
            .save_heartbeat(&Heartbeat {
                market: "BTC".into(),
                timestamp: Local::now(),
                status: "running".into(),
                realized_profit: 100.0,
                last_buy_level: Some(1),
                pending_orders: 6,
            })
            .unwrap();

        let gateway = Arc::new(FakeGateway::new());
        for i in 0..6 {
            gateway
                .inject_orphan("BTC", crate::exchange::Side::Buy, 10000.0 + i as f64, 1.0)
                .await;
        }

        let sup = Supervisor::new(store, Arc::new(NoopNotifier), gateway, "true", [sample_config("BTC")]);
        let report = sup.summary_report().await;

        assert!(report.contains("buy"));
        assert!(report.contains("... and 1 more"));
    }

    #[tokio::test]
    async fn summary_report_notes_when_a_market_has_no_open_orders() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        store
            .save_heartbeat(&Heartbeat {
                market: "BTC".into(),
                timestamp: Local::now(),
                status: "running".into(),
                realized_profit: 0.0,
                last_buy_level: None,
                pending_orders: 0,
            })
            .unwrap();

        let sup = Supervisor::new(store, Arc::new(NoopNotifier), Arc::new(FakeGateway::new()), "true", [sample_config("BTC")]);
        let report = sup.summary_report().await;

        assert!(report.contains("no open orders"));
    }
}
