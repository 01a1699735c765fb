//! Crash-atomic persistence: the per-market `LadderSnapshot` and heartbeat
//! files.
//!
//! The teacher's own `BotConfig::save_to_file` writes straight to the target
//! path (`std::fs::write`), which is fine for an operator-invoked config dump
//! but not for state that must survive a crash mid-write. Every write here
//! goes to a sibling temp file and is renamed over the target, which on a
//! POSIX filesystem is atomic — a reader never observes a half-written file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::config::MarketConfig;
use crate::error::EngineError;
use crate::ladder::GridLevel;

/// One completed buy→sell cycle, appended to `trade_history` on every sell
/// fill. Used to recover `realized_profit` if it ever diverges from the sum
/// over history by more than one quote-unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub level: u64,
    pub buy_price: f64,
    pub sell_price: f64,
    pub volume: f64,
    pub profit: f64,
    pub filled_time: DateTime<Local>,
}

/// Everything persisted for one market between worker restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LadderSnapshot {
    pub market: String,
    pub config: MarketConfig,
    pub realized_profit: f64,
    pub levels: Vec<GridLevel>,
    pub trade_history: Vec<TradeRecord>,
    pub last_updated: DateTime<Local>,
}

impl LadderSnapshot {
    pub fn new(market: &str, config: MarketConfig, levels: Vec<GridLevel>) -> Self {
        Self {
            market: market.to_string(),
            config,
            realized_profit: 0.0,
            levels,
            trade_history: Vec::new(),
            last_updated: Local::now(),
        }
    }

    /// True if the snapshot's ladder geometry matches the current config —
    /// a warm start is only valid when these agree.
    pub fn matches_config(&self, config: &MarketConfig) -> bool {
        self.config.start_price == config.start_price
            && self.config.krw_amount == config.krw_amount
            && self.config.max_levels == config.max_levels
            && self.config.buy_gap == config.buy_gap
            && self.config.buy_mode == config.buy_mode
            && self.config.sell_gap == config.sell_gap
            && self.config.sell_mode == config.sell_mode
    }

    /// The unique level with a filled buy and unfilled sell, if any.
    pub fn anchor(&self) -> Option<&GridLevel> {
        self.levels.iter().find(|l| l.is_anchor())
    }

    pub fn anchor_mut(&mut self) -> Option<&mut GridLevel> {
        self.levels.iter_mut().find(|l| l.is_anchor())
    }

    pub fn level_mut(&mut self, level: u64) -> Option<&mut GridLevel> {
        self.levels.iter_mut().find(|l| l.level == level)
    }

    pub fn level(&self, level: u64) -> Option<&GridLevel> {
        self.levels.iter().find(|l| l.level == level)
    }
}

/// Heartbeat snapshot a worker overwrites every loop iteration; the
/// supervisor's sole liveness signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heartbeat {
    pub market: String,
    pub timestamp: DateTime<Local>,
    pub status: String,
    pub realized_profit: f64,
    pub last_buy_level: Option<u64>,
    pub pending_orders: usize,
}

fn atomic_write(path: &Path, contents: &str) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create directory {}", dir.display()))?;

    let tmp_path = path.with_extension(format!(
        "{}.tmp.{}",
        path.extension().and_then(|e| e.to_str()).unwrap_or("json"),
        std::process::id()
    ));

    std::fs::write(&tmp_path, contents)
        .with_context(|| format!("failed to write temp file {}", tmp_path.display()))?;

    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("failed to rename {} to {}", tmp_path.display(), path.display()))?;

    Ok(())
}

/// Read/write the per-market snapshot and heartbeat files under `logs/`.
pub struct StateStore {
    logs_dir: PathBuf,
}

impl StateStore {
    pub fn new(logs_dir: impl Into<PathBuf>) -> Self {
        Self {
            logs_dir: logs_dir.into(),
        }
    }

    fn snapshot_path(&self, market: &str) -> PathBuf {
        self.logs_dir.join(format!("autotrade_state_{market}.json"))
    }

    /// Public: the supervisor reads heartbeats directly without going
    /// through a `GridEngine`, so it needs the path too.
    pub fn heartbeat_path(&self, market: &str) -> PathBuf {
        self.logs_dir.join(format!("heartbeat_{market}.json"))
    }

    /// Load a persisted snapshot. Missing file is a fresh start (`Ok(None)`);
    /// a file that exists but fails to parse is a hard failure — the spec
    /// requires refusing to proceed without operator intervention rather
    /// than silently resetting accumulated profit.
    pub fn load_snapshot(&self, market: &str) -> Result<Option<LadderSnapshot>> {
        let path = self.snapshot_path(market);
        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                let snapshot = serde_json::from_str(&contents).map_err(|source| {
                    EngineError::CorruptSnapshot {
                        path: path.display().to_string(),
                        source,
                    }
                })?;
                Ok(Some(snapshot))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
        }
    }

    pub fn save_snapshot(&self, snapshot: &LadderSnapshot) -> Result<()> {
        let path = self.snapshot_path(&snapshot.market);
        let json = serde_json::to_string_pretty(snapshot).context("failed to serialize snapshot")?;
        atomic_write(&path, &json)
    }

    pub fn save_heartbeat(&self, heartbeat: &Heartbeat) -> Result<()> {
        let path = self.heartbeat_path(&heartbeat.market);
        let json =
            serde_json::to_string_pretty(heartbeat).context("failed to serialize heartbeat")?;
        atomic_write(&path, &json)
    }

    pub fn load_heartbeat(&self, market: &str) -> Result<Option<Heartbeat>> {
        let path = self.heartbeat_path(market);
        match std::fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(
                serde_json::from_str(&contents)
                    .with_context(|| format!("failed to parse heartbeat {}", path.display()))?,
            )),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
        }
    }
}
