//! Layered config loading: `config/markets_config.json`, then a `.env` file
//! for secrets, then CLI overrides for the single market a worker runs.
//!
//! Grounded in the teacher's `ConfigLoader` builder-chain style
//! (`with_defaults`/`with_environment`/`with_env_file`/`build`), adapted to
//! this crate's single JSON source of truth plus environment-sourced
//! secrets instead of layered TOML profiles.

use std::path::Path;

use anyhow::{Context, Result};
use config::{Config as RawConfig, Environment, File, FileFormat};

use super::{MarketConfig, MarketsConfig};

/// Secrets that must never live in the checked-in JSON: exchange API
/// credentials and notification tokens, sourced from the process
/// environment (optionally populated by a `.env` file).
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    pub exchange_access_key: Option<String>,
    pub exchange_secret_key: Option<String>,
    pub telegram_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub webhook_url: Option<String>,
}

impl Secrets {
    /// Read secrets from the environment. Missing variables are `None`, not
    /// an empty string silently accepted.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        let get = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());
        Self {
            exchange_access_key: get("EXCHANGE_ACCESS_KEY"),
            exchange_secret_key: get("EXCHANGE_SECRET_KEY"),
            telegram_token: get("TELEGRAM_TOKEN"),
            telegram_chat_id: get("TELEGRAM_CHAT_ID"),
            webhook_url: get("ALERT_WEBHOOK_URL"),
        }
    }
}

/// Loads and validates `config/markets_config.json`.
pub struct ConfigLoader {
    path: String,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            path: "config/markets_config.json".to_string(),
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Load and validate every market entry in the file.
    pub fn build(self) -> Result<MarketsConfig> {
        Self::from_file(self.path)
    }

    /// Load, validate, and return a single market's config.
    pub fn build_market(self, market: &str) -> Result<MarketConfig> {
        let all = self.build()?;
        all.get(market)
            .cloned()
            .with_context(|| format!("no config entry for market {market}"))
    }

    fn from_file(path: impl AsRef<Path>) -> Result<MarketsConfig> {
        let path = path.as_ref();
        let builder = RawConfig::builder()
            .add_source(File::new(
                path.to_str().context("config path is not valid UTF-8")?,
                FileFormat::Json,
            ))
            .add_source(Environment::with_prefix("GRID").separator("__"))
            .build()
            .with_context(|| format!("failed to load {}", path.display()))?;

        let markets: MarketsConfig = builder
            .try_deserialize()
            .context("failed to parse markets_config.json")?;

        for cfg in markets.values() {
            cfg.validate()
                .with_context(|| format!("invalid config for market {}", cfg.market))?;
        }

        Ok(markets)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// CLI overrides for a single market, applied after the file load. Mirrors
/// the worker's `--start-price`/`--krw-amount`/... flags taking precedence
/// over the file value for that one field.
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub start_price: Option<f64>,
    pub krw_amount: Option<f64>,
    pub max_levels: Option<u64>,
    pub buy_gap: Option<f64>,
    pub sell_gap: Option<f64>,
    pub resume_level: Option<u64>,
}

impl CliOverrides {
    pub fn apply(&self, mut cfg: MarketConfig) -> MarketConfig {
        if let Some(v) = self.start_price {
            cfg.start_price = v;
        }
        if let Some(v) = self.krw_amount {
            cfg.krw_amount = v;
        }
        if let Some(v) = self.max_levels {
            cfg.max_levels = v;
        }
        if let Some(v) = self.buy_gap {
            cfg.buy_gap = v;
        }
        if let Some(v) = self.sell_gap {
            cfg.sell_gap = v;
        }
        if let Some(v) = self.resume_level {
            cfg.resume = Some(v);
        }
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_sample(dir: &tempfile::TempDir) -> std::path::PathBuf {
        let path = dir.path().join("markets_config.json");
        let mut f = std::fs::File::create(&path).unwrap();
        write!(
            f,
            r#"{{
                "BTC": {{
                    "market": "BTC",
                    "enabled": true,
                    "start_price": 10000.0,
                    "krw_amount": 1000000.0,
                    "max_levels": 3,
                    "buy_gap": 1.0,
                    "buy_mode": "percent",
                    "sell_gap": 2.0,
                    "sell_mode": "percent"
                }}
            }}"#
        )
        .unwrap();
        path
    }

    #[test]
    fn loads_and_validates_valid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(&dir);
        let markets = ConfigLoader::new().with_path(path.to_str().unwrap()).build().unwrap();
        assert!(markets.contains_key("BTC"));
        assert_eq!(markets["BTC"].fee_rate, super::super::DEFAULT_FEE_RATE);
    }

    #[test]
    fn missing_file_is_an_error() {
        let result = ConfigLoader::new().with_path("/nonexistent/markets_config.json").build();
        assert!(result.is_err());
    }

    #[test]
    fn cli_overrides_take_precedence_over_file_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(&dir);
        let cfg = ConfigLoader::new()
            .with_path(path.to_str().unwrap())
            .build_market("BTC")
            .unwrap();
        let overrides = CliOverrides {
            start_price: Some(12345.0),
            ..Default::default()
        };
        let cfg = overrides.apply(cfg);
        assert_eq!(cfg.start_price, 12345.0);
    }
}
