//! Configuration types and loading.
//!
//! `MarketConfig` is the explicit record replacing a dynamic config-dict
//! style: exactly the enumerated fields, `buy_mode`/`sell_mode` a closed
//! two-variant tag. Loaded from `config/markets_config.json` through
//! [`loader::ConfigLoader`].

pub mod loader;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::exchange::tick_table;
use crate::ladder::GapMode;

/// Default maker/taker fee rate used in the profit formula. Exposed as a
/// config field (not a hardcoded constant) since actual venue fee semantics
/// vary per market/account tier.
pub const DEFAULT_FEE_RATE: f64 = 0.0004;

fn default_fee_rate() -> f64 {
    DEFAULT_FEE_RATE
}

/// One market's full configuration, as read from `markets_config.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketConfig {
    pub market: String,
    pub enabled: bool,
    pub start_price: f64,
    pub krw_amount: f64,
    pub max_levels: u64,
    #[serde(default)]
    pub resume: Option<u64>,
    pub buy_gap: f64,
    pub buy_mode: GapMode,
    pub sell_gap: f64,
    pub sell_mode: GapMode,
    #[serde(default = "default_fee_rate")]
    pub fee_rate: f64,
}

impl MarketConfig {
    /// Reject configurations that would produce a nonsensical or unsafe
    /// ladder before any engine work starts.
    pub fn validate(&self) -> Result<(), EngineError> {
        if tick_table::tick_for(&self.market).is_none() {
            return Err(EngineError::UnknownSymbol {
                market: self.market.clone(),
            });
        }
        if self.max_levels == 0 {
            return Err(EngineError::InvalidConfig {
                market: self.market.clone(),
                reason: "max_levels must be greater than zero".into(),
            });
        }
        if self.buy_gap <= 0.0 {
            return Err(EngineError::InvalidConfig {
                market: self.market.clone(),
                reason: "buy_gap must be positive".into(),
            });
        }
        if self.sell_gap <= 0.0 {
            return Err(EngineError::InvalidConfig {
                market: self.market.clone(),
                reason: "sell_gap must be positive".into(),
            });
        }
        if let Some(resume) = self.resume {
            if resume > self.max_levels {
                return Err(EngineError::InvalidConfig {
                    market: self.market.clone(),
                    reason: format!(
                        "resume level {resume} exceeds max_levels {}",
                        self.max_levels
                    ),
                });
            }
        }
        Ok(())
    }
}

/// All markets as read from `markets_config.json`, keyed by market code.
pub type MarketsConfig = HashMap<String, MarketConfig>;

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MarketConfig {
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
            fee_rate: DEFAULT_FEE_RATE,
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn unknown_symbol_rejected() {
        let mut cfg = sample();
        cfg.market = "NOPE".into();
        assert!(matches!(
            cfg.validate(),
            Err(EngineError::UnknownSymbol { .. })
        ));
    }

    #[test]
    fn zero_max_levels_rejected() {
        let mut cfg = sample();
        cfg.max_levels = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn resume_beyond_max_levels_rejected() {
        let mut cfg = sample();
        cfg.resume = Some(10);
        assert!(cfg.validate().is_err());
    }
}
