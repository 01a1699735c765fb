//! Ladder model: per-level price/volume geometry, built once at cold start
//! and immutable thereafter. Levels are mutated only by the Grid Engine and
//! Reconciler (state transitions, not geometry).

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::exchange::tick_table;

/// Whether a gap parameter is a percentage of the reference price or a flat
/// price-unit offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GapMode {
    Percent,
    Price,
}

fn step_down(price: f64, gap: f64, mode: GapMode) -> f64 {
    match mode {
        GapMode::Percent => price * (1.0 - gap / 100.0),
        GapMode::Price => price - gap,
    }
}

fn step_up(price: f64, gap: f64, mode: GapMode) -> f64 {
    match mode {
        GapMode::Percent => price * (1.0 + gap / 100.0),
        GapMode::Price => price + gap,
    }
}

/// Round to 8 fractional digits, matching the venue's base-asset precision.
fn round8(x: f64) -> f64 {
    (x * 1e8).round() / 1e8
}

/// One rung of the ladder. Persisted verbatim as part of `LadderSnapshot`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridLevel {
    pub level: u64,
    pub buy_price: f64,
    pub sell_price: f64,
    pub volume: f64,
    pub buy_order_id: Option<String>,
    pub sell_order_id: Option<String>,
    pub buy_filled: bool,
    pub sell_filled: bool,
}

impl GridLevel {
    fn new(level: u64, buy_price: f64, sell_price: f64, volume: f64) -> Self {
        Self {
            level,
            buy_price,
            sell_price,
            volume,
            buy_order_id: None,
            sell_order_id: None,
            buy_filled: false,
            sell_filled: false,
        }
    }

    /// The level is the anchor: filled buy, sell not yet filled.
    pub fn is_anchor(&self) -> bool {
        self.buy_filled && !self.sell_filled
    }

    /// A live buy order is tracked and not yet filled.
    pub fn is_buy_open(&self) -> bool {
        self.buy_order_id.is_some() && !self.buy_filled
    }

    /// The anchor with a live sell order tracked.
    pub fn is_sell_open(&self) -> bool {
        self.is_anchor() && self.sell_order_id.is_some()
    }

    /// No tracked orders and no fills — a fresh/recycled level.
    pub fn is_idle(&self) -> bool {
        self.buy_order_id.is_none()
            && self.sell_order_id.is_none()
            && !self.buy_filled
            && !self.sell_filled
    }

    /// Clear both order IDs, leaving fill flags untouched. Used by
    /// cancel-all-except-self and orphan sweep.
    pub fn clear_ids(&mut self) {
        self.buy_order_id = None;
        self.sell_order_id = None;
    }

    /// Reset to `IDLE` after a completed sell — the level recycles.
    pub fn reset_to_idle(&mut self) {
        self.buy_order_id = None;
        self.sell_order_id = None;
        self.buy_filled = false;
        self.sell_filled = false;
    }
}

/// Build the fixed ladder geometry for a market. Fails with
/// `EngineError::UnknownSymbol` when `market` has no registered tick.
pub fn build_ladder(
    market: &str,
    start_price: f64,
    quote_amount: f64,
    max_levels: u64,
    buy_gap: f64,
    buy_mode: GapMode,
    sell_gap: f64,
    sell_mode: GapMode,
) -> Result<Vec<GridLevel>, EngineError> {
    let tick = tick_table::tick_for(market).ok_or_else(|| EngineError::UnknownSymbol {
        market: market.to_string(),
    })?;

    let mut levels = Vec::with_capacity(max_levels as usize);
    for i in 0..max_levels {
        let raw_buy = step_down(start_price, buy_gap * i as f64, buy_mode);
        let raw_sell = step_up(raw_buy, sell_gap, sell_mode);

        let buy_price = tick_table::floor_to_tick(raw_buy, tick);
        let sell_price = tick_table::floor_to_tick(raw_sell, tick);
        let volume = round8(quote_amount / buy_price);

        levels.push(GridLevel::new(i + 1, buy_price, sell_price, volume));
    }
    Ok(levels)
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        // BTC's tick is 1000. Ranges are chosen so no generated case can
        // collapse: start_price stays far enough above the tick, buy_gap is
        // small enough that the deepest level (buy_gap * (max_levels-1))
        // never eats more than a fifth of start_price, and sell_gap is wide
        // enough that the raw buy-to-sell spread always exceeds a full tick
        // (the minimum spread needed to guarantee the floored sell rung
        // lands strictly above the floored buy rung).
        #[test]
        fn ladder_is_always_descending_with_sell_above_buy(
            start_price in 1_000_000.0f64..10_000_000.0,
            quote_amount in 1000.0f64..10_000_000.0,
            max_levels in 1u64..10,
            buy_gap in 0.1f64..2.0,
            sell_gap in 5.0f64..10.0,
        ) {
            let levels = build_ladder(
                "BTC", start_price, quote_amount, max_levels,
                buy_gap, GapMode::Percent, sell_gap, GapMode::Percent,
            ).unwrap();

            prop_assert_eq!(levels.len() as u64, max_levels);
            for l in &levels {
                prop_assert!(l.sell_price > l.buy_price);
                prop_assert!(l.volume > 0.0);
            }
            for w in levels.windows(2) {
                prop_assert!(w[0].buy_price >= w[1].buy_price);
            }
        }
    }
}
