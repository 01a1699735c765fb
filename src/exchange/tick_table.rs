//! Symbol → minimum price increment lookup.
//!
//! Static table in the teacher's `lazy_static` idiom (used there for keyed
//! lookup tables in the strategies layer). An absent entry means the caller
//! must refuse to operate on that symbol (`EngineError::UnknownSymbol`).

use lazy_static::lazy_static;
use std::collections::HashMap;

lazy_static! {
    static ref TICK_TABLE: HashMap<&'static str, f64> = {
        let mut m = HashMap::new();
        m.insert("BTC", 1000.0);
        m.insert("ETH", 1000.0);
        m.insert("XRP", 1.0);
        m.insert("SOL", 10.0);
        m.insert("DOGE", 1.0);
        m.insert("ADA", 1.0);
        m.insert("TRX", 0.1);
        m.insert("EOS", 1.0);
        m
    };
}

/// Look up the minimum price increment for a market code.
///
/// `market` is the base-asset symbol, e.g. `"BTC"` (the exchange's quote
/// currency is implicit per deployment, matching how `markets_config.json`
/// keys its entries).
pub fn tick_for(market: &str) -> Option<f64> {
    TICK_TABLE.get(market).copied()
}

/// Quantize `price` down to the nearest multiple of `tick`.
pub fn floor_to_tick(price: f64, tick: f64) -> f64 {
    (price / tick).floor() * tick
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_symbol_has_tick() {
        assert_eq!(tick_for("BTC"), Some(1000.0));
    }

    #[test]
    fn unknown_symbol_has_no_tick() {
        assert_eq!(tick_for("NOPE"), None);
    }

    #[test]
    fn floor_to_tick_rounds_down() {
        assert_eq!(floor_to_tick(9999.9, 100.0), 9900.0);
        assert_eq!(floor_to_tick(10000.0, 100.0), 10000.0);
    }
}
