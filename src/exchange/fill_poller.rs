//! Normalizes heterogeneous order-detail payloads into a typed fill verdict.
//!
//! Exchanges expose executed/remaining quantity and order state under
//! different field names depending on endpoint and venue. The payload is
//! kept duck-typed (`serde_json::Value`) at the boundary; this module is the
//! sole translator into the typed [`FillVerdict`] the rest of the engine
//! consumes, so exchange quirks never leak past it.

use serde_json::Value;

const EXECUTED_KEYS: &[&str] = &[
    "executed_volume",
    "executed_qty",
    "acc_trade_volume",
    "traded_volume",
];

const REMAINING_KEYS: &[&str] = &[
    "remaining_volume",
    "remaining_qty",
    "remain_qty",
    "remain_volume",
];

const STATE_KEYS: &[&str] = &["state", "ord_state", "order_state", "status_text"];

const DONE_STATES: &[&str] = &["done", "completed", "filled", "fully_filled", "terminated"];

const FILLED_EPSILON: f64 = 1e-12;

/// Normalized verdict produced from an order-detail payload, regardless of
/// which exchange shape produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FillVerdict {
    pub filled: bool,
    pub executed_qty: f64,
    pub remaining_qty: f64,
}

/// Pull the first present field in `keys` out of `payload` and coerce it to
/// `f64`. Missing fields and unparseable strings both default to `0.0`.
fn first_numeric(payload: &Value, keys: &[&str]) -> f64 {
    for key in keys {
        if let Some(v) = payload.get(*key) {
            if let Some(n) = v.as_f64() {
                return n;
            }
            if let Some(s) = v.as_str() {
                if let Ok(n) = s.trim().parse::<f64>() {
                    return n;
                }
            }
        }
    }
    0.0
}

/// Pull the first present textual state field and lowercase it.
fn first_state(payload: &Value) -> Option<String> {
    for key in STATE_KEYS {
        if let Some(v) = payload.get(*key) {
            if let Some(s) = v.as_str() {
                return Some(s.to_lowercase());
            }
        }
    }
    None
}

/// Translate a duck-typed order-detail payload into a [`FillVerdict`].
pub fn normalize(payload: &Value) -> FillVerdict {
    let executed_qty = first_numeric(payload, EXECUTED_KEYS);
    let remaining_qty = first_numeric(payload, REMAINING_KEYS);

    let state_says_done = first_state(payload)
        .map(|s| DONE_STATES.contains(&s.as_str()))
        .unwrap_or(false);

    let filled = state_says_done || (executed_qty > 0.0 && remaining_qty <= FILLED_EPSILON);

    FillVerdict {
        filled,
        executed_qty,
        remaining_qty,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn done_state_forces_filled_regardless_of_quantities() {
        for key in STATE_KEYS {
            for state in DONE_STATES {
                let payload = json!({ *key: state });
                let verdict = normalize(&payload);
                assert!(verdict.filled, "{key}={state} should force filled");
            }
        }
    }

    #[test]
    fn executed_and_remaining_aliases_all_recognized() {
        for key in EXECUTED_KEYS {
            let payload = json!({ *key: 1.5, "remaining_qty": 0.0 });
            let verdict = normalize(&payload);
            assert_eq!(verdict.executed_qty, 1.5);
            assert!(verdict.filled);
        }
        for key in REMAINING_KEYS {
            let payload = json!({ "executed_qty": 1.0, *key: 0.0 });
            let verdict = normalize(&payload);
            assert_eq!(verdict.remaining_qty, 0.0);
            assert!(verdict.filled);
        }
    }

    #[test]
    fn partial_fill_is_not_filled() {
        let payload = json!({ "executed_qty": 0.5, "remaining_qty": 0.5 });
        let verdict = normalize(&payload);
        assert!(!verdict.filled);
        assert_eq!(verdict.executed_qty, 0.5);
        assert_eq!(verdict.remaining_qty, 0.5);
    }

    #[test]
    fn missing_fields_default_to_zero() {
        let verdict = normalize(&json!({}));
        assert_eq!(verdict.executed_qty, 0.0);
        assert_eq!(verdict.remaining_qty, 0.0);
        assert!(!verdict.filled);
    }

    #[test]
    fn unparseable_string_quantity_defaults_to_zero() {
        let payload = json!({ "executed_qty": "not-a-number", "remaining_qty": "also-not" });
        let verdict = normalize(&payload);
        assert_eq!(verdict.executed_qty, 0.0);
        assert_eq!(verdict.remaining_qty, 0.0);
    }

    #[test]
    fn string_encoded_numbers_are_parsed() {
        let payload = json!({ "executed_qty": "1.25", "remaining_qty": "0.0" });
        let verdict = normalize(&payload);
        assert_eq!(verdict.executed_qty, 1.25);
        assert!(verdict.filled);
    }
}
