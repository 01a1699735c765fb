//! In-memory `ExchangeGateway` fake, public so both this crate's own unit
//! tests and `tests/` integration tests can exercise engine/reconciler/health
//! logic without a real signed HTTP client — the real gateway is an abstract
//! external collaborator (§1), not something to mock over HTTP.
//!
//! Gated behind the `test-util` feature (enabled for this crate's own dev
//! builds via a self dev-dependency, see Cargo.toml) rather than always
//! compiled in, so a downstream consumer building only the library doesn't
//! pay for it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;

use crate::exchange::{AssetBalance, ExchangeGateway, OpenOrder, PlaceOrderResult, Side};

#[derive(Debug, Clone)]
struct FakeOrder {
    market: String,
    side: Side,
    price: f64,
    volume: f64,
    filled: bool,
}

pub struct FakeGateway {
    orders: Mutex<HashMap<String, FakeOrder>>,
    balances: Mutex<HashMap<String, f64>>,
    next_id: AtomicU64,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            orders: Mutex::new(HashMap::new()),
            balances: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn fresh_id(&self) -> String {
        format!("FAKE-{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Mark the given order as filled, simulating an exchange fill.
    pub async fn fill_order(&self, order_id: &str) {
        if let Some(o) = self.orders.lock().unwrap().get_mut(order_id) {
            o.filled = true;
        }
    }

    pub async fn inject_orphan(&self, market: &str, side: Side, price: f64, volume: f64) {
        let id = self.fresh_id();
        self.orders.lock().unwrap().insert(
            id,
            FakeOrder {
                market: market.to_string(),
                side,
                price,
                volume,
                filled: false,
            },
        );
    }

    pub async fn set_balance(&self, currency: &str, amount: f64) {
        self.balances.lock().unwrap().insert(currency.to_string(), amount);
    }

    pub async fn open_order_count(&self, market: &str) -> usize {
        self.orders
            .lock()
            .unwrap()
            .values()
            .filter(|o| o.market == market && !o.filled)
            .count()
    }
}

impl Default for FakeGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExchangeGateway for FakeGateway {
    async fn place_limit_order(
        &self,
        market: &str,
        side: Side,
        volume: f64,
        price: f64,
    ) -> anyhow::Result<PlaceOrderResult> {
        let id = self.fresh_id();
        self.orders.lock().unwrap().insert(
            id.clone(),
            FakeOrder {
                market: market.to_string(),
                side,
                price,
                volume,
                filled: false,
            },
        );
        Ok(PlaceOrderResult {
            order_id: Some(id),
            error: None,
        })
    }

    async fn get_order_detail(&self, order_id: &str) -> anyhow::Result<serde_json::Value> {
        let orders = self.orders.lock().unwrap();
        match orders.get(order_id) {
            Some(o) => Ok(json!({
                "state": if o.filled { "done" } else { "wait" },
                "executed_qty": if o.filled { o.volume } else { 0.0 },
                "remaining_qty": if o.filled { 0.0 } else { o.volume },
            })),
            None => anyhow::bail!("order {order_id} not found"),
        }
    }

    async fn cancel_order(&self, order_id: &str) -> anyhow::Result<bool> {
        Ok(self.orders.lock().unwrap().remove(order_id).is_some())
    }

    async fn cancel_all_orders(&self, market: &str) -> anyhow::Result<()> {
        self.orders.lock().unwrap().retain(|_, o| o.market != market);
        Ok(())
    }

    async fn get_open_orders(&self, market: &str, limit: usize) -> anyhow::Result<Vec<OpenOrder>> {
        let orders = self.orders.lock().unwrap();
        Ok(orders
            .iter()
            .filter(|(_, o)| o.market == market && !o.filled)
            .take(limit)
            .map(|(id, o)| OpenOrder {
                order_id: id.clone(),
                side: o.side,
                price: o.price,
                volume: o.volume,
                created_at: chrono::Local::now(),
            })
            .collect())
    }

    async fn get_balance(&self) -> anyhow::Result<Vec<AssetBalance>> {
        Ok(self
            .balances
            .lock()
            .unwrap()
            .iter()
            .map(|(currency, free)| AssetBalance {
                currency: currency.clone(),
                free: *free,
                locked: 0.0,
            })
            .collect())
    }

    async fn get_last_trade_price(&self, _market: &str) -> anyhow::Result<f64> {
        Ok(10000.0)
    }
}
