//! The Exchange Gateway boundary.
//!
//! Deliberately abstract: the signed HTTP client to a concrete venue is an
//! external collaborator, out of scope for this crate. Everything in
//! `engine`/`reconciler` depends on the [`ExchangeGateway`] trait object, not
//! a concrete client, the same seam the teacher uses `async-trait` for at its
//! DEX-client boundary.

pub mod fill_poller;
pub mod http_gateway;
pub mod retry;
pub mod tick_table;

pub use fill_poller::{normalize, FillVerdict};
pub use http_gateway::HttpGateway;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone)]
pub struct PlaceOrderResult {
    pub order_id: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OpenOrder {
    pub order_id: String,
    pub side: Side,
    pub price: f64,
    pub volume: f64,
    pub created_at: chrono::DateTime<chrono::Local>,
}

#[derive(Debug, Clone)]
pub struct AssetBalance {
    pub currency: String,
    pub free: f64,
    pub locked: f64,
}

/// Abstract signed-REST exchange client.
///
/// Implementers substitute any compatible venue. `GetOrderDetail` returns a
/// duck-typed payload on purpose — see [`fill_poller`] for why.
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    async fn place_limit_order(
        &self,
        market: &str,
        side: Side,
        volume: f64,
        price: f64,
    ) -> anyhow::Result<PlaceOrderResult>;

    async fn get_order_detail(&self, order_id: &str) -> anyhow::Result<Value>;

    async fn cancel_order(&self, order_id: &str) -> anyhow::Result<bool>;

    async fn cancel_all_orders(&self, market: &str) -> anyhow::Result<()>;

    async fn get_open_orders(&self, market: &str, limit: usize) -> anyhow::Result<Vec<OpenOrder>>;

    async fn get_balance(&self) -> anyhow::Result<Vec<AssetBalance>>;

    async fn get_last_trade_price(&self, market: &str) -> anyhow::Result<f64>;
}
