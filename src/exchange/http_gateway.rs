//! A venue-agnostic REST implementation of [`ExchangeGateway`].
//!
//! The signed HTTP client for a specific exchange is deliberately out of
//! scope here — the auth/signing scheme is venue property, not something
//! this crate should hardcode. What this type provides is the generic REST
//! shape (plain JSON over `reqwest`, bearer-style credential headers) that
//! an operator wires up to a compatible venue by supplying `base_url` and
//! credentials; a venue whose signing differs substitutes its own
//! `ExchangeGateway` impl instead.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{AssetBalance, ExchangeGateway, OpenOrder, PlaceOrderResult, Side};
use crate::config::loader::Secrets;

pub struct HttpGateway {
    client: Client,
    base_url: String,
    access_key: Option<String>,
    secret_key: Option<String>,
}

impl HttpGateway {
    pub fn new(base_url: impl Into<String>, secrets: &Secrets) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            access_key: secrets.exchange_access_key.clone(),
            secret_key: secrets.exchange_secret_key.clone(),
        }
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match (&self.access_key, &self.secret_key) {
            (Some(access), Some(secret)) => builder
                .header("X-Access-Key", access)
                .header("X-Secret-Key", secret),
            _ => builder,
        }
    }
}

#[derive(Deserialize)]
struct OrderResponse {
    order_id: Option<String>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct OpenOrderResponse {
    order_id: String,
    side: Side,
    price: f64,
    volume: f64,
    created_at: chrono::DateTime<chrono::Local>,
}

#[derive(Deserialize)]
struct BalanceResponse {
    currency: String,
    free: f64,
    locked: f64,
}

#[async_trait]
impl ExchangeGateway for HttpGateway {
    async fn place_limit_order(
        &self,
        market: &str,
        side: Side,
        volume: f64,
        price: f64,
    ) -> anyhow::Result<PlaceOrderResult> {
        let resp: OrderResponse = self
            .authed(self.client.post(format!("{}/orders", self.base_url)))
            .json(&json!({ "market": market, "side": side, "volume": volume, "price": price }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(PlaceOrderResult {
            order_id: resp.order_id,
            error: resp.error,
        })
    }

    async fn get_order_detail(&self, order_id: &str) -> anyhow::Result<Value> {
        let payload = self
            .authed(self.client.get(format!("{}/order", self.base_url)))
            .query(&[("uuid", order_id)])
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await?;
        Ok(payload)
    }

    async fn cancel_order(&self, order_id: &str) -> anyhow::Result<bool> {
        let resp = self
            .authed(self.client.delete(format!("{}/order", self.base_url)))
            .query(&[("uuid", order_id)])
            .send()
            .await?;
        Ok(resp.status().is_success())
    }

    async fn cancel_all_orders(&self, market: &str) -> anyhow::Result<()> {
        self.authed(self.client.delete(format!("{}/orders", self.base_url)))
            .query(&[("market", market)])
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn get_open_orders(&self, market: &str, limit: usize) -> anyhow::Result<Vec<OpenOrder>> {
        let rows: Vec<OpenOrderResponse> = self
            .authed(self.client.get(format!("{}/orders/open", self.base_url)))
            .query(&[("market", market), ("limit", &limit.to_string())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| OpenOrder {
                order_id: r.order_id,
                side: r.side,
                price: r.price,
                volume: r.volume,
                created_at: r.created_at,
            })
            .collect())
    }

    async fn get_balance(&self) -> anyhow::Result<Vec<AssetBalance>> {
        let rows: Vec<BalanceResponse> = self
            .authed(self.client.get(format!("{}/accounts", self.base_url)))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| AssetBalance {
                currency: r.currency,
                free: r.free,
                locked: r.locked,
            })
            .collect())
    }

    async fn get_last_trade_price(&self, market: &str) -> anyhow::Result<f64> {
        #[derive(Deserialize)]
        struct Ticker {
            trade_price: f64,
        }
        let rows: Vec<Ticker> = self
            .client
            .get(format!("{}/ticker", self.base_url))
            .query(&[("markets", market)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        rows.into_iter()
            .next()
            .map(|t| t.trade_price)
            .ok_or_else(|| anyhow::anyhow!("no ticker entry returned for {market}"))
    }
}
