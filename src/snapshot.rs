//! Point-in-time order book snapshots from the public REST API
//!
//! The streaming core only depends on the [`SnapshotFetcher`] trait; the
//! Bithumb HTTP implementation lives here alongside it.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use crate::codec::{deserialize_decimal, deserialize_timestamp, STATUS_OK};
use crate::error::FetchError;

/// One resting level of the book
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PriceQuantity {
    /// Quantity resting at this price
    #[serde(deserialize_with = "deserialize_decimal")]
    pub quantity: Decimal,

    /// Price level
    #[serde(deserialize_with = "deserialize_decimal")]
    pub price: Decimal,
}

/// Order book depth for one symbol at one instant
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OrderBookSnapshot {
    /// Server timestamp in milliseconds
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: i64,

    /// Order currency, e.g. `BTC`
    pub order_currency: String,

    /// Payment currency, e.g. `KRW`
    pub payment_currency: String,

    /// Buy side, unordered as served
    pub bids: Vec<PriceQuantity>,

    /// Sell side, unordered as served
    pub asks: Vec<PriceQuantity>,
}

impl OrderBookSnapshot {
    /// Lowest ask price, if any asks are present
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.iter().map(|level| level.price).min()
    }

    /// Highest bid price, if any bids are present
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.iter().map(|level| level.price).max()
    }
}

/// Source of on-demand order book snapshots.
///
/// Kept behind a trait so strategy code can be exercised without the network.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SnapshotFetcher: Send + Sync {
    async fn fetch(&self, symbol: &str) -> Result<OrderBookSnapshot, FetchError>;
}

/// REST response envelope: success carries `data`, rejection carries `message`
#[derive(Debug, Deserialize)]
struct RestEnvelope {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

/// Fetches order book depth from the Bithumb public REST API
pub struct BithumbSnapshotFetcher {
    http: reqwest::Client,
    endpoint: String,
    depth: u32,
}

impl BithumbSnapshotFetcher {
    /// `endpoint` is the API base, e.g. `https://api.bithumb.com`; `depth` is
    /// the number of levels requested per side.
    pub fn new(endpoint: impl Into<String>, depth: u32) -> Self {
        let endpoint = endpoint.into();
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            depth,
        }
    }
}

#[async_trait]
impl SnapshotFetcher for BithumbSnapshotFetcher {
    async fn fetch(&self, symbol: &str) -> Result<OrderBookSnapshot, FetchError> {
        let url = format!(
            "{}/public/orderbook/{}?count={}",
            self.endpoint, symbol, self.depth
        );
        debug!(symbol = %symbol, url = %url, "Fetching order book snapshot");

        let body = self.http.get(&url).send().await?.text().await?;
        parse_orderbook_response(&body)
    }
}

/// Unwrap the REST envelope and decode the order book payload
fn parse_orderbook_response(body: &str) -> Result<OrderBookSnapshot, FetchError> {
    let envelope: RestEnvelope = serde_json::from_str(body)
        .map_err(|e| FetchError::Malformed(format!("envelope: {e}")))?;

    if envelope.status != STATUS_OK {
        let message = envelope.message.unwrap_or_default();
        return Err(FetchError::Rejected(format!(
            "status {}: {}",
            envelope.status, message
        )));
    }

    let data = envelope
        .data
        .ok_or_else(|| FetchError::Malformed("missing data".to_string()))?;
    serde_json::from_value(data).map_err(|e| FetchError::Malformed(e.to_string()))
}
