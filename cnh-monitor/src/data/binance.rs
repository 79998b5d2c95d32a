//! Binance P2P adapter for the USDT/CNY peer price.
//!
//! Requests the first page of "buy USDT with CNY" advertisements in the
//! marketplace's own ranking and takes the first advertisement's price as
//! the prevailing rate.

use async_trait::async_trait;
use cnh_common::BinanceP2pSourceConfig;
use serde::Deserialize;
use serde_json::json;

use super::source::{QuoteSource, SourceError};
use super::Signal;

#[derive(Debug, Deserialize)]
struct P2pResponse {
    #[serde(default)]
    data: Option<Vec<P2pItem>>,
}

#[derive(Debug, Deserialize)]
struct P2pItem {
    adv: P2pAdvertisement,
}

#[derive(Debug, Deserialize)]
struct P2pAdvertisement {
    /// Prices come back as decimal strings
    price: String,
}

/// Extract the first advertisement's price from a search response body.
pub fn parse_p2p_response(body: &str) -> Result<f64, SourceError> {
    let response: P2pResponse = serde_json::from_str(body)
        .map_err(|e| SourceError::Malformed(format!("invalid P2P response: {}", e)))?;

    let first = response
        .data
        .unwrap_or_default()
        .into_iter()
        .next()
        .ok_or_else(|| SourceError::Malformed("no advertisements returned".into()))?;

    first
        .adv
        .price
        .trim()
        .parse::<f64>()
        .map_err(|e| SourceError::Malformed(format!("advertisement price {:?}: {}", first.adv.price, e)))
}

/// USDT/CNY from the Binance P2P marketplace.
pub struct BinanceP2pSource {
    client: reqwest::Client,
    url: String,
    rows: u32,
}

impl BinanceP2pSource {
    pub fn new(client: reqwest::Client, config: &BinanceP2pSourceConfig) -> Self {
        Self {
            client,
            url: config.url.clone(),
            rows: config.rows,
        }
    }

    fn search_body(&self) -> serde_json::Value {
        json!({
            "page": 1,
            "rows": self.rows,
            "payTypes": [],
            "asset": "USDT",
            "tradeType": "BUY",
            "fiat": "CNY",
            "publisherType": null,
        })
    }
}

#[async_trait]
impl QuoteSource for BinanceP2pSource {
    fn name(&self) -> &'static str {
        "binance_p2p"
    }

    fn signal(&self) -> Signal {
        Signal::UsdtCny
    }

    async fn fetch_value(&self) -> Result<f64, SourceError> {
        let response = self
            .client
            .post(&self.url)
            .json(&self.search_body())
            .send()
            .await
            .map_err(SourceError::from_reqwest)?;

        let response = SourceError::check_status(response)?;
        let body = response.text().await.map_err(SourceError::from_reqwest)?;
        parse_p2p_response(&body)
    }
}
