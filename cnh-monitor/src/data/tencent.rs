//! Tencent quote adapter for Shanghai gold.
//!
//! Endpoint: `qt.gtimg.cn/q=<symbol>`. The body wraps a tilde-delimited
//! record, with the latest price at a fixed offset (3 by default):
//!
//! ```text
//! v_sgAu9999="1~黄金9999~Au9999~612.40~611.80~...";
//! ```

use async_trait::async_trait;
use cnh_common::TencentSourceConfig;

use super::source::{QuoteSource, SourceError};
use super::Signal;

/// Extract the price at `field` from a Tencent quote body.
pub fn parse_tencent_quote(body: &str, field: usize) -> Result<f64, SourceError> {
    let payload = body
        .split('"')
        .nth(1)
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| SourceError::Malformed("missing quoted payload".into()))?;

    let raw = payload
        .split('~')
        .nth(field)
        .ok_or_else(|| SourceError::Malformed(format!("field {} missing", field)))?;

    raw.trim()
        .parse::<f64>()
        .map_err(|e| SourceError::Malformed(format!("field {} ({:?}): {}", field, raw, e)))
}

/// Shanghai gold from Tencent quotes.
pub struct TencentGoldSource {
    client: reqwest::Client,
    url: String,
    price_field: usize,
}

impl TencentGoldSource {
    pub fn new(client: reqwest::Client, config: &TencentSourceConfig) -> Self {
        Self {
            client,
            url: config.url.clone(),
            price_field: config.price_field,
        }
    }
}

#[async_trait]
impl QuoteSource for TencentGoldSource {
    fn name(&self) -> &'static str {
        "tencent"
    }

    fn signal(&self) -> Signal {
        Signal::ShanghaiGold
    }

    async fn fetch_value(&self) -> Result<f64, SourceError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(SourceError::from_reqwest)?;

        let response = SourceError::check_status(response)?;
        let bytes = response.bytes().await.map_err(SourceError::from_reqwest)?;
        parse_tencent_quote(&String::from_utf8_lossy(&bytes), self.price_field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_price_offset() {
        let body = "v_sgAu9999=\"1~黄金9999~Au9999~612.40~611.80~0~0\";";
        assert_eq!(parse_tencent_quote(body, 3).unwrap(), 612.40);
        assert_eq!(parse_tencent_quote(body, 4).unwrap(), 611.80);
    }

    #[test]
    fn test_short_record() {
        let body = "v_sgAu9999=\"1~黄金9999\";";
        assert!(matches!(
            parse_tencent_quote(body, 3),
            Err(SourceError::Malformed(msg)) if msg.contains("field 3")
        ));
    }

    #[test]
    fn test_unknown_symbol() {
        // Tencent answers unknown symbols with a "none_match" stub
        assert!(parse_tencent_quote("v_pv_none_match=\"1\";", 3).is_err());
        assert!(parse_tencent_quote("v_x=\"\";", 3).is_err());
    }
}
