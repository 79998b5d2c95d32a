//! Sina Finance quote adapter for Shanghai gold.
//!
//! Endpoint: `hq.sinajs.cn/list=gds_Au99_99`. The body is a JavaScript
//! assignment wrapping a comma-delimited quote string:
//!
//! ```text
//! var hq_str_gds_Au99_99="612.30,0,611.80,612.50,615.00,609.10,14:59:58,610.20,...";
//! ```
//!
//! Field 0 is the latest price and field 7 the previous close. Outside
//! trading hours the latest price reads exactly zero.

use async_trait::async_trait;
use cnh_common::SinaSourceConfig;

use super::source::{QuoteSource, SourceError};
use super::Signal;

/// Index of the latest price
const LATEST_FIELD: usize = 0;

/// Index of the previous close
const PREV_CLOSE_FIELD: usize = 7;

/// Extract the price from a Sina quote body.
pub fn parse_sina_quote(body: &str) -> Result<f64, SourceError> {
    let payload = body
        .split('"')
        .nth(1)
        .ok_or_else(|| SourceError::Malformed("missing quoted payload".into()))?;

    if payload.trim().is_empty() {
        return Err(SourceError::Malformed("empty quote payload".into()));
    }

    let fields: Vec<&str> = payload.split(',').collect();
    let latest = parse_field(&fields, LATEST_FIELD)?;

    if latest == 0.0 {
        return parse_field(&fields, PREV_CLOSE_FIELD);
    }

    Ok(latest)
}

fn parse_field(fields: &[&str], index: usize) -> Result<f64, SourceError> {
    let raw = fields
        .get(index)
        .ok_or_else(|| SourceError::Malformed(format!("field {} missing", index)))?;

    raw.trim()
        .parse::<f64>()
        .map_err(|e| SourceError::Malformed(format!("field {} ({:?}): {}", index, raw, e)))
}

/// Shanghai gold from Sina Finance.
pub struct SinaGoldSource {
    client: reqwest::Client,
    url: String,
    referer: String,
}

impl SinaGoldSource {
    pub fn new(client: reqwest::Client, config: &SinaSourceConfig) -> Self {
        Self {
            client,
            url: config.url.clone(),
            referer: config.referer.clone(),
        }
    }
}

#[async_trait]
impl QuoteSource for SinaGoldSource {
    fn name(&self) -> &'static str {
        "sina"
    }

    fn signal(&self) -> Signal {
        Signal::ShanghaiGold
    }

    async fn fetch_value(&self) -> Result<f64, SourceError> {
        let response = self
            .client
            .get(&self.url)
            .header(reqwest::header::REFERER, &self.referer)
            .send()
            .await
            .map_err(SourceError::from_reqwest)?;

        let response = SourceError::check_status(response)?;

        // Sina serves GBK; the numeric fields are ASCII either way.
        let bytes = response.bytes().await.map_err(SourceError::from_reqwest)?;
        parse_sina_quote(&String::from_utf8_lossy(&bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_latest_price() {
        let body = r#"var hq_str_gds_Au99_99="612.30,0,611.80,612.50,615.00,609.10,14:59:58,610.20,611.00";"#;
        assert_eq!(parse_sina_quote(body).unwrap(), 612.30);
    }

    #[test]
    fn test_zero_latest_uses_previous_close() {
        let body = r#"var hq_str_gds_Au99_99="0.00,0,0,0,0,0,00:00:00,608.75,0";"#;
        assert_eq!(parse_sina_quote(body).unwrap(), 608.75);
    }

    #[test]
    fn test_zero_latest_without_previous_close_is_malformed() {
        let body = r#"var hq_str_gds_Au99_99="0.00,0,0";"#;
        assert!(matches!(parse_sina_quote(body), Err(SourceError::Malformed(_))));
    }

    #[test]
    fn test_empty_payload() {
        let body = r#"var hq_str_gds_Au99_99="";"#;
        assert!(matches!(parse_sina_quote(body), Err(SourceError::Malformed(_))));
    }

    #[test]
    fn test_no_quotes_at_all() {
        assert!(parse_sina_quote("<html>Forbidden</html>").is_err());
    }

    #[test]
    fn test_non_numeric_field() {
        let body = r#"var hq_str_gds_Au99_99="--,0";"#;
        assert!(parse_sina_quote(body).is_err());
    }
}
