//! Yahoo Finance batch adapter for the market snapshot.
//!
//! One spark request covers all four batch symbols over a short window of
//! intraday bars. The newest bars are often null while the provider catches
//! up, so each symbol resolves to its last non-missing close in the window.
//!
//! Two response shapes are accepted:
//!
//! ```text
//! {"CNY=X": {"symbol": "CNY=X", "timestamp": [...], "close": [7.18, null, ...]}, ...}
//! {"spark": {"result": [{"symbol": "CNY=X", "response": [{"indicators": {"quote": [{"close": [...]}]}}]}]}}
//! ```

use async_trait::async_trait;
use chrono::Utc;
use cnh_common::YahooSourceConfig;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

use super::source::{SnapshotSource, SourceError};
use super::{MarketSnapshot, Signal, SnapshotError};

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SparkResponse {
    Wrapped { spark: SparkEnvelope },
    Flat(HashMap<String, SparkSeries>),
}

#[derive(Debug, Deserialize)]
struct SparkEnvelope {
    #[serde(default)]
    result: Option<Vec<SparkResult>>,
}

#[derive(Debug, Deserialize)]
struct SparkResult {
    symbol: String,
    #[serde(default)]
    response: Vec<ChartResult>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<SparkSeries>,
}

#[derive(Debug, Deserialize)]
struct SparkSeries {
    #[serde(default)]
    close: Option<Vec<Option<f64>>>,
}

impl SparkSeries {
    fn last_close(&self) -> Option<f64> {
        self.close
            .as_ref()?
            .iter()
            .rev()
            .flatten()
            .copied()
            .find(|v| v.is_finite() && *v > 0.0)
    }
}

/// Resolve each batch signal to its last usable close.
///
/// Symbols absent from the body, or with no usable close in the window,
/// are simply left out of the map.
pub fn parse_spark_response(body: &str) -> Result<HashMap<Signal, f64>, SourceError> {
    let response: SparkResponse = serde_json::from_str(body)
        .map_err(|e| SourceError::Malformed(format!("invalid spark response: {}", e)))?;

    let closes: HashMap<String, f64> = match response {
        SparkResponse::Flat(series) => series
            .into_iter()
            .filter_map(|(symbol, s)| s.last_close().map(|v| (symbol, v)))
            .collect(),
        SparkResponse::Wrapped { spark } => spark
            .result
            .unwrap_or_default()
            .into_iter()
            .filter_map(|r| {
                let close = r
                    .response
                    .iter()
                    .flat_map(|c| c.indicators.quote.iter())
                    .find_map(SparkSeries::last_close)?;
                Some((r.symbol, close))
            })
            .collect(),
    };

    Ok(Signal::BATCH
        .iter()
        .filter_map(|signal| {
            let symbol = signal.yahoo_symbol()?;
            closes.get(symbol).map(|v| (*signal, *v))
        })
        .collect())
}

// ============================================================================
// Yahoo Snapshot Source
// ============================================================================

/// Batch FX/gold snapshot from Yahoo Finance.
pub struct YahooSnapshotSource {
    client: reqwest::Client,
    url: String,
    range: String,
    interval: String,
}

impl YahooSnapshotSource {
    pub fn new(client: reqwest::Client, config: &YahooSourceConfig) -> Self {
        Self {
            client,
            url: config.url.clone(),
            range: config.range.clone(),
            interval: config.interval.clone(),
        }
    }

    fn symbols() -> String {
        Signal::BATCH
            .iter()
            .filter_map(Signal::yahoo_symbol)
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[async_trait]
impl SnapshotSource for YahooSnapshotSource {
    fn name(&self) -> &'static str {
        "yahoo"
    }

    async fn fetch_snapshot(&self) -> Result<MarketSnapshot, SnapshotError> {
        let symbols = Self::symbols();
        debug!(symbols = %symbols, range = %self.range, interval = %self.interval, "Fetching spark batch");

        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("symbols", symbols.as_str()),
                ("range", self.range.as_str()),
                ("interval", self.interval.as_str()),
            ])
            .send()
            .await
            .map_err(SourceError::from_reqwest)?;

        let response = SourceError::check_status(response)?;
        let body = response.text().await.map_err(SourceError::from_reqwest)?;
        let values = parse_spark_response(&body)?;

        MarketSnapshot::assemble(&values, self.name(), Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_shape_last_non_missing() {
        let body = r#"{
            "CNY=X": {"symbol": "CNY=X", "timestamp": [1, 2, 3], "close": [7.17, 7.18, null]},
            "CNH=X": {"symbol": "CNH=X", "timestamp": [1, 2, 3], "close": [7.20, null, 7.22]},
            "HKD=X": {"symbol": "HKD=X", "timestamp": [1, 2], "close": [7.81, 7.82]},
            "GC=F":  {"symbol": "GC=F",  "timestamp": [1, 2, 3], "close": [2350.5, null, null]}
        }"#;

        let values = parse_spark_response(body).unwrap();
        assert_eq!(values[&Signal::OnshoreRmb], 7.18);
        assert_eq!(values[&Signal::OffshoreRmb], 7.22);
        assert_eq!(values[&Signal::Hkd], 7.82);
        assert_eq!(values[&Signal::InternationalGold], 2350.5);
    }

    #[test]
    fn test_all_null_series_is_missing() {
        let body = r#"{
            "CNY=X": {"close": [null, null]},
            "CNH=X": {"close": [7.2]},
            "HKD=X": {"close": null},
            "GC=F":  {"close": [0.0]}
        }"#;

        let values = parse_spark_response(body).unwrap();
        assert_eq!(values.len(), 1);
        assert!(values.contains_key(&Signal::OffshoreRmb));

        let err = MarketSnapshot::assemble(&values, "yahoo", Utc::now()).unwrap_err();
        assert_eq!(
            err.missing_signals(),
            vec![Signal::OnshoreRmb, Signal::Hkd, Signal::InternationalGold]
        );
    }

    #[test]
    fn test_wrapped_shape() {
        let body = r#"{"spark": {"result": [
            {"symbol": "CNY=X", "response": [{"indicators": {"quote": [{"close": [7.1, 7.11]}]}}]},
            {"symbol": "GC=F",  "response": [{"indicators": {"quote": [{"close": [1999.0, null]}]}}]}
        ], "error": null}}"#;

        let values = parse_spark_response(body).unwrap();
        assert_eq!(values[&Signal::OnshoreRmb], 7.11);
        assert_eq!(values[&Signal::InternationalGold], 1999.0);
        assert!(!values.contains_key(&Signal::Hkd));
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(matches!(
            parse_spark_response("Too Many Requests"),
            Err(SourceError::Malformed(_))
        ));
    }

    #[test]
    fn test_symbols_query() {
        assert_eq!(YahooSnapshotSource::symbols(), "CNY=X,CNH=X,HKD=X,GC=F");
    }
}
