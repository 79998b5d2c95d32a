//! Market data acquisition for the CNH monitor.
//!
//! Every external quote is fetched through a [`QuoteSource`]; sources for the
//! same logical signal are ordered into a [`FallbackChain`]. The four batch
//! FX/commodity rates come from one [`SnapshotSource`] and form a
//! [`MarketSnapshot`], which is only ever produced whole.
//!
//! # Data Sources
//! - **Yahoo Finance** (batch): onshore CNY, offshore CNH, HKD, COMEX gold
//! - **Sina Finance** (primary): Shanghai Au99.99, comma-delimited quote string
//! - **Tencent** (backup): Shanghai Au99.99, tilde-delimited quote string
//! - **Shanghai Gold Exchange** (last resort): HTML quote table
//! - **Binance P2P** (only source): USDT/CNY buy advertisements

mod binance;
mod cache;
mod chain;
mod sge;
mod sina;
mod source;
mod tencent;
mod yahoo;

pub use binance::{parse_p2p_response, BinanceP2pSource};
pub use cache::{CachedBundle, Clock, ManualClock, SnapshotCache, SystemClock};
pub use chain::{ChainOutcome, FallbackChain, SourceAttempt};
pub use sge::{parse_sge_table, SgeHtmlSource};
pub use sina::{parse_sina_quote, SinaGoldSource};
pub use source::{QuoteSource, SnapshotSource, SourceError};
pub use tencent::{parse_tencent_quote, TencentGoldSource};
pub use yahoo::{parse_spark_response, YahooSnapshotSource};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Browser user agent; several quote endpoints reject bare HTTP clients.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Build the HTTP client shared by all sources.
pub fn build_http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

// ============================================================================
// Signals
// ============================================================================

/// Logical signals the monitor tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    /// Onshore USD/CNY
    OnshoreRmb,
    /// Offshore USD/CNH
    OffshoreRmb,
    /// USD/HKD
    Hkd,
    /// COMEX gold, USD per troy ounce
    InternationalGold,
    /// Shanghai Au99.99, CNY per gram
    ShanghaiGold,
    /// USDT/CNY peer-to-peer price
    UsdtCny,
    /// CNH HIBOR overnight, percent
    FundingRate,
}

impl Signal {
    /// Signals that make up a market snapshot, in reporting order.
    pub const BATCH: [Signal; 4] = [
        Signal::OnshoreRmb,
        Signal::OffshoreRmb,
        Signal::Hkd,
        Signal::InternationalGold,
    ];

    /// Yahoo Finance ticker for batch signals.
    pub fn yahoo_symbol(&self) -> Option<&'static str> {
        match self {
            Self::OnshoreRmb => Some("CNY=X"),
            Self::OffshoreRmb => Some("CNH=X"),
            Self::Hkd => Some("HKD=X"),
            Self::InternationalGold => Some("GC=F"),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OnshoreRmb => "onshore_rmb",
            Self::OffshoreRmb => "offshore_rmb",
            Self::Hkd => "hkd",
            Self::InternationalGold => "international_gold",
            Self::ShanghaiGold => "shanghai_gold",
            Self::UsdtCny => "usdt_cny",
            Self::FundingRate => "funding_rate",
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Quote
// ============================================================================

/// Source identifier used for operator-supplied values.
pub const MANUAL_SOURCE: &str = "manual";

/// A single fetched value for one signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub signal: Signal,
    pub value: f64,
    /// Name of the source that produced the value
    pub source: String,
    pub fetched_at: DateTime<Utc>,
}

impl Quote {
    pub fn new(signal: Signal, value: f64, source: impl Into<String>) -> Self {
        Self {
            signal,
            value,
            source: source.into(),
            fetched_at: Utc::now(),
        }
    }

    /// A value typed in by the operator rather than fetched.
    pub fn manual(signal: Signal, value: f64) -> Self {
        Self::new(signal, value, MANUAL_SOURCE)
    }

    pub fn is_manual(&self) -> bool {
        self.source == MANUAL_SOURCE
    }
}

// ============================================================================
// Market Snapshot
// ============================================================================

/// Errors from the batch snapshot request.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SnapshotError {
    /// One or more batch symbols had no usable value in the window
    #[error("snapshot incomplete, missing: {}", join_signals(.missing))]
    Incomplete { missing: Vec<Signal> },

    /// The batch request itself failed
    #[error("snapshot source failed: {0}")]
    Source(#[from] SourceError),
}

impl SnapshotError {
    /// Batch signals this error leaves unresolved.
    pub fn missing_signals(&self) -> Vec<Signal> {
        match self {
            Self::Incomplete { missing } => missing.clone(),
            Self::Source(_) => Signal::BATCH.to_vec(),
        }
    }
}

fn join_signals(signals: &[Signal]) -> String {
    signals
        .iter()
        .map(Signal::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// The four batch rates, all present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    /// USD/CNY
    pub onshore_rmb: f64,
    /// USD/CNH
    pub offshore_rmb: f64,
    /// USD/HKD
    pub hkd: f64,
    /// USD per troy ounce
    pub international_gold: f64,
    pub source: String,
    pub fetched_at: DateTime<Utc>,
}

impl MarketSnapshot {
    /// Assemble a snapshot from resolved batch values.
    ///
    /// Fails unless every batch signal has a value; a partial snapshot is
    /// never returned.
    pub fn assemble(
        values: &HashMap<Signal, f64>,
        source: impl Into<String>,
        fetched_at: DateTime<Utc>,
    ) -> Result<Self, SnapshotError> {
        let missing: Vec<Signal> = Signal::BATCH
            .iter()
            .copied()
            .filter(|s| !values.contains_key(s))
            .collect();

        if !missing.is_empty() {
            return Err(SnapshotError::Incomplete { missing });
        }

        Ok(Self {
            onshore_rmb: values[&Signal::OnshoreRmb],
            offshore_rmb: values[&Signal::OffshoreRmb],
            hkd: values[&Signal::Hkd],
            international_gold: values[&Signal::InternationalGold],
            source: source.into(),
            fetched_at,
        })
    }

    /// Value of a batch signal.
    pub fn get(&self, signal: Signal) -> Option<f64> {
        match signal {
            Signal::OnshoreRmb => Some(self.onshore_rmb),
            Signal::OffshoreRmb => Some(self.offshore_rmb),
            Signal::Hkd => Some(self.hkd),
            Signal::InternationalGold => Some(self.international_gold),
            _ => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
