//! Quote source abstraction.
//!
//! Defines the `QuoteSource` trait each single-value fetch strategy
//! implements, and the `SnapshotSource` trait for the batch FX request.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use super::{MarketSnapshot, Quote, Signal, SnapshotError};

// ============================================================================
// Source Error
// ============================================================================

/// Why a single source produced no value.
///
/// Never escapes a fallback chain; it is logged and turned into absence.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SourceError {
    /// Connection failed or the body could not be read
    #[error("network error: {0}")]
    Network(String),

    /// The call did not finish within its timeout
    #[error("timed out")]
    Timeout,

    /// Non-2xx response
    #[error("HTTP {0}")]
    HttpStatus(u16),

    /// Payload did not have the expected shape
    #[error("malformed payload: {0}")]
    Malformed(String),

    /// Parsed fine but outside the plausible range
    #[error("implausible value {value} (expected {min}..={max})")]
    Implausible { value: f64, min: f64, max: f64 },
}

impl SourceError {
    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Network(err.to_string())
        }
    }

    /// Check a response status, returning the response on 2xx.
    pub(crate) fn check_status(response: reqwest::Response) -> Result<reqwest::Response, Self> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(Self::HttpStatus(status.as_u16()))
        }
    }
}

// ============================================================================
// Quote Source Trait
// ============================================================================

/// A fetch strategy for one external data point.
///
/// Implementations only report the raw parsed value. [`fetch_within`] bounds
/// it with a timeout; plausibility filtering is applied by the owning
/// [`FallbackChain`](super::FallbackChain).
///
/// [`fetch_within`]: QuoteSource::fetch_within
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Source name used in logs and in `Quote::source` (e.g., "sina")
    fn name(&self) -> &'static str;

    /// The logical signal this source provides
    fn signal(&self) -> Signal;

    /// Fetch and parse the current value.
    async fn fetch_value(&self) -> Result<f64, SourceError>;

    /// Fetch the value, failing with [`SourceError::Timeout`] once `timeout` elapses.
    async fn fetch_within(&self, timeout: Duration) -> Result<f64, SourceError> {
        tokio::time::timeout(timeout, self.fetch_value())
            .await
            .map_err(|_| SourceError::Timeout)?
    }

    /// Fetch with a timeout, converting every failure into absence.
    async fn fetch(&self, timeout: Duration) -> Option<Quote> {
        match self.fetch_within(timeout).await {
            Ok(value) => Some(Quote::new(self.signal(), value, self.name())),
            Err(e) => {
                debug!(source = self.name(), signal = %self.signal(), error = %e, "Source fetch failed");
                None
            }
        }
    }
}

// ============================================================================
// Snapshot Source Trait
// ============================================================================

/// A batched multi-symbol request producing a whole [`MarketSnapshot`].
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Source name (e.g., "yahoo")
    fn name(&self) -> &'static str;

    /// Fetch all batch signals in one request.
    async fn fetch_snapshot(&self) -> Result<MarketSnapshot, SnapshotError>;
}
