//! Ordered fallback across quote sources for one signal.
//!
//! Sources are tried in the order they were added. The first value that
//! arrives within the timeout and passes the signal's plausibility range
//! wins; an exhausted chain yields no quote, which callers treat as a normal
//! outcome rather than an error.

use cnh_common::PlausibleRange;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::source::{QuoteSource, SourceError};
use super::{Quote, Signal};

/// Result of trying one source.
#[derive(Debug, Clone, Serialize)]
pub struct SourceAttempt {
    pub source: &'static str,
    /// `None` when the source produced the winning value
    pub error: Option<String>,
}

/// Everything a chain run produced.
#[derive(Debug, Clone)]
pub struct ChainOutcome {
    pub signal: Signal,
    pub quote: Option<Quote>,
    pub attempts: Vec<SourceAttempt>,
}

/// Ordered fallback chain for one logical signal.
pub struct FallbackChain {
    signal: Signal,
    /// `None` accepts any finite value
    plausible: Option<PlausibleRange>,
    sources: Vec<Arc<dyn QuoteSource>>,
}

impl FallbackChain {
    /// Create an empty chain for a signal.
    pub fn new(signal: Signal, plausible: Option<PlausibleRange>) -> Self {
        Self {
            signal,
            plausible,
            sources: Vec::new(),
        }
    }

    /// Append a source at the lowest priority.
    pub fn with_source(mut self, source: Arc<dyn QuoteSource>) -> Self {
        if source.signal() != self.signal {
            warn!(
                source = source.name(),
                expected = %self.signal,
                actual = %source.signal(),
                "Source registered on a chain for a different signal"
            );
        }
        self.sources.push(source);
        self
    }

    pub fn signal(&self) -> Signal {
        self.signal
    }

    pub fn plausible_range(&self) -> Option<PlausibleRange> {
        self.plausible
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Names of the sources in priority order.
    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Return the first plausible quote, or `None` once every source failed.
    pub async fn fetch(&self, timeout: Duration) -> Option<Quote> {
        self.fetch_detailed(timeout).await.quote
    }

    /// Like [`fetch`](Self::fetch) but also reports why each source was skipped.
    pub async fn fetch_detailed(&self, timeout: Duration) -> ChainOutcome {
        let mut attempts = Vec::with_capacity(self.sources.len());

        for source in &self.sources {
            let name = source.name();
            debug!(signal = %self.signal, source = name, "Trying quote source");

            match self.try_source(source.as_ref(), timeout).await {
                Ok(value) => {
                    info!(signal = %self.signal, source = name, value, "Quote accepted");
                    attempts.push(SourceAttempt {
                        source: name,
                        error: None,
                    });
                    return ChainOutcome {
                        signal: self.signal,
                        quote: Some(Quote::new(self.signal, value, name)),
                        attempts,
                    };
                }
                Err(e) => {
                    warn!(signal = %self.signal, source = name, error = %e, "Quote source failed, falling back");
                    attempts.push(SourceAttempt {
                        source: name,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        if !self.sources.is_empty() {
            warn!(signal = %self.signal, tried = attempts.len(), "All quote sources exhausted");
        }

        ChainOutcome {
            signal: self.signal,
            quote: None,
            attempts,
        }
    }

    async fn try_source(&self, source: &dyn QuoteSource, timeout: Duration) -> Result<f64, SourceError> {
        let value = source.fetch_within(timeout).await?;
        self.check_plausible(value)
    }

    fn check_plausible(&self, value: f64) -> Result<f64, SourceError> {
        match self.plausible {
            Some(range) if !range.contains(value) => Err(SourceError::Implausible {
                value,
                min: range.min,
                max: range.max,
            }),
            None if !value.is_finite() => Err(SourceError::Malformed(format!(
                "non-finite value {}",
                value
            ))),
            _ => Ok(value),
        }
    }
}

impl std::fmt::Debug for FallbackChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackChain")
            .field("signal", &self.signal)
            .field("plausible", &self.plausible)
            .field("sources", &self.source_names())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct MockSource {
        name: &'static str,
        result: Result<f64, SourceError>,
        calls: AtomicU32,
    }

    impl MockSource {
        fn new(name: &'static str, result: Result<f64, SourceError>) -> Arc<Self> {
            Arc::new(Self {
                name,
                result,
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::Relaxed)
        }
    }

    #[async_trait]
    impl QuoteSource for MockSource {
        fn name(&self) -> &'static str {
            self.name
        }

        fn signal(&self) -> Signal {
            Signal::ShanghaiGold
        }

        async fn fetch_value(&self) -> Result<f64, SourceError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            self.result.clone()
        }
    }

    fn gold_chain(sources: &[Arc<MockSource>]) -> FallbackChain {
        sources.iter().fold(
            FallbackChain::new(Signal::ShanghaiGold, Some(PlausibleRange::new(400.0, 1000.0))),
            |chain, s| chain.with_source(s.clone()),
        )
    }

    const TIMEOUT: Duration = Duration::from_secs(1);

    #[tokio::test]
    async fn test_first_plausible_wins() {
        let first = MockSource::new("first", Ok(612.3));
        let second = MockSource::new("second", Ok(600.0));
        let chain = gold_chain(&[first.clone(), second.clone()]);

        let quote = chain.fetch(TIMEOUT).await.unwrap();
        assert_eq!(quote.value, 612.3);
        assert_eq!(quote.source, "first");
        assert_eq!(second.calls(), 0);
    }

    #[tokio::test]
    async fn test_implausible_falls_back() {
        let first = MockSource::new("first", Ok(0.0));
        let second = MockSource::new("second", Ok(605.5));
        let chain = gold_chain(&[first.clone(), second.clone()]);

        let outcome = chain.fetch_detailed(TIMEOUT).await;
        let quote = outcome.quote.unwrap();
        assert_eq!(quote.value, 605.5);
        assert_eq!(quote.source, "second");
        assert_eq!(outcome.attempts.len(), 2);
        assert!(outcome.attempts[0].error.as_deref().unwrap().contains("implausible"));
        assert!(outcome.attempts[1].error.is_none());
    }

    #[tokio::test]
    async fn test_error_falls_back() {
        let first = MockSource::new("first", Err(SourceError::Network("refused".into())));
        let second = MockSource::new("second", Err(SourceError::Malformed("no quotes".into())));
        let third = MockSource::new("third", Ok(588.0));
        let chain = gold_chain(&[first, second, third.clone()]);

        let quote = chain.fetch(TIMEOUT).await.unwrap();
        assert_eq!(quote.source, "third");
        assert_eq!(third.calls(), 1);
    }

    #[tokio::test]
    async fn test_all_failing_is_absent() {
        let chain = gold_chain(&[
            MockSource::new("a", Ok(1500.0)),
            MockSource::new("b", Err(SourceError::HttpStatus(500))),
            MockSource::new("c", Ok(f64::NAN)),
        ]);

        let outcome = chain.fetch_detailed(TIMEOUT).await;
        assert!(outcome.quote.is_none());
        assert_eq!(outcome.attempts.len(), 3);
        assert!(outcome.attempts.iter().all(|a| a.error.is_some()));
    }

    #[tokio::test]
    async fn test_empty_chain_is_absent() {
        let chain = FallbackChain::new(Signal::FundingRate, None);
        assert!(chain.is_empty());
        assert!(chain.fetch(TIMEOUT).await.is_none());
    }

    #[tokio::test]
    async fn test_unbounded_chain_accepts_any_finite() {
        let chain = FallbackChain::new(Signal::ShanghaiGold, None)
            .with_source(MockSource::new("only", Ok(-3.5)));
        assert_eq!(chain.fetch(TIMEOUT).await.unwrap().value, -3.5);
    }

    #[test]
    fn test_source_names_in_order() {
        let chain = gold_chain(&[
            MockSource::new("sina", Ok(600.0)),
            MockSource::new("tencent", Ok(600.0)),
            MockSource::new("sge", Ok(600.0)),
        ]);
        assert_eq!(chain.source_names(), vec!["sina", "tencent", "sge"]);
        assert_eq!(chain.len(), 3);
    }
}
