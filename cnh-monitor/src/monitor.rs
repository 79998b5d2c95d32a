//! Acquisition cycle orchestration.
//!
//! `MarketMonitor` owns the snapshot source, the three auxiliary fallback
//! chains, the bundle cache, and the classifier. One cycle fetches the batch
//! snapshot and every chain concurrently, caches the bundle, then applies
//! manual overrides, computes metrics, and classifies risk.

use chrono::{DateTime, Utc};
use cnh_common::{MonitorConfig, PlausibleRange};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::data::{
    build_http_client, BinanceP2pSource, CachedBundle, ChainOutcome, Clock, FallbackChain,
    MarketSnapshot, Quote, SgeHtmlSource, Signal, SinaGoldSource, SnapshotCache, SnapshotError,
    SnapshotSource, SourceAttempt, SourceError, SystemClock, TencentGoldSource,
    YahooSnapshotSource,
};
use crate::metrics::{DerivedMetrics, MetricEngine};
use crate::risk::{ActionChecklist, RiskAssessment, RiskClassifier, RiskThresholds};

/// Default cache lifetime.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

/// Default per-call timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Cycle Types
// ============================================================================

/// Everything one acquisition cycle produced.
#[derive(Debug, Clone, Serialize)]
pub struct AcquisitionBundle {
    pub snapshot: MarketSnapshot,
    pub shanghai_gold: Option<Quote>,
    pub usdt_cny: Option<Quote>,
    pub funding_rate: Option<Quote>,
    /// Per-source outcomes for the auxiliary chains
    pub attempts: Vec<ChainAttempts>,
}

/// Sources tried for one chain during a cycle.
#[derive(Debug, Clone, Serialize)]
pub struct ChainAttempts {
    pub signal: Signal,
    pub attempts: Vec<SourceAttempt>,
}

impl From<&ChainOutcome> for ChainAttempts {
    fn from(outcome: &ChainOutcome) -> Self {
        Self {
            signal: outcome.signal,
            attempts: outcome.attempts.clone(),
        }
    }
}

/// Operator-supplied values that take precedence over fetched ones.
///
/// `None` means "not provided", which is distinct from `Some(0.0)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct ManualOverrides {
    #[serde(default)]
    pub shanghai_gold: Option<f64>,
    #[serde(default)]
    pub funding_rate: Option<f64>,
}

impl ManualOverrides {
    /// Reject overrides that are present but not finite.
    pub fn validate(&self) -> cnh_common::Result<()> {
        for (field, value) in [
            ("shanghai_gold", self.shanghai_gold),
            ("funding_rate", self.funding_rate),
        ] {
            if let Some(value) = value.filter(|v| !v.is_finite()) {
                return Err(cnh_common::Error::InvalidInput(format!(
                    "{} must be a finite number, got {}",
                    field, value
                )));
            }
        }
        Ok(())
    }
}

/// The batch snapshot could not be assembled this cycle.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[error("market data unavailable: {reason}")]
pub struct AcquisitionFailure {
    pub reason: String,
    /// Every signal that had no value this cycle
    pub unavailable: Vec<Signal>,
}

impl From<AcquisitionFailure> for cnh_common::Error {
    fn from(failure: AcquisitionFailure) -> Self {
        cnh_common::Error::Unavailable(failure.to_string())
    }
}

/// Which source supplied each value in a report.
#[derive(Debug, Clone, Serialize)]
pub struct ReportSources {
    pub snapshot: String,
    pub shanghai_gold: Option<String>,
    pub usdt_cny: Option<String>,
    pub funding_rate: Option<String>,
}

/// Everything the presentation layer needs for one refresh.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorReport {
    pub metrics: DerivedMetrics,
    pub assessment: RiskAssessment,
    pub checklist: ActionChecklist,
    pub sources: ReportSources,
    pub unavailable: Vec<Signal>,
    /// When the underlying bundle was fetched
    pub fetched_at: DateTime<Utc>,
    pub generated_at: DateTime<Utc>,
}

/// Registered sources for the signals they provide.
#[derive(Debug, Clone, Serialize)]
pub struct SourceListing {
    pub signals: Vec<Signal>,
    pub sources: Vec<&'static str>,
    pub plausible: Option<PlausibleRange>,
}

// ============================================================================
// Market Monitor
// ============================================================================

/// Runs acquisition cycles and turns them into reports.
pub struct MarketMonitor {
    snapshot_source: Arc<dyn SnapshotSource>,
    gold: FallbackChain,
    usdt: FallbackChain,
    funding: FallbackChain,
    cache: SnapshotCache<AcquisitionBundle>,
    classifier: RiskClassifier,
    timeout: Duration,
}

impl MarketMonitor {
    /// Start building a monitor around a batch snapshot source.
    pub fn builder(snapshot_source: Arc<dyn SnapshotSource>) -> MarketMonitorBuilder {
        MarketMonitorBuilder::new(snapshot_source)
    }

    /// Wire the production sources from configuration.
    pub fn from_config(config: &MonitorConfig) -> Self {
        let timeout = config.request_timeout();
        let client = build_http_client(timeout);
        let sources = &config.sources;
        let thresholds = &config.thresholds;

        let gold = FallbackChain::new(Signal::ShanghaiGold, Some(thresholds.shanghai_gold_range))
            .with_source(Arc::new(SinaGoldSource::new(client.clone(), &sources.sina)))
            .with_source(Arc::new(TencentGoldSource::new(client.clone(), &sources.tencent)))
            .with_source(Arc::new(SgeHtmlSource::new(client.clone(), &sources.sge)));

        let usdt = FallbackChain::new(Signal::UsdtCny, Some(thresholds.usdt_range))
            .with_source(Arc::new(BinanceP2pSource::new(client.clone(), &sources.binance_p2p)));

        // No public source; supplied through manual overrides
        let funding = FallbackChain::new(Signal::FundingRate, None);

        Self::builder(Arc::new(YahooSnapshotSource::new(client, &sources.yahoo)))
            .gold_chain(gold)
            .usdt_chain(usdt)
            .funding_chain(funding)
            .thresholds(RiskThresholds::from_config(thresholds))
            .cache_ttl(config.cache_ttl())
            .timeout(timeout)
            .build()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn classifier(&self) -> &RiskClassifier {
        &self.classifier
    }

    /// Registered sources for every signal, in priority order.
    pub fn sources(&self) -> Vec<SourceListing> {
        let mut listings = vec![SourceListing {
            signals: Signal::BATCH.to_vec(),
            sources: vec![self.snapshot_source.name()],
            plausible: None,
        }];
        listings.extend([&self.gold, &self.usdt, &self.funding].into_iter().map(|chain| {
            SourceListing {
                signals: vec![chain.signal()],
                sources: chain.source_names(),
                plausible: chain.plausible_range(),
            }
        }));
        listings
    }

    /// Run one uncached acquisition cycle.
    ///
    /// The batch request and all chains run concurrently, each call under
    /// its own timeout. Only a missing snapshot fails the cycle.
    pub async fn acquire(&self) -> Result<AcquisitionBundle, AcquisitionFailure> {
        let (snapshot, gold, usdt, funding) = tokio::join!(
            self.fetch_snapshot(),
            self.gold.fetch_detailed(self.timeout),
            self.usdt.fetch_detailed(self.timeout),
            self.funding.fetch_detailed(self.timeout),
        );

        let attempts = [&gold, &usdt, &funding]
            .into_iter()
            .filter(|o| !o.attempts.is_empty())
            .map(ChainAttempts::from)
            .collect();

        match snapshot {
            Ok(snapshot) => {
                info!(
                    source = %snapshot.source,
                    onshore = snapshot.onshore_rmb,
                    offshore = snapshot.offshore_rmb,
                    shanghai_gold = gold.quote.is_some(),
                    usdt_cny = usdt.quote.is_some(),
                    "Acquisition cycle complete"
                );
                Ok(AcquisitionBundle {
                    snapshot,
                    shanghai_gold: gold.quote,
                    usdt_cny: usdt.quote,
                    funding_rate: funding.quote,
                    attempts,
                })
            }
            Err(e) => {
                let mut unavailable = e.missing_signals();
                unavailable.extend(
                    [&gold, &usdt, &funding]
                        .into_iter()
                        .filter(|o| o.quote.is_none())
                        .map(|o| o.signal),
                );
                warn!(error = %e, ?unavailable, "Acquisition cycle failed");
                Err(AcquisitionFailure {
                    reason: e.to_string(),
                    unavailable,
                })
            }
        }
    }

    async fn fetch_snapshot(&self) -> Result<MarketSnapshot, SnapshotError> {
        tokio::time::timeout(self.timeout, self.snapshot_source.fetch_snapshot())
            .await
            .map_err(|_| SnapshotError::Source(SourceError::Timeout))?
    }

    /// The cached bundle, fetching a new one when stale or missing.
    pub async fn bundle(&self) -> Result<Arc<CachedBundle<AcquisitionBundle>>, AcquisitionFailure> {
        self.cache.get_or_fetch(|| self.acquire()).await
    }

    /// Produce a report from the cached (or freshly fetched) bundle.
    pub async fn report(&self, overrides: &ManualOverrides) -> Result<MonitorReport, AcquisitionFailure> {
        let bundle = self.bundle().await?;
        Ok(self.build_report(&bundle, overrides))
    }

    /// Drop the cached bundle and produce a report from a fresh fetch.
    pub async fn refresh(&self, overrides: &ManualOverrides) -> Result<MonitorReport, AcquisitionFailure> {
        self.invalidate();
        self.report(overrides).await
    }

    /// Drop the cached bundle.
    pub fn invalidate(&self) {
        self.cache.invalidate();
    }

    fn build_report(&self, bundle: &CachedBundle<AcquisitionBundle>, overrides: &ManualOverrides) -> MonitorReport {
        let acquired = &bundle.value;

        let shanghai_gold = prefer_manual(Signal::ShanghaiGold, overrides.shanghai_gold, &acquired.shanghai_gold);
        let funding_rate = prefer_manual(Signal::FundingRate, overrides.funding_rate, &acquired.funding_rate);
        let usdt_cny = acquired.usdt_cny.clone();

        let generated_at = Utc::now();
        let metrics = MetricEngine::compute_at(
            &acquired.snapshot,
            shanghai_gold.as_ref().map(|q| q.value),
            usdt_cny.as_ref().map(|q| q.value),
            generated_at,
        );

        let funding_value = funding_rate.as_ref().map(|q| q.value);
        let assessment = self.classifier.classify(&metrics, funding_value);
        let checklist = self.classifier.checklist(&metrics);

        let unavailable = [
            (Signal::ShanghaiGold, &shanghai_gold),
            (Signal::UsdtCny, &usdt_cny),
            (Signal::FundingRate, &funding_rate),
        ]
        .into_iter()
        .filter(|(_, quote)| quote.is_none())
        .map(|(signal, _)| signal)
        .collect();

        MonitorReport {
            metrics,
            assessment,
            checklist,
            sources: ReportSources {
                snapshot: acquired.snapshot.source.clone(),
                shanghai_gold: shanghai_gold.map(|q| q.source),
                usdt_cny: usdt_cny.map(|q| q.source),
                funding_rate: funding_rate.map(|q| q.source),
            },
            unavailable,
            fetched_at: bundle.fetched_at,
            generated_at,
        }
    }
}

/// Non-finite manual values never reach the metrics; the fetched quote stands.
fn prefer_manual(signal: Signal, manual: Option<f64>, fetched: &Option<Quote>) -> Option<Quote> {
    match manual {
        Some(value) if value.is_finite() => Some(Quote::manual(signal, value)),
        Some(value) => {
            warn!(signal = %signal, value, "Ignoring non-finite manual override");
            fetched.clone()
        }
        None => fetched.clone(),
    }
}

impl std::fmt::Debug for MarketMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketMonitor")
            .field("snapshot_source", &self.snapshot_source.name())
            .field("gold", &self.gold)
            .field("usdt", &self.usdt)
            .field("funding", &self.funding)
            .field("cache", &self.cache)
            .field("timeout", &self.timeout)
            .finish()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`MarketMonitor`].
pub struct MarketMonitorBuilder {
    snapshot_source: Arc<dyn SnapshotSource>,
    gold: FallbackChain,
    usdt: FallbackChain,
    funding: FallbackChain,
    thresholds: RiskThresholds,
    cache_ttl: Duration,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl MarketMonitorBuilder {
    fn new(snapshot_source: Arc<dyn SnapshotSource>) -> Self {
        let thresholds = RiskThresholds::default();
        Self {
            snapshot_source,
            gold: FallbackChain::new(Signal::ShanghaiGold, None),
            usdt: FallbackChain::new(Signal::UsdtCny, None),
            funding: FallbackChain::new(Signal::FundingRate, None),
            thresholds,
            cache_ttl: DEFAULT_CACHE_TTL,
            clock: Arc::new(SystemClock),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn gold_chain(mut self, chain: FallbackChain) -> Self {
        self.gold = chain;
        self
    }

    pub fn usdt_chain(mut self, chain: FallbackChain) -> Self {
        self.usdt = chain;
        self
    }

    pub fn funding_chain(mut self, chain: FallbackChain) -> Self {
        self.funding = chain;
        self
    }

    pub fn thresholds(mut self, thresholds: RiskThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Clock used for cache expiry.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> MarketMonitor {
        MarketMonitor {
            snapshot_source: self.snapshot_source,
            gold: self.gold,
            usdt: self.usdt,
            funding: self.funding,
            cache: SnapshotCache::with_clock(self.cache_ttl, self.clock),
            classifier: RiskClassifier::new(self.thresholds),
            timeout: self.timeout,
        }
    }
}
