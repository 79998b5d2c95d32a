//! Integration tests for the full acquisition → metrics → risk cycle.
//!
//! Uses stub sources and a manual clock so caching and classification can
//! be checked without network access or sleeping.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use cnh_common::PlausibleRange;

use cnh_monitor::data::{
    FallbackChain, ManualClock, MarketSnapshot, QuoteSource, Signal, SnapshotError,
    SnapshotSource, SourceError,
};
use cnh_monitor::risk::RiskRule;
use cnh_monitor::{ManualOverrides, MarketMonitor, RiskLevel};

// ============================================================================
// Stub Sources
// ============================================================================

/// Snapshot source returning fixed rates until told to fail
struct StubSnapshot {
    onshore: f64,
    offshore: f64,
    failing: AtomicBool,
    calls: AtomicU32,
}

impl StubSnapshot {
    fn new(onshore: f64, offshore: f64) -> Arc<Self> {
        Arc::new(Self {
            onshore,
            offshore,
            failing: AtomicBool::new(false),
            calls: AtomicU32::new(0),
        })
    }

    fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    fn call_count(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl SnapshotSource for StubSnapshot {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn fetch_snapshot(&self) -> Result<MarketSnapshot, SnapshotError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if self.failing.load(Ordering::Relaxed) {
            return Err(SnapshotError::Incomplete {
                missing: vec![Signal::Hkd, Signal::InternationalGold],
            });
        }
        Ok(MarketSnapshot {
            onshore_rmb: self.onshore,
            offshore_rmb: self.offshore,
            hkd: 7.83,
            international_gold: 2000.0,
            source: "stub".into(),
            fetched_at: Utc::now(),
        })
    }
}

struct StubQuote {
    name: &'static str,
    signal: Signal,
    value: f64,
}

#[async_trait]
impl QuoteSource for StubQuote {
    fn name(&self) -> &'static str {
        self.name
    }

    fn signal(&self) -> Signal {
        self.signal
    }

    async fn fetch_value(&self) -> Result<f64, SourceError> {
        Ok(self.value)
    }
}

fn gold_chain(value: f64) -> FallbackChain {
    FallbackChain::new(Signal::ShanghaiGold, Some(PlausibleRange::new(400.0, 1000.0))).with_source(
        Arc::new(StubQuote {
            name: "sina",
            signal: Signal::ShanghaiGold,
            value,
        }),
    )
}

fn monitor(snapshot: Arc<StubSnapshot>, clock: Arc<ManualClock>) -> MarketMonitor {
    MarketMonitor::builder(snapshot)
        .cache_ttl(Duration::from_secs(60))
        .clock(clock)
        .timeout(Duration::from_secs(2))
        .build()
}

// ============================================================================
// Classification Through the Cycle
// ============================================================================

#[tokio::test]
async fn test_breakout_cycle_is_critical() {
    let snapshot = StubSnapshot::new(7.10, 7.40);
    let monitor = monitor(snapshot, Arc::new(ManualClock::default()));

    let report = monitor.report(&ManualOverrides::default()).await.unwrap();
    assert!((report.metrics.spread_pips - 3000.0).abs() < 1e-6);
    assert_eq!(report.assessment.level, RiskLevel::Critical);
    assert!(report.checklist.trend_confirmed);
}

#[tokio::test]
async fn test_funding_override_outranks_breakout() {
    let snapshot = StubSnapshot::new(7.10, 7.40);
    let monitor = monitor(snapshot, Arc::new(ManualClock::default()));

    let overrides = ManualOverrides {
        funding_rate: Some(15.0),
        ..ManualOverrides::default()
    };
    let report = monitor.report(&overrides).await.unwrap();
    assert_eq!(report.assessment.level, RiskLevel::CriticalLiquidity);
    assert_eq!(report.assessment.rule, RiskRule::FundingRateSqueeze);
    assert_eq!(report.sources.funding_rate.as_deref(), Some("manual"));
}

#[tokio::test]
async fn test_gold_premium_warning_via_chain() {
    let snapshot = StubSnapshot::new(7.20, 7.22);
    let monitor = MarketMonitor::builder(snapshot).gold_chain(gold_chain(650.0)).build();

    let report = monitor.report(&ManualOverrides::default()).await.unwrap();
    let expected = (650.0 / 7.20) * 31.1035 - 2000.0;
    assert!((report.metrics.gold_premium_usd - expected).abs() < 1e-6);
    assert_eq!(report.assessment.level, RiskLevel::Warning);
    assert_eq!(report.sources.shanghai_gold.as_deref(), Some("sina"));
    assert_eq!(report.unavailable, vec![Signal::UsdtCny, Signal::FundingRate]);
}

#[tokio::test]
async fn test_manual_gold_overrides_fetched() {
    let snapshot = StubSnapshot::new(7.20, 7.21);
    let monitor = MarketMonitor::builder(snapshot).gold_chain(gold_chain(650.0)).build();

    // Manual value at parity with international gold gives no premium
    let parity = 2000.0 / 31.1035 * 7.20;
    let overrides = ManualOverrides {
        shanghai_gold: Some(parity),
        ..ManualOverrides::default()
    };
    let report = monitor.report(&overrides).await.unwrap();
    assert!(report.metrics.gold_premium_usd.abs() < 1e-6);
    assert_eq!(report.sources.shanghai_gold.as_deref(), Some("manual"));
    assert_eq!(report.assessment.level, RiskLevel::Normal);
}

// ============================================================================
// Caching
// ============================================================================

#[tokio::test]
async fn test_reports_within_ttl_share_one_fetch() {
    let snapshot = StubSnapshot::new(7.20, 7.21);
    let clock = Arc::new(ManualClock::default());
    let monitor = monitor(snapshot.clone(), clock.clone());

    let first = monitor.report(&ManualOverrides::default()).await.unwrap();
    clock.advance(chrono::Duration::seconds(30));
    let second = monitor.report(&ManualOverrides::default()).await.unwrap();

    assert_eq!(first.fetched_at, second.fetched_at);
    assert_eq!(snapshot.call_count(), 1);

    clock.advance(chrono::Duration::seconds(31));
    let third = monitor.report(&ManualOverrides::default()).await.unwrap();
    assert!(third.fetched_at > first.fetched_at);
    assert_eq!(snapshot.call_count(), 2);
}

#[tokio::test]
async fn test_refresh_always_fetches() {
    let snapshot = StubSnapshot::new(7.20, 7.21);
    let monitor = monitor(snapshot.clone(), Arc::new(ManualClock::default()));

    monitor.report(&ManualOverrides::default()).await.unwrap();
    monitor.refresh(&ManualOverrides::default()).await.unwrap();
    monitor.refresh(&ManualOverrides::default()).await.unwrap();

    assert_eq!(snapshot.call_count(), 3);
}

#[tokio::test]
async fn test_cached_success_survives_source_outage() {
    let snapshot = StubSnapshot::new(7.20, 7.21);
    let clock = Arc::new(ManualClock::default());
    let monitor = monitor(snapshot.clone(), clock.clone());

    monitor.report(&ManualOverrides::default()).await.unwrap();
    snapshot.set_failing(true);

    clock.advance(chrono::Duration::seconds(59));
    assert!(monitor.report(&ManualOverrides::default()).await.is_ok());

    clock.advance(chrono::Duration::seconds(2));
    let failure = monitor.report(&ManualOverrides::default()).await.unwrap_err();
    assert!(failure.unavailable.contains(&Signal::Hkd));
    assert!(failure.unavailable.contains(&Signal::InternationalGold));
    assert!(failure.unavailable.contains(&Signal::FundingRate));
    assert!(failure.reason.contains("incomplete"));
}

#[tokio::test]
async fn test_acquisition_failure_lists_missing_signals() {
    let snapshot = StubSnapshot::new(7.20, 7.21);
    snapshot.set_failing(true);
    let monitor = MarketMonitor::builder(snapshot).gold_chain(gold_chain(600.0)).build();

    let failure = monitor.acquire().await.unwrap_err();
    assert_eq!(
        failure.unavailable,
        vec![
            Signal::Hkd,
            Signal::InternationalGold,
            Signal::UsdtCny,
            Signal::FundingRate
        ]
    );
}

// ============================================================================
// Concurrency
// ============================================================================

struct SlowSnapshot;

#[async_trait]
impl SnapshotSource for SlowSnapshot {
    fn name(&self) -> &'static str {
        "slow"
    }

    async fn fetch_snapshot(&self) -> Result<MarketSnapshot, SnapshotError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(SnapshotError::Incomplete { missing: Vec::new() })
    }
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_timeout_is_acquisition_failure() {
    let monitor = MarketMonitor::builder(Arc::new(SlowSnapshot))
        .timeout(Duration::from_secs(5))
        .build();

    let failure = monitor.acquire().await.unwrap_err();
    assert!(failure.reason.contains("timed out"));
    assert_eq!(&failure.unavailable[..4], &Signal::BATCH[..]);
}

/// Snapshot source that takes a while to answer
struct DelayedSnapshot {
    calls: AtomicU32,
}

#[async_trait]
impl SnapshotSource for DelayedSnapshot {
    fn name(&self) -> &'static str {
        "delayed"
    }

    async fn fetch_snapshot(&self) -> Result<MarketSnapshot, SnapshotError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        tokio::time::sleep(Duration::from_millis(500)).await;
        Ok(MarketSnapshot {
            onshore_rmb: 7.20,
            offshore_rmb: 7.21,
            hkd: 7.83,
            international_gold: 2000.0,
            source: "delayed".into(),
            fetched_at: Utc::now(),
        })
    }
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_reports_share_one_acquisition() {
    let snapshot = Arc::new(DelayedSnapshot {
        calls: AtomicU32::new(0),
    });
    let monitor = MarketMonitor::builder(snapshot.clone())
        .timeout(Duration::from_secs(2))
        .build();
    let overrides = ManualOverrides::default();

    let (a, b, c) = tokio::join!(
        monitor.report(&overrides),
        monitor.report(&overrides),
        monitor.report(&overrides),
    );
    let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());

    assert_eq!(snapshot.calls.load(Ordering::Relaxed), 1);
    assert_eq!(a.fetched_at, b.fetched_at);
    assert_eq!(b.fetched_at, c.fetched_at);
}
