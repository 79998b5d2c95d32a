//! Time-bounded cache for acquisition bundles.
//!
//! Holds at most one bundle. A fresh bundle is returned unchanged; a stale
//! or missing one triggers a fetch whose success replaces the entry
//! atomically. Concurrent misses share a single fetch. The clock is injected
//! so expiry can be tested without sleeping.

use chrono::{DateTime, Duration, Utc};
use std::future::Future;
use std::sync::{Arc, Mutex, RwLock};
use tracing::debug;

// ============================================================================
// Clock
// ============================================================================

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|now| *now).unwrap_or_else(|_| Utc::now())
    }
}

// ============================================================================
// Snapshot Cache
// ============================================================================

/// A cached value and the time it was fetched.
#[derive(Debug)]
pub struct CachedBundle<T> {
    pub value: T,
    pub fetched_at: DateTime<Utc>,
}

/// Single-entry cache with TTL.
pub struct SnapshotCache<T> {
    entry: RwLock<Option<Arc<CachedBundle<T>>>>,
    /// Held for the duration of a refill
    refill: tokio::sync::Mutex<()>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<T> SnapshotCache<T> {
    /// Create a cache on the wall clock.
    pub fn new(ttl: std::time::Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    /// Create a cache on an injected clock.
    pub fn with_clock(ttl: std::time::Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entry: RwLock::new(None),
            refill: tokio::sync::Mutex::new(()),
            ttl: Duration::from_std(ttl).unwrap_or_else(|_| Duration::seconds(60)),
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn is_fresh(&self, bundle: &CachedBundle<T>) -> bool {
        self.clock.now() - bundle.fetched_at < self.ttl
    }

    /// The cached bundle if it is still within TTL.
    pub fn get(&self) -> Option<Arc<CachedBundle<T>>> {
        let entry = self.entry.read().ok()?;
        entry.as_ref().filter(|b| self.is_fresh(b)).cloned()
    }

    /// Return the fresh bundle, or fetch and store a new one.
    ///
    /// Only one fetch runs at a time. Callers that miss while a fetch is in
    /// flight wait for it and take its bundle instead of fetching again.
    /// A failed fetch never discards a bundle that is still within TTL. Once
    /// the TTL has passed, a failed fetch clears the entry and the error is
    /// returned.
    pub async fn get_or_fetch<F, Fut, E>(&self, fetch: F) -> Result<Arc<CachedBundle<T>>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(bundle) = self.get() {
            debug!(fetched_at = %bundle.fetched_at, "Cache hit");
            return Ok(bundle);
        }

        let _refill = self.refill.lock().await;
        if let Some(bundle) = self.get() {
            debug!(fetched_at = %bundle.fetched_at, "Cache filled while waiting");
            return Ok(bundle);
        }

        debug!("Cache miss, fetching");
        match fetch().await {
            Ok(value) => {
                let bundle = Arc::new(CachedBundle {
                    value,
                    fetched_at: self.clock.now(),
                });
                if let Ok(mut entry) = self.entry.write() {
                    *entry = Some(Arc::clone(&bundle));
                }
                Ok(bundle)
            }
            Err(e) => {
                if let Ok(mut entry) = self.entry.write() {
                    // Never discard a bundle that is still within TTL
                    if let Some(current) = entry.as_ref().filter(|b| self.is_fresh(b)) {
                        return Ok(Arc::clone(current));
                    }
                    *entry = None;
                }
                Err(e)
            }
        }
    }

    /// Drop the cached bundle regardless of age.
    pub fn invalidate(&self) {
        if let Ok(mut entry) = self.entry.write() {
            if entry.take().is_some() {
                debug!("Cache invalidated");
            }
        }
    }
}

impl<T> std::fmt::Debug for SnapshotCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotCache")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
