//! Derived indicators computed from a market snapshot.
//!
//! All functions here are pure. Premiums that depend on an absent auxiliary
//! signal are numerically zero so threshold comparisons stay well defined,
//! and are reported as unavailable through the `Option` accessors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data::{MarketSnapshot, Signal};

/// Grams per troy ounce.
pub const GRAMS_PER_TROY_OUNCE: f64 = 31.1035;

/// Pips per unit of quote currency.
pub const PIPS_PER_UNIT: f64 = 10_000.0;

/// Offshore minus onshore, in pips. Positive means offshore is weaker.
pub fn spread_pips(onshore: f64, offshore: f64) -> f64 {
    (offshore - onshore) * PIPS_PER_UNIT
}

/// Shanghai gold converted to USD/oz through the onshore rate, minus the
/// international price.
pub fn gold_premium_usd(shanghai_gold_cny_per_gram: f64, onshore: f64, international_gold: f64) -> f64 {
    (shanghai_gold_cny_per_gram / onshore) * GRAMS_PER_TROY_OUNCE - international_gold
}

/// Peer USDT price over the offshore rate, in percent.
pub fn usdt_premium_pct(usdt_cny: f64, offshore: f64) -> f64 {
    (usdt_cny - offshore) / offshore * 100.0
}

/// International gold expressed in CNY per gram at the onshore rate.
pub fn international_gold_cny_per_gram(international_gold: f64, onshore: f64) -> f64 {
    international_gold / GRAMS_PER_TROY_OUNCE * onshore
}

/// Indicators derived from one acquisition cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetrics {
    pub onshore_rmb: f64,
    pub offshore_rmb: f64,
    pub hkd: f64,
    pub international_gold_usd: f64,
    pub international_gold_cny_per_gram: f64,
    pub shanghai_gold: Option<f64>,
    pub usdt_cny: Option<f64>,
    pub spread_pips: f64,
    /// Zero when Shanghai gold is unavailable
    pub gold_premium_usd: f64,
    /// Zero when the USDT price is unavailable
    pub usdt_premium_pct: f64,
    pub computed_at: DateTime<Utc>,
}

impl DerivedMetrics {
    /// Gold premium, or `None` when Shanghai gold was unavailable.
    pub fn gold_premium(&self) -> Option<f64> {
        self.shanghai_gold.map(|_| self.gold_premium_usd)
    }

    /// USDT premium, or `None` when the peer price was unavailable.
    pub fn usdt_premium(&self) -> Option<f64> {
        self.usdt_cny.map(|_| self.usdt_premium_pct)
    }

    /// Auxiliary signals whose metrics are placeholders.
    pub fn unavailable_signals(&self) -> Vec<Signal> {
        let mut missing = Vec::new();
        if self.shanghai_gold.is_none() {
            missing.push(Signal::ShanghaiGold);
        }
        if self.usdt_cny.is_none() {
            missing.push(Signal::UsdtCny);
        }
        missing
    }
}

/// Computes [`DerivedMetrics`].
pub struct MetricEngine;

impl MetricEngine {
    /// Compute metrics; `None` when there is no usable snapshot.
    pub fn compute(
        snapshot: Option<&MarketSnapshot>,
        shanghai_gold: Option<f64>,
        usdt_cny: Option<f64>,
    ) -> Option<DerivedMetrics> {
        snapshot.map(|s| Self::compute_at(s, shanghai_gold, usdt_cny, Utc::now()))
    }

    /// Compute metrics with an explicit timestamp.
    pub fn compute_at(
        snapshot: &MarketSnapshot,
        shanghai_gold: Option<f64>,
        usdt_cny: Option<f64>,
        computed_at: DateTime<Utc>,
    ) -> DerivedMetrics {
        let onshore = snapshot.onshore_rmb;
        let offshore = snapshot.offshore_rmb;
        let intl_gold = snapshot.international_gold;

        DerivedMetrics {
            onshore_rmb: onshore,
            offshore_rmb: offshore,
            hkd: snapshot.hkd,
            international_gold_usd: intl_gold,
            international_gold_cny_per_gram: international_gold_cny_per_gram(intl_gold, onshore),
            shanghai_gold,
            usdt_cny,
            spread_pips: spread_pips(onshore, offshore),
            gold_premium_usd: shanghai_gold
                .map(|g| gold_premium_usd(g, onshore, intl_gold))
                .unwrap_or(0.0),
            usdt_premium_pct: usdt_cny
                .map(|u| usdt_premium_pct(u, offshore))
                .unwrap_or(0.0),
            computed_at,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(onshore: f64, offshore: f64, gold: f64) -> MarketSnapshot {
        MarketSnapshot {
            onshore_rmb: onshore,
            offshore_rmb: offshore,
            hkd: 7.82,
            international_gold: gold,
            source: "test".into(),
            fetched_at: Utc::now(),
        }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_spread_sign() {
        assert!(close(spread_pips(7.10, 7.40), 3000.0));
        assert!(close(spread_pips(7.25, 7.20), -500.0));
        assert_eq!(spread_pips(7.2, 7.2), 0.0);
    }

    #[test]
    fn test_no_snapshot_no_metrics() {
        assert!(MetricEngine::compute(None, Some(600.0), Some(7.3)).is_none());
    }

    #[test]
    fn test_gold_premium_formula() {
        let m = MetricEngine::compute(Some(&snapshot(7.20, 7.22, 2000.0)), Some(650.0), None).unwrap();
        let expected = (650.0 / 7.20) * 31.1035 - 2000.0;
        assert!(close(m.gold_premium_usd, expected));
        assert!(m.gold_premium_usd > 800.0 && m.gold_premium_usd < 810.0);
        assert_eq!(m.gold_premium(), Some(m.gold_premium_usd));
    }

    #[test]
    fn test_absent_auxiliaries_are_zero_and_unavailable() {
        let m = MetricEngine::compute(Some(&snapshot(7.2, 7.3, 2300.0)), None, None).unwrap();
        assert_eq!(m.gold_premium_usd, 0.0);
        assert_eq!(m.usdt_premium_pct, 0.0);
        assert_eq!(m.gold_premium(), None);
        assert_eq!(m.usdt_premium(), None);
        assert_eq!(m.unavailable_signals(), vec![Signal::ShanghaiGold, Signal::UsdtCny]);
    }

    #[test]
    fn test_gold_premium_monotonic() {
        let snap = snapshot(7.15, 7.18, 2350.0);
        let premiums: Vec<f64> = [450.0, 520.0, 560.0, 600.0, 740.0]
            .iter()
            .map(|g| MetricEngine::compute_at(&snap, Some(*g), None, Utc::now()).gold_premium_usd)
            .collect();
        assert!(premiums.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn test_usdt_premium_sign() {
        let snap = snapshot(7.20, 7.25, 2300.0);
        let above = MetricEngine::compute_at(&snap, None, Some(7.40), Utc::now());
        let below = MetricEngine::compute_at(&snap, None, Some(7.10), Utc::now());
        assert!(above.usdt_premium_pct > 0.0);
        assert!(below.usdt_premium_pct < 0.0);
        assert!(close(above.usdt_premium_pct, (7.40 - 7.25) / 7.25 * 100.0));
    }

    #[test]
    fn test_international_gold_per_gram() {
        let m = MetricEngine::compute_at(&snapshot(7.0, 7.0, 3110.35), None, None, Utc::now());
        assert!(close(m.international_gold_cny_per_gram, 700.0));
    }
}
