//! Risk classification.
//!
//! A fixed priority chain of threshold rules maps derived metrics (and an
//! optional funding rate) to one of four ordered levels. The first rule that
//! fires decides the level, so a liquidity squeeze always outranks a
//! confirmed breakout.

use cnh_common::RiskThresholdsConfig;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::data::Signal;
use crate::metrics::DerivedMetrics;

// ============================================================================
// Risk Level
// ============================================================================

/// Ordered severity, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// Indicators stable
    Normal,
    /// Capital-flight signals present
    Warning,
    /// Depreciation trend confirmed
    Critical,
    /// Offshore liquidity squeeze in progress
    CriticalLiquidity,
}

impl RiskLevel {
    /// Fixed advisory text for the level.
    pub fn advisory(&self) -> &'static str {
        match self {
            Self::Normal => "Indicators stable. Continue observation.",
            Self::Warning => "Capital-flight signals detected. Monitor the 7.35 level closely.",
            Self::Critical => "Depreciation trend confirmed. Begin staged asset reallocation.",
            Self::CriticalLiquidity => {
                "Liquidity squeeze detected, central-bank intervention likely. \
                 Halt new short exposure and hold cash."
            }
        }
    }

    /// Display colour tag consumed by the presentation layer.
    pub fn color(&self) -> &'static str {
        match self {
            Self::Normal => "green",
            Self::Warning => "orange",
            Self::Critical => "red",
            Self::CriticalLiquidity => "purple",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Warning => write!(f, "warning"),
            Self::Critical => write!(f, "critical"),
            Self::CriticalLiquidity => write!(f, "critical_liquidity"),
        }
    }
}

/// The rule that decided a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskRule {
    FundingRateSqueeze,
    BreakoutAndSpreadCritical,
    HighAlert,
    Stable,
}

impl RiskRule {
    pub fn level(&self) -> RiskLevel {
        match self {
            Self::FundingRateSqueeze => RiskLevel::CriticalLiquidity,
            Self::BreakoutAndSpreadCritical => RiskLevel::Critical,
            Self::HighAlert => RiskLevel::Warning,
            Self::Stable => RiskLevel::Normal,
        }
    }
}

// ============================================================================
// Thresholds
// ============================================================================

/// Classifier and checklist thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskThresholds {
    /// Funding rate (%) above which liquidity is squeezed
    pub funding_squeeze_pct: f64,
    /// Offshore rate marking a breakout
    pub breakout_rate: f64,
    pub critical_spread_pips: f64,
    pub high_spread_pips: f64,
    pub gold_premium_usd: f64,
    pub usdt_premium_pct: f64,
    /// Offshore level for the checklist breakout item
    pub checklist_rate: f64,
    /// HKD at or above this is pressing the weak side of the peg
    pub hkd_peg_limit: f64,
}

impl RiskThresholds {
    pub fn from_config(config: &RiskThresholdsConfig) -> Self {
        Self {
            funding_squeeze_pct: config.funding_squeeze_pct,
            breakout_rate: config.breakout_rate,
            critical_spread_pips: config.critical_spread_pips,
            high_spread_pips: config.high_spread_pips,
            gold_premium_usd: config.gold_premium_usd,
            usdt_premium_pct: config.usdt_premium_pct,
            checklist_rate: config.checklist_rate,
            hkd_peg_limit: config.hkd_peg_limit,
        }
    }
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self::from_config(&RiskThresholdsConfig::default())
    }
}

// ============================================================================
// Assessment
// ============================================================================

/// Classification result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    pub rule: RiskRule,
    pub advisory: String,
    pub color: String,
    /// Signals whose absence left a rule unable to fire
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub insufficient_data: Vec<Signal>,
}

/// Discrete yes/no items an operator watches for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionChecklist {
    /// Offshore rate above the checklist level
    pub offshore_breakout: bool,
    /// Spread above the high-alert level
    pub spread_widening: bool,
    pub gold_premium_abnormal: bool,
    pub hkd_peg_pressure: bool,
    /// Breakout and widening spread together
    pub trend_confirmed: bool,
}

// ============================================================================
// Classifier
// ============================================================================

/// Evaluates the risk rules in priority order.
#[derive(Debug, Clone, Default)]
pub struct RiskClassifier {
    thresholds: RiskThresholds,
}

impl RiskClassifier {
    pub fn new(thresholds: RiskThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &RiskThresholds {
        &self.thresholds
    }

    /// Classify metrics and an optional funding rate.
    pub fn classify(&self, metrics: &DerivedMetrics, funding_rate: Option<f64>) -> RiskAssessment {
        let rule = self.evaluate(metrics, funding_rate);
        let level = rule.level();

        let mut insufficient_data = Vec::new();
        if funding_rate.is_none() {
            insufficient_data.push(Signal::FundingRate);
        }
        // Absent premiums count as zero, which can only hide a warning
        if level < RiskLevel::Warning {
            insufficient_data.extend(metrics.unavailable_signals());
        }

        RiskAssessment {
            level,
            rule,
            advisory: level.advisory().to_string(),
            color: level.color().to_string(),
            insufficient_data,
        }
    }

    fn evaluate(&self, metrics: &DerivedMetrics, funding_rate: Option<f64>) -> RiskRule {
        let t = &self.thresholds;

        if funding_rate.is_some_and(|rate| rate > t.funding_squeeze_pct) {
            return RiskRule::FundingRateSqueeze;
        }

        if metrics.offshore_rmb > t.breakout_rate && metrics.spread_pips > t.critical_spread_pips {
            return RiskRule::BreakoutAndSpreadCritical;
        }

        if metrics.spread_pips > t.high_spread_pips
            || metrics.gold_premium_usd > t.gold_premium_usd
            || metrics.usdt_premium_pct > t.usdt_premium_pct
        {
            return RiskRule::HighAlert;
        }

        RiskRule::Stable
    }

    /// Evaluate the operator checklist.
    pub fn checklist(&self, metrics: &DerivedMetrics) -> ActionChecklist {
        let t = &self.thresholds;
        let offshore_breakout = metrics.offshore_rmb > t.checklist_rate;
        let spread_widening = metrics.spread_pips > t.high_spread_pips;

        ActionChecklist {
            offshore_breakout,
            spread_widening,
            gold_premium_abnormal: metrics.gold_premium_usd > t.gold_premium_usd,
            hkd_peg_pressure: metrics.hkd >= t.hkd_peg_limit,
            trend_confirmed: offshore_breakout && spread_widening,
        }
    }
}
