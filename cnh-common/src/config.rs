//! Configuration management for the CNH monitor.
//!
//! The monitor reads a single configuration file at `~/.cnh-monitor/config.json`.
//! A missing file is not an error: every field has a default.
//!
//! # Configuration Priority
//!
//! 1. Environment variables (CNH_MONITOR_* prefix)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `CNH_MONITOR_HOST` → monitor.host
//! - `CNH_MONITOR_PORT` → monitor.port
//! - `CNH_MONITOR_CACHE_TTL_SECS` → monitor.cache_ttl_secs
//! - `CNH_MONITOR_TIMEOUT_SECS` → monitor.request_timeout_secs
//! - `CNH_MONITOR_LOG_LEVEL` → observability.log_level
//! - `CNH_MONITOR_LOG_FORMAT` → observability.log_format

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Shortest per-request timeout the monitor will use.
pub const MIN_REQUEST_TIMEOUT_SECS: u64 = 2;

/// Longest per-request timeout the monitor will use.
pub const MAX_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".cnh-monitor"),
        |dirs| dirs.home_dir().join(".cnh-monitor"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Acquisition, cache, and classification settings
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Logging settings
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Where a loaded configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOrigin {
    /// Read from this file
    File(PathBuf),
    /// No file at this path; every field took its default
    Defaults(PathBuf),
}

impl Config {
    /// Load configuration from the default path, falling back to defaults.
    ///
    /// Nothing is logged here since this usually runs before logging is
    /// initialized; callers report the returned origin instead.
    pub fn load() -> Result<(Self, ConfigOrigin)> {
        Self::load_or_default(&config_path())
    }

    /// Load configuration from `path`, or defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<(Self, ConfigOrigin)> {
        if !path.exists() {
            return Ok((Self::default(), ConfigOrigin::Defaults(path.to_path_buf())));
        }

        let config = Self::load_from(path)?;
        Ok((config, ConfigOrigin::File(path.to_path_buf())))
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides applied.
    pub fn load_with_env() -> Result<(Self, ConfigOrigin)> {
        let (mut config, origin) = Self::load()?;
        config.apply_env_overrides();
        Ok((config, origin))
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup (environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("CNH_MONITOR_HOST") {
            self.monitor.host = host;
        }
        if let Some(port) = lookup("CNH_MONITOR_PORT").and_then(|v| v.parse().ok()) {
            self.monitor.port = port;
        }
        if let Some(ttl) = lookup("CNH_MONITOR_CACHE_TTL_SECS").and_then(|v| v.parse().ok()) {
            self.monitor.cache_ttl_secs = ttl;
        }
        if let Some(timeout) = lookup("CNH_MONITOR_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.monitor.request_timeout_secs = timeout;
        }
        if let Some(level) = lookup("CNH_MONITOR_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = lookup("CNH_MONITOR_LOG_FORMAT") {
            self.observability.log_format = format;
        }
    }
}

// ============================================================================
// Monitor Configuration
// ============================================================================

/// Monitor service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// HTTP bind host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP port
    #[serde(default = "default_port")]
    pub port: u16,

    /// How long one acquisition bundle stays fresh
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    /// Timeout applied to each individual network call
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// External quote sources
    #[serde(default)]
    pub sources: SourcesConfig,

    /// Risk classification thresholds
    #[serde(default)]
    pub thresholds: RiskThresholdsConfig,
}

impl MonitorConfig {
    /// Per-request timeout, clamped into the supported 2-10 second window.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.request_timeout_secs
                .clamp(MIN_REQUEST_TIMEOUT_SECS, MAX_REQUEST_TIMEOUT_SECS),
        )
    }

    /// Cache time-to-live.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cache_ttl_secs: default_cache_ttl(),
            request_timeout_secs: default_request_timeout(),
            sources: SourcesConfig::default(),
            thresholds: RiskThresholdsConfig::default(),
        }
    }
}

// ============================================================================
// Source Configuration
// ============================================================================

/// Inclusive numeric range a fetched value must fall in to be accepted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlausibleRange {
    pub min: f64,
    pub max: f64,
}

impl PlausibleRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// True when `value` is finite and within `[min, max]`.
    pub fn contains(&self, value: f64) -> bool {
        value.is_finite() && value >= self.min && value <= self.max
    }
}

/// Endpoints and parameters of every external quote source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default)]
    pub yahoo: YahooSourceConfig,

    #[serde(default)]
    pub sina: SinaSourceConfig,

    #[serde(default)]
    pub tencent: TencentSourceConfig,

    #[serde(default)]
    pub sge: SgeSourceConfig,

    #[serde(default)]
    pub binance_p2p: BinanceP2pSourceConfig,
}

/// Yahoo Finance batch (spark) endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YahooSourceConfig {
    #[serde(default = "default_yahoo_url")]
    pub url: String,

    /// Lookback window, e.g. "1d" or "5d"
    #[serde(default = "default_yahoo_range")]
    pub range: String,

    /// Bar size, e.g. "1m" or "5m"
    #[serde(default = "default_yahoo_interval")]
    pub interval: String,
}

impl Default for YahooSourceConfig {
    fn default() -> Self {
        Self {
            url: default_yahoo_url(),
            range: default_yahoo_range(),
            interval: default_yahoo_interval(),
        }
    }
}

/// Sina Finance quote endpoint for Shanghai gold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinaSourceConfig {
    #[serde(default = "default_sina_url")]
    pub url: String,

    /// Sina rejects requests without a finance.sina.com.cn referer
    #[serde(default = "default_sina_referer")]
    pub referer: String,
}

impl Default for SinaSourceConfig {
    fn default() -> Self {
        Self {
            url: default_sina_url(),
            referer: default_sina_referer(),
        }
    }
}

/// Tencent quote endpoint for Shanghai gold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TencentSourceConfig {
    #[serde(default = "default_tencent_url")]
    pub url: String,

    /// Field index of the latest price in the tilde-delimited payload
    #[serde(default = "default_tencent_price_field")]
    pub price_field: usize,
}

impl Default for TencentSourceConfig {
    fn default() -> Self {
        Self {
            url: default_tencent_url(),
            price_field: default_tencent_price_field(),
        }
    }
}

/// Shanghai Gold Exchange HTML quote page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SgeSourceConfig {
    #[serde(default = "default_sge_url")]
    pub url: String,

    /// Instrument label to look for in the quote table
    #[serde(default = "default_sge_instrument")]
    pub instrument: String,
}

impl Default for SgeSourceConfig {
    fn default() -> Self {
        Self {
            url: default_sge_url(),
            instrument: default_sge_instrument(),
        }
    }
}

/// Binance P2P advertisement search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinanceP2pSourceConfig {
    #[serde(default = "default_p2p_url")]
    pub url: String,

    /// Advertisements requested on the first page
    #[serde(default = "default_p2p_rows")]
    pub rows: u32,
}

impl Default for BinanceP2pSourceConfig {
    fn default() -> Self {
        Self {
            url: default_p2p_url(),
            rows: default_p2p_rows(),
        }
    }
}

// ============================================================================
// Risk Thresholds
// ============================================================================

/// Thresholds used by the risk classifier and the action checklist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskThresholdsConfig {
    /// Funding-cost rate (%) above which a liquidity squeeze is declared
    #[serde(default = "default_funding_squeeze")]
    pub funding_squeeze_pct: f64,

    /// Offshore USD/CNH level that counts as a breakout
    #[serde(default = "default_breakout_rate")]
    pub breakout_rate: f64,

    /// Spread (pips) that confirms a breakout
    #[serde(default = "default_critical_spread")]
    pub critical_spread_pips: f64,

    /// Spread (pips) that raises a warning on its own
    #[serde(default = "default_high_spread")]
    pub high_spread_pips: f64,

    /// Gold premium (USD/oz) that counts as capital flight
    #[serde(default = "default_gold_premium")]
    pub gold_premium_usd: f64,

    /// USDT premium (%) that counts as capital flight
    #[serde(default = "default_usdt_premium")]
    pub usdt_premium_pct: f64,

    /// Offshore level ticked on the operator checklist
    #[serde(default = "default_checklist_rate")]
    pub checklist_rate: f64,

    /// HKD level at which the peg is considered under pressure
    #[serde(default = "default_hkd_peg_limit")]
    pub hkd_peg_limit: f64,

    /// Accepted Shanghai gold prices (CNY/gram)
    #[serde(default = "default_shanghai_gold_range")]
    pub shanghai_gold_range: PlausibleRange,

    /// Accepted USDT/CNY peer prices
    #[serde(default = "default_usdt_range")]
    pub usdt_range: PlausibleRange,
}

impl Default for RiskThresholdsConfig {
    fn default() -> Self {
        Self {
            funding_squeeze_pct: default_funding_squeeze(),
            breakout_rate: default_breakout_rate(),
            critical_spread_pips: default_critical_spread(),
            high_spread_pips: default_high_spread(),
            gold_premium_usd: default_gold_premium(),
            usdt_premium_pct: default_usdt_premium(),
            checklist_rate: default_checklist_rate(),
            hkd_peg_limit: default_hkd_peg_limit(),
            shanghai_gold_range: default_shanghai_gold_range(),
            usdt_range: default_usdt_range(),
        }
    }
}

// ============================================================================
// Observability
// ============================================================================

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets to keep at `warn`.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
        }
    }
}

// ============================================================================
// Defaults
// ============================================================================

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    4440
}
fn default_cache_ttl() -> u64 {
    60
}
fn default_request_timeout() -> u64 {
    5
}
fn default_yahoo_url() -> String {
    "https://query1.finance.yahoo.com/v8/finance/spark".into()
}
fn default_yahoo_range() -> String {
    "5d".into()
}
fn default_yahoo_interval() -> String {
    "5m".into()
}
fn default_sina_url() -> String {
    "http://hq.sinajs.cn/list=gds_Au99_99".into()
}
fn default_sina_referer() -> String {
    "https://finance.sina.com.cn/".into()
}
fn default_tencent_url() -> String {
    "https://qt.gtimg.cn/q=sgAu9999".into()
}
fn default_tencent_price_field() -> usize {
    3
}
fn default_sge_url() -> String {
    "https://www.sge.com.cn/sjzx/yshqbg".into()
}
fn default_sge_instrument() -> String {
    "Au99.99".into()
}
fn default_p2p_url() -> String {
    "https://p2p.binance.com/bapi/c2c/v2/friendly/c2c/adv/search".into()
}
fn default_p2p_rows() -> u32 {
    5
}
fn default_funding_squeeze() -> f64 {
    10.0
}
fn default_breakout_rate() -> f64 {
    7.35
}
fn default_critical_spread() -> f64 {
    1000.0
}
fn default_high_spread() -> f64 {
    500.0
}
fn default_gold_premium() -> f64 {
    30.0
}
fn default_usdt_premium() -> f64 {
    2.0
}
fn default_checklist_rate() -> f64 {
    7.30
}
fn default_hkd_peg_limit() -> f64 {
    7.84
}
fn default_shanghai_gold_range() -> PlausibleRange {
    PlausibleRange::new(400.0, 1000.0)
}
fn default_usdt_range() -> PlausibleRange {
    PlausibleRange::new(5.0, 10.0)
}
fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "pretty".into()
}
