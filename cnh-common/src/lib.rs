//! CNH Common - Shared configuration, errors, and logging for the CNH monitor.
//!
//! This crate provides:
//! - Configuration types and loading
//! - Configuration validation
//! - Error types and handling utilities
//! - Logging setup

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod validation;

pub use config::{
    BinanceP2pSourceConfig, Config, ConfigOrigin, MonitorConfig, ObservabilityConfig, PlausibleRange,
    RiskThresholdsConfig, SgeSourceConfig, SinaSourceConfig, SourcesConfig, TencentSourceConfig,
    YahooSourceConfig,
};
pub use error::{Error, Result};
pub use validation::{Validate, ValidationError, ValidationResult};
