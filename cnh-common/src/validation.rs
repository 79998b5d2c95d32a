//! Configuration validation for the CNH monitor.
//!
//! Checks that configured values are present and within valid ranges
//! before the service starts polling sources.

use thiserror::Error;

use crate::config::{Config, MonitorConfig, ObservabilityConfig, PlausibleRange, RiskThresholdsConfig};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid port {port}: must be between 1 and 65535")]
    InvalidPort { port: u16, field: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

impl Config {
    /// Validate the entire configuration.
    pub fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = self.monitor.validate() {
            errors.push(e);
        }

        if let Err(e) = self.observability.validate() {
            errors.push(e);
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ValidationError::Multiple(errors)),
        }
    }
}

impl Validate for MonitorConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort {
                port: self.port,
                field: "monitor.port".into(),
            });
        }

        if self.host.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "monitor.host".into(),
            });
        }

        if self.cache_ttl_secs == 0 {
            return Err(ValidationError::InvalidValue {
                field: "monitor.cache_ttl_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if self.sources.binance_p2p.rows == 0 {
            return Err(ValidationError::InvalidValue {
                field: "monitor.sources.binance_p2p.rows".into(),
                reason: "must request at least one advertisement".into(),
            });
        }

        self.thresholds.validate()
    }
}

impl Validate for RiskThresholdsConfig {
    fn validate(&self) -> ValidationResult<()> {
        check_range(&self.shanghai_gold_range, "monitor.thresholds.shanghai_gold_range")?;
        check_range(&self.usdt_range, "monitor.thresholds.usdt_range")?;

        if self.high_spread_pips > self.critical_spread_pips {
            return Err(ValidationError::InvalidValue {
                field: "monitor.thresholds.high_spread_pips".into(),
                reason: format!(
                    "warning spread {} exceeds critical spread {}",
                    self.high_spread_pips, self.critical_spread_pips
                ),
            });
        }

        Ok(())
    }
}

fn check_range(range: &PlausibleRange, field: &str) -> ValidationResult<()> {
    if !(range.min.is_finite() && range.max.is_finite()) || range.min >= range.max {
        return Err(ValidationError::InvalidValue {
            field: field.into(),
            reason: format!("min {} must be below max {}", range.min, range.max),
        });
    }
    Ok(())
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_level".into(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            });
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.log_format.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_format".into(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            });
        }

        Ok(())
    }
}
