//! Error types for the CNH monitor.

use thiserror::Error;

/// Result type alias using the monitor error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified service-level error.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid input or request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Required market data could not be acquired
    #[error("Data unavailable: {0}")]
    Unavailable(String),
}

impl Error {
    /// Check if this error means data was unavailable rather than rejected.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidInput(_) => 400,
            Self::Unavailable(_) => 503,
        }
    }
}
