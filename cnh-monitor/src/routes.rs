//! HTTP routes for the monitor service.
//!
//! The JSON surface only hands core output to an external presentation
//! layer; it performs no formatting of its own.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use cnh_common::Error;
use serde::Serialize;
use std::sync::Arc;

use crate::data::Signal;
use crate::monitor::{AcquisitionFailure, ManualOverrides, MonitorReport, SourceListing};
use crate::MonitorState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub service: String,
}

#[derive(Debug, Serialize)]
pub struct SourcesResponse {
    pub sources: Vec<SourceListing>,
    pub cache_ttl_secs: u64,
    pub request_timeout_secs: u64,
}

/// Error body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// Route error carrying the service error and any unavailable signals.
#[derive(Debug)]
pub struct ApiError {
    error: Error,
    unavailable: Vec<Signal>,
}

impl From<AcquisitionFailure> for ApiError {
    fn from(failure: AcquisitionFailure) -> Self {
        let unavailable = failure.unavailable.clone();
        Self {
            error: failure.into(),
            unavailable,
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        Self {
            error,
            unavailable: Vec::new(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let code = if self.error.is_unavailable() {
            "DATA_UNAVAILABLE"
        } else {
            "INVALID_REQUEST"
        };

        let body = serde_json::json!({
            "success": false,
            "error": ErrorBody {
                code: code.to_string(),
                message: self.error.to_string(),
            },
            "unavailable": self.unavailable,
        });

        (status, Json(body)).into_response()
    }
}

/// Overrides from the query string, rejected as a JSON 400 when malformed or non-finite.
fn parse_overrides(
    query: Result<Query<ManualOverrides>, QueryRejection>,
) -> Result<ManualOverrides, ApiError> {
    let Query(overrides) = query.map_err(|rejection| Error::InvalidInput(rejection.body_text()))?;
    overrides.validate()?;
    Ok(overrides)
}

// ============================================================================
// Route Handlers
// ============================================================================

/// Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        service: "cnh-monitor".to_string(),
    })
}

/// Current report, served from cache while fresh
pub async fn get_report(
    State(state): State<Arc<MonitorState>>,
    query: Result<Query<ManualOverrides>, QueryRejection>,
) -> Result<Json<MonitorReport>, ApiError> {
    let overrides = parse_overrides(query)?;
    match state.monitor.report(&overrides).await {
        Ok(report) => Ok(Json(report)),
        Err(failure) => {
            tracing::warn!(error = %failure, "Report unavailable");
            Err(failure.into())
        }
    }
}

/// Drop the cache and report from a fresh fetch
pub async fn refresh(
    State(state): State<Arc<MonitorState>>,
    query: Result<Query<ManualOverrides>, QueryRejection>,
) -> Result<Json<MonitorReport>, ApiError> {
    let overrides = parse_overrides(query)?;
    tracing::info!("Manual refresh requested");
    match state.monitor.refresh(&overrides).await {
        Ok(report) => Ok(Json(report)),
        Err(failure) => {
            tracing::warn!(error = %failure, "Refresh failed");
            Err(failure.into())
        }
    }
}

/// Registered sources per signal
pub async fn get_sources(State(state): State<Arc<MonitorState>>) -> Json<SourcesResponse> {
    Json(SourcesResponse {
        sources: state.monitor.sources(),
        cache_ttl_secs: state.config.monitor.cache_ttl_secs,
        request_timeout_secs: state.monitor.timeout().as_secs(),
    })
}
