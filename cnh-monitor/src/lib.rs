//! CNH Monitor Library
//!
//! Watches a handful of public market signals for signs of offshore RMB
//! depreciation pressure and classifies the combined state into a risk level.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                     cnh-monitor (Rust Service)                      │
//! │                               :4440                                 │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────┐      │
//! │  │  Acquisition    │  │  Metric         │  │  Risk           │      │
//! │  │  (cached)       │─▶│  Engine         │─▶│  Classifier     │      │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────┘      │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Signals
//!
//! - **Batch snapshot**: onshore CNY, offshore CNH, HKD, COMEX gold
//! - **Shanghai gold**: Sina, then Tencent, then the SGE quote page
//! - **USDT/CNY**: Binance P2P
//! - **Funding rate**: manual input only
//!
//! # Risk Levels
//!
//! First matching rule wins:
//! 1. Funding rate above 10% → critical liquidity
//! 2. Offshore above 7.35 and spread above 1000 pips → critical
//! 3. Spread above 500 pips, gold premium above $30, or USDT premium above 2% → warning
//! 4. Otherwise normal

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod data;
pub mod metrics;
pub mod monitor;
pub mod risk;
pub mod routes;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use cnh_common::config::Config;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

pub use data::{MarketSnapshot, Quote, Signal};
pub use metrics::{DerivedMetrics, MetricEngine};
pub use monitor::{AcquisitionFailure, ManualOverrides, MarketMonitor, MonitorReport};
pub use risk::{ActionChecklist, RiskAssessment, RiskClassifier, RiskLevel, RiskThresholds};

/// Monitor service state
pub struct MonitorState {
    /// Configuration
    pub config: Config,
    /// Acquisition, metrics, and classification
    pub monitor: Arc<MarketMonitor>,
}

impl MonitorState {
    /// Create state with production sources
    pub fn new(config: Config) -> Self {
        let monitor = Arc::new(MarketMonitor::from_config(&config.monitor));
        Self { config, monitor }
    }

    /// Create state around an existing monitor
    pub fn with_monitor(config: Config, monitor: MarketMonitor) -> Self {
        Self {
            config,
            monitor: Arc::new(monitor),
        }
    }
}

/// Main monitor service
pub struct MonitorService {
    state: Arc<MonitorState>,
}

impl MonitorService {
    /// Create a new monitor service
    pub fn new(config: Config) -> Self {
        Self::from_state(MonitorState::new(config))
    }

    pub fn from_state(state: MonitorState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    /// Build HTTP routes
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .route("/health", get(routes::health))
            .route("/api/v1/report", get(routes::get_report))
            .route("/api/v1/refresh", post(routes::refresh))
            .route("/api/v1/sources", get(routes::get_sources))
            .layer(cors)
            .with_state(self.state.clone())
    }

    /// Start the monitor service
    pub async fn start(self) -> Result<()> {
        let monitor_config = &self.state.config.monitor;
        let addr: SocketAddr = format!("{}:{}", monitor_config.host, monitor_config.port).parse()?;

        let app = self.router();

        // Warm the cache so the first request is served immediately
        let warm_state = self.state.clone();
        tokio::spawn(async move {
            if let Err(e) = warm_state.monitor.bundle().await {
                tracing::warn!(error = %e, "Initial acquisition failed");
            }
        });

        tracing::info!(address = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}
