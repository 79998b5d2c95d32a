//! CNH Monitor - offshore RMB depreciation risk monitor.
//!
//! Serves the current risk report over HTTP for an external dashboard.

use anyhow::{Context, Result};
use cnh_common::config::{Config, ConfigOrigin};
use cnh_common::logging::init_from_config;
use cnh_monitor::MonitorService;

#[tokio::main]
async fn main() -> Result<()> {
    let startup_start = std::time::Instant::now();

    // Load configuration
    let (config, origin) = Config::load_with_env()?;

    // Initialize logging
    init_from_config(&config.observability);

    match &origin {
        ConfigOrigin::File(path) => tracing::info!(path = %path.display(), "Loaded config file"),
        ConfigOrigin::Defaults(path) => {
            tracing::info!(path = %path.display(), "Config file not found, using defaults")
        }
    }

    config.validate().context("Invalid configuration")?;

    tracing::info!("CNH Monitor v{}", env!("CARGO_PKG_VERSION"));

    let service = MonitorService::new(config);

    let startup_duration = startup_start.elapsed();
    tracing::info!(
        duration_ms = startup_duration.as_millis() as u64,
        "Service initialized in {:?}",
        startup_duration
    );

    service.start().await
}
