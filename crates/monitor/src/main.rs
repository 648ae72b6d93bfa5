//! Vitals Monitor - vital-signs streaming and anomaly-detection daemon
//!
//! Samples every configured device on a fixed cadence, flags readings
//! outside their thresholds and serves the results over HTTP.

use anyhow::Result;
use monitor_lib::{
    health::HealthRegistry,
    observability::{MonitorMetrics, StructuredLogger},
    session::SessionEvent,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use vitals_monitor::{api, config::MonitorConfig};

const MONITOR_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Session notifications buffered before further ones are dropped
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting vitals-monitor");

    // Load configuration
    let config = MonitorConfig::load()?;
    info!(
        devices = config.devices.len(),
        cadence_secs = config.cadence_secs,
        "Monitor configured"
    );

    // One session per device, all reporting into the health registry
    let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let registry = Arc::new(config.build_registry(events_tx)?);

    let health_registry = HealthRegistry::new();
    for device_id in registry.device_ids() {
        health_registry.register(&device_id).await;
    }
    tokio::spawn(track_health(events_rx, health_registry.clone()));

    let metrics = MonitorMetrics::new();
    let logger = StructuredLogger::new(hostname());
    logger.log_startup(MONITOR_VERSION, registry.len());

    registry.connect_all()?;

    // Create shared application state
    let app_state = Arc::new(api::AppState::new(
        registry.clone(),
        health_registry.clone(),
        metrics,
    ));

    // Mark monitor as ready after initialization
    health_registry.set_ready(true).await;

    // Start health, metrics and device API server
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    // Wait for shutdown signal or API failure
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            logger.log_shutdown("SIGINT received");
        }
        result = api_handle => {
            match result {
                Ok(Ok(())) => logger.log_shutdown("API server stopped"),
                Ok(Err(e)) => error!(error = %e, "API server failed"),
                Err(e) => error!(error = %e, "API server task panicked"),
            }
        }
    }

    health_registry.set_ready(false).await;
    registry.disconnect_all();
    info!("Shutting down");

    Ok(())
}

/// Fold session notifications into per-device health until every session is gone
async fn track_health(mut events: mpsc::Receiver<SessionEvent>, health: HealthRegistry) {
    while let Some(event) = events.recv().await {
        health.apply_event(&event).await;
    }
}

fn hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "vitals-monitor".to_string())
}
