//! Host monitor - periodic host resource sampling with anomaly detection
//!
//! Samples CPU, memory, disk and network usage on a fixed interval, scores
//! each snapshot against a z-score baseline and appends snapshots and
//! anomalies to day-partitioned JSON-lines files.

use anyhow::{Context, Result};
use monitor_agent::api;
use monitor_lib::{
    anomaly::{FeatureExtractor, ZScoreDetector},
    collector::{CollectorService, SystemSampler},
    config::MonitorConfig,
    health::HealthRegistry,
    observability::StructuredLogger,
    sink::JsonLinesSink,
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const MONITOR_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let config = MonitorConfig::load().context("Failed to load configuration")?;
    info!(
        host = %config.host_name,
        interval_secs = config.collection_interval_seconds,
        sink_dir = %config.sink_dir.display(),
        "Monitor configured"
    );

    let logger = StructuredLogger::new(&config.host_name);
    logger.log_startup(MONITOR_VERSION);

    let health_registry = HealthRegistry::new();
    health_registry.register_pipeline().await;

    let extractor = FeatureExtractor::new(config.detection_features.iter().cloned());
    let detector = ZScoreDetector::new(config.anomaly_threshold)
        .with_feature_names(config.detection_features.iter().cloned());
    let sink = JsonLinesSink::new(&config.sink_dir).with_context(|| {
        format!("Failed to open sink directory {}", config.sink_dir.display())
    })?;

    let service = Arc::new(
        CollectorService::builder()
            .sampler(Arc::new(SystemSampler::new()))
            .detector(Arc::new(detector))
            .extractor(extractor)
            .sink(Arc::new(sink))
            .config(config.collector_config()?)
            .health(health_registry)
            .logger(logger.clone())
            .build()?,
    );

    service.start().await;

    let app_state = Arc::new(api::AppState::new(service.clone()));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    let mut status_rx = service.subscribe_status();
    let reason = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            "SIGINT received"
        }
        _ = status_rx.wait_for(|status| status.is_failed()) => {
            error!("Collector failed, shutting down");
            "collector failed"
        }
    };

    logger.log_shutdown(reason);
    service.stop().await;
    api_handle.abort();

    if let monitor_lib::collector::CollectorStatus::Failed { error } = service.status() {
        anyhow::bail!(error);
    }
    Ok(())
}
