//! Host resource monitoring library
//!
//! This crate provides the core functionality for:
//! - Periodic sampling of host CPU, memory, disk and network usage
//! - A bounded drop-oldest hand-off between collection and processing
//! - A time-bounded rolling window of snapshots
//! - Z-score anomaly detection against a fitted baseline
//! - Append-only persistence of snapshots and anomalies
//! - Health checks and observability

pub mod anomaly;
pub mod collector;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod sink;
pub mod window;

pub use anomaly::{AnomalyScorer, FeatureExtractor, RecentAnomalies, ZScoreDetector};
pub use collector::{
    CollectorBuilder, CollectorConfig, CollectorService, CollectorStats, CollectorStatus, Sampler,
    SystemSampler,
};
pub use config::MonitorConfig;
pub use dashboard::DashboardView;
pub use error::{CollectionError, ConfigError, DetectorError, FatalCollectorError, SinkError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{MonitorMetrics, StructuredLogger};
pub use sink::{JsonLinesSink, MemorySink, Sink};
pub use window::{RollingWindow, SharedWindow, WindowReader};
