//! Monitor configuration
//!
//! Loaded from an optional file (path in `MONITOR_CONFIG`) layered under
//! environment variables prefixed with `MONITOR_`.

use crate::collector::CollectorConfig;
use crate::error::ConfigError;
use crate::models::metric_names;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable naming an optional configuration file
pub const CONFIG_PATH_ENV: &str = "MONITOR_CONFIG";

/// Monitor configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Sampling cadence in seconds
    #[serde(default = "default_collection_interval")]
    pub collection_interval_seconds: f64,

    /// Window retention in seconds
    #[serde(default = "default_window_duration")]
    pub window_duration_seconds: f64,

    /// z-score cutoff
    #[serde(default = "default_anomaly_threshold")]
    pub anomaly_threshold: f64,

    /// Bounded channel capacity between collection and processing
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Consecutive sampler failures before the collector stops
    #[serde(default = "default_fatal_after")]
    pub fatal_after: u32,

    /// Processing loop poll timeout in seconds
    #[serde(default = "default_housekeeping_interval")]
    pub housekeeping_interval_seconds: f64,

    /// Number of recent anomalies kept for the dashboard
    #[serde(default = "default_recent_anomalies_capacity")]
    pub recent_anomalies_capacity: usize,

    /// Snapshot fields fed to the detector, in order
    #[serde(default = "default_detection_features")]
    pub detection_features: Vec<String>,

    /// Fit an unfitted detector once the window holds this many samples
    #[serde(default)]
    pub baseline_warmup_samples: Option<usize>,

    /// Directory of the JSON-lines sink
    #[serde(default = "default_sink_dir")]
    pub sink_dir: PathBuf,

    /// HTTP port for health, metrics and dashboard endpoints
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Host name attached to log events
    #[serde(default = "default_host_name")]
    pub host_name: String,
}

fn default_collection_interval() -> f64 {
    60.0
}

fn default_window_duration() -> f64 {
    3600.0
}

fn default_anomaly_threshold() -> f64 {
    2.0
}

fn default_channel_capacity() -> usize {
    100
}

fn default_fatal_after() -> u32 {
    5
}

fn default_housekeeping_interval() -> f64 {
    1.0
}

fn default_recent_anomalies_capacity() -> usize {
    100
}

fn default_detection_features() -> Vec<String> {
    vec![
        metric_names::CPU_PERCENT.to_string(),
        metric_names::MEMORY_PERCENT.to_string(),
        metric_names::DISK_PERCENT.to_string(),
    ]
}

fn default_sink_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_api_port() -> u16 {
    8080
}

fn default_host_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string())
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            collection_interval_seconds: default_collection_interval(),
            window_duration_seconds: default_window_duration(),
            anomaly_threshold: default_anomaly_threshold(),
            channel_capacity: default_channel_capacity(),
            fatal_after: default_fatal_after(),
            housekeeping_interval_seconds: default_housekeeping_interval(),
            recent_anomalies_capacity: default_recent_anomalies_capacity(),
            detection_features: default_detection_features(),
            baseline_warmup_samples: None,
            sink_dir: default_sink_dir(),
            api_port: default_api_port(),
            host_name: default_host_name(),
        }
    }
}

impl MonitorConfig {
    /// Load configuration from the optional file and the environment
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();

        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            builder = builder.add_source(config::File::with_name(&path).required(false));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix("MONITOR")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("detection_features"),
            )
            .build()?;

        let config: MonitorConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive_seconds("collection_interval_seconds", self.collection_interval_seconds)?;
        positive_seconds("window_duration_seconds", self.window_duration_seconds)?;
        positive_seconds(
            "housekeeping_interval_seconds",
            self.housekeeping_interval_seconds,
        )?;

        if !self.anomaly_threshold.is_finite() || self.anomaly_threshold <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "anomaly_threshold must be a positive number, got {}",
                self.anomaly_threshold
            )));
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::Invalid("channel_capacity must be at least 1".into()));
        }
        if self.recent_anomalies_capacity == 0 {
            return Err(ConfigError::Invalid(
                "recent_anomalies_capacity must be at least 1".into(),
            ));
        }
        if self.fatal_after == 0 {
            return Err(ConfigError::Invalid("fatal_after must be at least 1".into()));
        }
        if self.detection_features.is_empty() {
            return Err(ConfigError::Invalid(
                "detection_features must name at least one feature".into(),
            ));
        }
        if self.baseline_warmup_samples == Some(0) {
            return Err(ConfigError::Invalid(
                "baseline_warmup_samples must be at least 1 when set".into(),
            ));
        }

        Ok(())
    }

    /// Runtime settings for the collector service
    pub fn collector_config(&self) -> Result<CollectorConfig, ConfigError> {
        Ok(CollectorConfig {
            interval: positive_seconds(
                "collection_interval_seconds",
                self.collection_interval_seconds,
            )?,
            window_duration: positive_seconds(
                "window_duration_seconds",
                self.window_duration_seconds,
            )?,
            channel_capacity: self.channel_capacity,
            fatal_after: self.fatal_after,
            housekeeping_interval: positive_seconds(
                "housekeeping_interval_seconds",
                self.housekeeping_interval_seconds,
            )?,
            recent_anomalies_capacity: self.recent_anomalies_capacity,
            baseline_warmup_samples: self.baseline_warmup_samples,
        })
    }
}

/// Convert a seconds value, rejecting zero, negatives, NaN and values too large for `Duration`
fn positive_seconds(name: &str, value: f64) -> Result<Duration, ConfigError> {
    match Duration::try_from_secs_f64(value) {
        Ok(duration) if !duration.is_zero() => Ok(duration),
        _ => Err(ConfigError::Invalid(format!(
            "{} must be a positive number of seconds, got {}",
            name, value
        ))),
    }
}
