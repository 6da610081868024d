//! Core data models for the host monitor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Well-known snapshot field names
pub mod metric_names {
    pub const CPU_PERCENT: &str = "cpu_percent";
    pub const MEMORY_PERCENT: &str = "memory_percent";
    pub const DISK_PERCENT: &str = "disk_percent";
    pub const NETWORK_BYTES_SENT: &str = "network_bytes_sent";
    pub const NETWORK_BYTES_RECV: &str = "network_bytes_recv";
    pub const NETWORK_PACKETS_SENT: &str = "network_packets_sent";
    pub const NETWORK_PACKETS_RECV: &str = "network_packets_recv";
    pub const SWAP_PERCENT: &str = "swap_percent";
    pub const MEMORY_USED_BYTES: &str = "memory_used_bytes";
    pub const MEMORY_AVAILABLE_BYTES: &str = "memory_available_bytes";
    pub const DISK_USED_BYTES: &str = "disk_used_bytes";
    pub const DISK_TOTAL_BYTES: &str = "disk_total_bytes";
    pub const CPU_COUNT: &str = "cpu_count";
    pub const LOAD_AVERAGE_1M: &str = "load_average_1m";
}

/// One timestamped measurement of host resource usage
///
/// The field set is open: samplers may add any named numeric value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Sequence number assigned by the collection loop
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub metrics: BTreeMap<String, f64>,
}

impl Snapshot {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            seq: 0,
            timestamp,
            metrics: BTreeMap::new(),
        }
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }

    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = seq;
        self
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }

    pub fn reference(&self) -> SnapshotRef {
        SnapshotRef {
            seq: self.seq,
            timestamp: self.timestamp,
        }
    }
}

/// Identifies the snapshot an anomaly was computed from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRef {
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
}

/// Ordered numeric features extracted from a snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    pub snapshot: SnapshotRef,
    pub values: Vec<f64>,
}

/// z-score of a single feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureScore {
    pub feature: String,
    pub value: f64,
    pub z_score: f64,
}

/// Severity of a raised anomaly, relative to the threshold used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalySeverity {
    Low,
    Medium,
    High,
}

impl AnomalySeverity {
    /// Classify a maximum z-score against the threshold
    pub fn classify(max_z: f64, threshold: f64) -> Self {
        if max_z > threshold * 2.0 {
            AnomalySeverity::High
        } else if max_z > threshold * 1.5 {
            AnomalySeverity::Medium
        } else {
            AnomalySeverity::Low
        }
    }
}

impl fmt::Display for AnomalySeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnomalySeverity::Low => write!(f, "low"),
            AnomalySeverity::Medium => write!(f, "medium"),
            AnomalySeverity::High => write!(f, "high"),
        }
    }
}

/// Result of scoring one feature vector against the baseline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    /// Detection time
    pub timestamp: DateTime<Utc>,
    pub snapshot: SnapshotRef,
    pub z_scores: Vec<FeatureScore>,
    pub is_anomaly: bool,
    pub threshold: f64,
    /// Feature with the largest z-score
    pub dominant_feature: Option<String>,
    pub severity: AnomalySeverity,
    /// e.g. `cpu_percent z=12.50 exceeds threshold 2.00`
    pub message: String,
}

impl Anomaly {
    /// Build a result from per-feature scores; `is_anomaly` is `max z > threshold`
    pub fn from_scores(
        timestamp: DateTime<Utc>,
        snapshot: SnapshotRef,
        z_scores: Vec<FeatureScore>,
        threshold: f64,
    ) -> Self {
        let dominant = z_scores
            .iter()
            .max_by(|a, b| a.z_score.total_cmp(&b.z_score));
        let max_z = dominant.map(|s| s.z_score).unwrap_or(0.0);
        let is_anomaly = max_z > threshold;

        let message = match dominant {
            Some(score) => format!(
                "{} z={:.2} {} threshold {:.2}",
                score.feature,
                score.z_score,
                if is_anomaly { "exceeds" } else { "within" },
                threshold
            ),
            None => "no features scored".to_string(),
        };

        Self {
            timestamp,
            snapshot,
            dominant_feature: dominant.map(|s| s.feature.clone()),
            severity: AnomalySeverity::classify(max_z, threshold),
            message,
            z_scores,
            is_anomaly,
            threshold,
        }
    }

    /// Score of the dominant feature
    pub fn dominant(&self) -> Option<&FeatureScore> {
        let name = self.dominant_feature.as_deref()?;
        self.z_scores.iter().find(|s| s.feature == name)
    }

    pub fn max_z_score(&self) -> f64 {
        self.dominant().map(|s| s.z_score).unwrap_or(0.0)
    }
}

/// A record written to the sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SinkRecord {
    Snapshot(Snapshot),
    Anomaly(Anomaly),
}

impl SinkRecord {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            SinkRecord::Snapshot(s) => s.timestamp,
            SinkRecord::Anomaly(a) => a.timestamp,
        }
    }
}
