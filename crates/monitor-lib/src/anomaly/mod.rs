//! Anomaly detection for host resource snapshots
//!
//! This module provides:
//! - Feature extraction from snapshots
//! - A pluggable scorer trait with a z-score implementation
//! - A bounded log of recently raised anomalies for the dashboard

mod detector;
mod features;
mod recent;

pub use detector::{
    AnomalyScorer, Baseline, FeatureStats, ZScoreDetector, DEFAULT_THRESHOLD,
};
pub use features::FeatureExtractor;
pub use recent::RecentAnomalies;
