//! Error taxonomy for the monitoring pipeline
//!
//! Hot-path failures (`CollectionError`, `SinkError`) are absorbed by the
//! collector service with logging. Detector misuse (`DetectorError`) is
//! returned to the caller and never retried. `FatalCollectorError` is the
//! escalation raised after too many consecutive sampler failures.

use serde::Serialize;
use thiserror::Error;

/// Failure to read host state from the platform
#[derive(Debug, Clone, Error)]
pub enum CollectionError {
    #[error("platform metrics unavailable: {0}")]
    Unavailable(String),

    #[error("sample did not complete within {0:?}")]
    Timeout(std::time::Duration),

    #[error("collection failed: {0}")]
    Other(String),
}

/// Misuse of the anomaly detector
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DetectorError {
    #[error("detector has not been fitted")]
    NotFitted,

    #[error("cannot fit a baseline from an empty sample set")]
    InsufficientData,

    #[error("feature vector has {actual} dimensions, baseline has {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("snapshot is missing feature '{0}'")]
    MissingFeature(String),

    #[error("feature vector contains a non-finite value")]
    NonFinite,
}

/// Failure to persist a record
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Raised when the sampler fails too many times in a row
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[error("collector stopped after {consecutive_failures} consecutive sampling failures: {last_error}")]
pub struct FatalCollectorError {
    pub consecutive_failures: u32,
    pub last_error: String,
}

/// Invalid or unloadable configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}
