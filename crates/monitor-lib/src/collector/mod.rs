//! Host metrics collection pipeline
//!
//! A timer-driven collection loop samples the host and pushes snapshots onto
//! a bounded drop-oldest channel. A processing loop drains the channel,
//! maintains the rolling window, scores snapshots for anomalies and writes
//! records to the sink. [`CollectorService`] owns both loops and their
//! start/stop lifecycle.

pub mod channel;
mod processor;
mod r#loop;
mod service;
mod system;

#[cfg(test)]
mod tests;

pub use r#loop::CollectionLoop;
pub use processor::Processor;
pub use service::{
    CollectorBuilder, CollectorConfig, CollectorService, CollectorStats, CollectorStatus,
};
pub use system::SystemSampler;

use crate::error::CollectionError;
use crate::models::Snapshot;

pub use async_trait::async_trait;

/// Reads current host resource usage into a snapshot
///
/// Implementations must not panic on platform failures; they return a
/// `CollectionError` and the collection loop skips the tick.
#[async_trait]
pub trait Sampler: Send + Sync {
    async fn sample(&self) -> Result<Snapshot, CollectionError>;
}
