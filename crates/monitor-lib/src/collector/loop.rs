//! Metrics collection loop
//!
//! Samples the host on a fixed interval and hands each snapshot to the
//! processing loop through the bounded channel. A sample that fails or
//! overruns the interval is logged and skipped; too many consecutive
//! failures end the loop with a `FatalCollectorError`.

use super::channel;
use super::service::PipelineCounters;
use super::Sampler;
use crate::error::{CollectionError, FatalCollectorError};
use crate::models::Snapshot;
use crate::observability::{MonitorMetrics, StructuredLogger};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Timer-driven producer half of the pipeline
pub struct CollectionLoop {
    sampler: Arc<dyn Sampler>,
    tx: channel::Sender<Snapshot>,
    interval: Duration,
    fatal_after: u32,
    seq: Arc<AtomicU64>,
    counters: Arc<PipelineCounters>,
    metrics: MonitorMetrics,
    logger: StructuredLogger,
}

impl CollectionLoop {
    pub(crate) fn new(
        sampler: Arc<dyn Sampler>,
        tx: channel::Sender<Snapshot>,
        interval: Duration,
        fatal_after: u32,
        seq: Arc<AtomicU64>,
        counters: Arc<PipelineCounters>,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            sampler,
            tx,
            interval,
            fatal_after: fatal_after.max(1),
            seq,
            counters,
            metrics: MonitorMetrics::new(),
            logger,
        }
    }

    /// Run until `shutdown` fires or the sampler fails `fatal_after` times in a row
    ///
    /// The channel sender is dropped on exit, which closes the channel for
    /// the processing loop.
    pub async fn run(
        self,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), FatalCollectorError> {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            fatal_after = self.fatal_after,
            "Starting metrics collection loop"
        );

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut consecutive_failures = 0u32;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    info!("Shutting down metrics collection loop");
                    break;
                }
                _ = ticker.tick() => {
                    match self.collect_once().await {
                        Ok(()) => consecutive_failures = 0,
                        Err(e) => {
                            consecutive_failures += 1;
                            self.counters.collection_errors.fetch_add(1, Ordering::Relaxed);
                            self.metrics.inc_collection_errors();
                            warn!(
                                error = %e,
                                consecutive_failures = consecutive_failures,
                                "Sample failed, skipping tick"
                            );

                            if consecutive_failures >= self.fatal_after {
                                return Err(FatalCollectorError {
                                    consecutive_failures,
                                    last_error: e.to_string(),
                                });
                            }
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Take one sample and push it onto the channel
    async fn collect_once(&self) -> Result<(), CollectionError> {
        let start = Instant::now();
        let result = tokio::time::timeout(self.interval, self.sampler.sample()).await;
        self.metrics
            .observe_sample_latency(start.elapsed().as_secs_f64());

        let snapshot = match result {
            Ok(sampled) => sampled?,
            Err(_) => return Err(CollectionError::Timeout(self.interval)),
        };

        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let snapshot = snapshot.with_seq(seq);
        debug!(seq = seq, "Collected snapshot");

        self.counters.collected.fetch_add(1, Ordering::Relaxed);
        self.metrics.inc_snapshots_collected();

        if let Some(evicted) = self.tx.push(snapshot) {
            let total = self.counters.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            self.metrics.inc_backpressure_drops();
            self.logger
                .log_backpressure(evicted.seq, self.tx.capacity(), total);
        }

        Ok(())
    }
}
