//! Processing loop
//!
//! Drains the channel in FIFO order. For each snapshot: append to the
//! window and prune, score it if the detector is fitted, then write the
//! snapshot and any raised anomaly to the sink. The processor is the only
//! writer of the window.

use super::channel::{self, PopTimeout};
use super::service::PipelineCounters;
use crate::anomaly::{AnomalyScorer, FeatureExtractor, RecentAnomalies};
use crate::error::DetectorError;
use crate::health::{components, HealthRegistry};
use crate::models::{Anomaly, SinkRecord, Snapshot};
use crate::observability::{MonitorMetrics, StructuredLogger};
use crate::sink::Sink;
use crate::window::SharedWindow;
use chrono::Utc;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Consumer half of the pipeline
pub struct Processor {
    window: SharedWindow,
    detector: Arc<dyn AnomalyScorer>,
    extractor: FeatureExtractor,
    sink: Arc<dyn Sink>,
    recent: RecentAnomalies,
    housekeeping_interval: Duration,
    warmup_samples: Option<usize>,
    counters: Arc<PipelineCounters>,
    health: HealthRegistry,
    metrics: MonitorMetrics,
    logger: StructuredLogger,
    /// Last observed sink outcome; `None` until the first write after start
    sink_ok: Option<bool>,
}

impl Processor {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        window: SharedWindow,
        detector: Arc<dyn AnomalyScorer>,
        extractor: FeatureExtractor,
        sink: Arc<dyn Sink>,
        recent: RecentAnomalies,
        housekeeping_interval: Duration,
        warmup_samples: Option<usize>,
        counters: Arc<PipelineCounters>,
        health: HealthRegistry,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            window,
            detector,
            extractor,
            sink,
            recent,
            housekeeping_interval,
            warmup_samples,
            counters,
            health,
            metrics: MonitorMetrics::new(),
            logger,
            sink_ok: None,
        }
    }

    /// Process snapshots until the channel closes or `shutdown` fires
    ///
    /// Whatever is still queued when the signal arrives is processed before
    /// returning.
    pub async fn run(
        mut self,
        rx: channel::Receiver<Snapshot>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        info!(
            housekeeping_ms = self.housekeeping_interval.as_millis() as u64,
            "Starting snapshot processing loop"
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    debug!("Processing loop received stop signal");
                    break;
                }
                popped = rx.pop_timeout(self.housekeeping_interval) => match popped {
                    PopTimeout::Item(snapshot) => self.process(snapshot).await,
                    PopTimeout::TimedOut => self.housekeeping(),
                    PopTimeout::Closed => break,
                }
            }
        }

        let remaining = rx.drain();
        if !remaining.is_empty() {
            debug!(count = remaining.len(), "Draining queued snapshots");
        }
        for snapshot in remaining {
            self.process(snapshot).await;
        }

        info!("Snapshot processing loop stopped");
    }

    /// Handle one snapshot end to end
    pub async fn process(&mut self, snapshot: Snapshot) {
        let (accepted, window_len) = {
            let mut window = self.window.write();
            let accepted = window.append(snapshot.clone());
            window.prune(Utc::now());
            (accepted, window.len())
        };
        self.metrics.set_window_snapshots(window_len);

        if !accepted {
            self.counters.out_of_order.fetch_add(1, Ordering::Relaxed);
            return;
        }

        self.warm_up(window_len);
        let anomaly = self.score(&snapshot);

        self.write(SinkRecord::Snapshot(snapshot)).await;
        if let Some(anomaly) = anomaly {
            self.write(SinkRecord::Anomaly(anomaly)).await;
        }

        self.counters.processed.fetch_add(1, Ordering::Relaxed);
        self.metrics.inc_snapshots_processed();
    }

    /// Prune the window when no data arrived within the poll timeout
    fn housekeeping(&self) {
        let len = {
            let mut window = self.window.write();
            let removed = window.prune(Utc::now());
            if removed > 0 {
                debug!(removed = removed, "Pruned expired snapshots");
            }
            window.len()
        };
        self.metrics.set_window_snapshots(len);
    }

    /// Fit an unfitted detector once enough history has accumulated
    fn warm_up(&self, window_len: usize) {
        let Some(required) = self.warmup_samples else {
            return;
        };
        if window_len < required || self.detector.is_fitted() {
            return;
        }

        let snapshots = self.window.reader().snapshots();
        let samples = self.extractor.fitting_set(&snapshots);
        if samples.len() < required {
            debug!(
                usable = samples.len(),
                required = required,
                "Not enough complete snapshots to fit baseline"
            );
            return;
        }

        match self.detector.fit(&samples) {
            Ok(()) => self.logger.log_baseline_fitted(samples.len(), "warmup"),
            Err(e) => warn!(error = %e, "Baseline warmup fit failed"),
        }
    }

    /// Score a snapshot; returns the anomaly record only when one is raised
    fn score(&self, snapshot: &Snapshot) -> Option<Anomaly> {
        if !self.detector.is_fitted() {
            return None;
        }

        let features = match self.extractor.extract(snapshot) {
            Ok(features) => features,
            Err(e) => {
                debug!(seq = snapshot.seq, error = %e, "Skipping detection");
                return None;
            }
        };

        match self.detector.detect(&features) {
            Ok(anomaly) if anomaly.is_anomaly => {
                self.counters.anomalies.fetch_add(1, Ordering::Relaxed);
                self.metrics.inc_anomalies_detected();
                self.logger.log_anomaly(&anomaly);
                self.recent.push(anomaly.clone());
                Some(anomaly)
            }
            Ok(_) => None,
            Err(DetectorError::NotFitted) => None,
            Err(e) => {
                warn!(seq = snapshot.seq, error = %e, "Anomaly detection failed");
                None
            }
        }
    }

    /// Attempt a sink write once; failures are logged and counted
    async fn write(&mut self, record: SinkRecord) {
        match self.sink.write(&record) {
            Ok(()) => {
                // The registry may still hold a degraded sink from a previous run
                if self.sink_ok != Some(true) {
                    if self.sink_ok == Some(false) {
                        info!("Sink writes recovered");
                    }
                    self.sink_ok = Some(true);
                    self.health.set_healthy(components::SINK).await;
                }
            }
            Err(e) => {
                self.counters.sink_errors.fetch_add(1, Ordering::Relaxed);
                self.metrics.inc_sink_write_errors();
                warn!(error = %e, "Failed to write record to sink");
                if self.sink_ok != Some(false) {
                    self.sink_ok = Some(false);
                    self.health
                        .set_degraded(components::SINK, format!("sink write failed: {}", e))
                        .await;
                }
            }
        }
    }
}
