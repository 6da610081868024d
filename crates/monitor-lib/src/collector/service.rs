//! Collector service lifecycle
//!
//! `start` spawns the collection and processing loops; `stop` signals the
//! collection loop, waits for it, then signals the processing loop, which
//! drains what is already queued before exiting. Both calls are idempotent
//! and safe to issue from any task.

use super::channel;
use super::processor::Processor;
use super::r#loop::CollectionLoop;
use super::Sampler;
use crate::anomaly::{AnomalyScorer, FeatureExtractor, RecentAnomalies, ZScoreDetector};
use crate::dashboard::DashboardView;
use crate::error::{DetectorError, FatalCollectorError};
use crate::health::{components, HealthRegistry};
use crate::models::Snapshot;
use crate::observability::{MonitorMetrics, StructuredLogger};
use crate::sink::Sink;
use crate::window::{SharedWindow, DEFAULT_WINDOW_DURATION};
use anyhow::Result;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Runtime configuration of the collector service
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Sampling interval (default: 60 seconds)
    pub interval: Duration,
    /// Rolling window retention (default: 1 hour)
    pub window_duration: Duration,
    /// Bounded channel capacity (default: 100)
    pub channel_capacity: usize,
    /// Consecutive sampler failures before a fatal stop (default: 5)
    pub fatal_after: u32,
    /// Processing loop poll timeout for housekeeping (default: 1 second)
    pub housekeeping_interval: Duration,
    /// Number of recent anomalies kept for the dashboard (default: 100)
    pub recent_anomalies_capacity: usize,
    /// Fit an unfitted detector once the window holds this many samples
    pub baseline_warmup_samples: Option<usize>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            window_duration: DEFAULT_WINDOW_DURATION,
            channel_capacity: 100,
            fatal_after: 5,
            housekeeping_interval: Duration::from_secs(1),
            recent_anomalies_capacity: 100,
            baseline_warmup_samples: None,
        }
    }
}

/// Lifecycle state of the collector service
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum CollectorStatus {
    Stopped,
    Running,
    /// Stopped by repeated sampler failures; cleared by the next `start`
    Failed { error: FatalCollectorError },
}

impl CollectorStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, CollectorStatus::Running)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, CollectorStatus::Failed { .. })
    }
}

/// Shared pipeline counters
#[derive(Debug, Default)]
pub(crate) struct PipelineCounters {
    pub collected: AtomicU64,
    pub collection_errors: AtomicU64,
    pub dropped: AtomicU64,
    pub processed: AtomicU64,
    pub out_of_order: AtomicU64,
    pub sink_errors: AtomicU64,
    pub anomalies: AtomicU64,
}

/// Point-in-time copy of the pipeline counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CollectorStats {
    pub collected: u64,
    pub collection_errors: u64,
    pub dropped: u64,
    pub processed: u64,
    pub out_of_order: u64,
    pub sink_errors: u64,
    pub anomalies: u64,
}

impl PipelineCounters {
    fn snapshot(&self) -> CollectorStats {
        CollectorStats {
            collected: self.collected.load(Ordering::Relaxed),
            collection_errors: self.collection_errors.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            out_of_order: self.out_of_order.load(Ordering::Relaxed),
            sink_errors: self.sink_errors.load(Ordering::Relaxed),
            anomalies: self.anomalies.load(Ordering::Relaxed),
        }
    }
}

/// Handles of a started pipeline
struct RunningTasks {
    collect_stop: broadcast::Sender<()>,
    process_stop: broadcast::Sender<()>,
    collection: JoinHandle<()>,
    processing: JoinHandle<()>,
}

impl RunningTasks {
    fn collection_finished(&self) -> bool {
        self.collection.is_finished()
    }

    /// Stop the collection loop first so nothing is pushed after the processor drains
    async fn shutdown(self) {
        let _ = self.collect_stop.send(());
        if let Err(e) = self.collection.await {
            error!(error = %e, "Collection task panicked");
        }

        let _ = self.process_stop.send(());
        if let Err(e) = self.processing.await {
            error!(error = %e, "Processing task panicked");
        }
    }
}

/// Owns the Sampler → Channel → Processor pipeline
pub struct CollectorService {
    sampler: Arc<dyn Sampler>,
    detector: Arc<dyn AnomalyScorer>,
    extractor: FeatureExtractor,
    sink: Arc<dyn Sink>,
    config: CollectorConfig,
    window: SharedWindow,
    recent: RecentAnomalies,
    counters: Arc<PipelineCounters>,
    seq: Arc<AtomicU64>,
    status: Arc<watch::Sender<CollectorStatus>>,
    health: HealthRegistry,
    metrics: MonitorMetrics,
    logger: StructuredLogger,
    tasks: Mutex<Option<RunningTasks>>,
}

impl CollectorService {
    pub fn builder() -> CollectorBuilder {
        CollectorBuilder::new()
    }

    /// Start both loops; a no-op while already running
    pub async fn start(&self) {
        let mut tasks = self.tasks.lock().await;

        if let Some(running) = tasks.as_ref() {
            if !running.collection_finished() {
                debug!("Collector already running");
                return;
            }
        }
        // Reap a pipeline that ended on its own (fatal stop)
        if let Some(stale) = tasks.take() {
            stale.shutdown().await;
        }

        let (tx, rx) = channel::bounded(self.config.channel_capacity);
        let (collect_stop, collect_stop_rx) = broadcast::channel(1);
        let (process_stop, process_stop_rx) = broadcast::channel(1);

        let collection_loop = CollectionLoop::new(
            self.sampler.clone(),
            tx,
            self.config.interval,
            self.config.fatal_after,
            self.seq.clone(),
            self.counters.clone(),
            self.logger.clone(),
        );
        let processor = Processor::new(
            self.window.clone(),
            self.detector.clone(),
            self.extractor.clone(),
            self.sink.clone(),
            self.recent.clone(),
            self.config.housekeeping_interval,
            self.config.baseline_warmup_samples,
            self.counters.clone(),
            self.health.clone(),
            self.logger.clone(),
        );

        self.health.register_pipeline().await;
        self.health.set_healthy(components::PROCESSOR).await;
        self.set_status(CollectorStatus::Running).await;

        let collection = {
            let status = self.status.clone();
            let health = self.health.clone();
            let metrics = self.metrics.clone();
            let logger = self.logger.clone();
            tokio::spawn(async move {
                if let Err(fatal) = collection_loop.run(collect_stop_rx).await {
                    logger.log_collector_fatal(&fatal);
                    metrics.set_collector_running(false);
                    let failed = CollectorStatus::Failed { error: fatal };
                    health.record_collector_status(&failed).await;
                    status.send_replace(failed);
                }
            })
        };
        let processing = tokio::spawn(processor.run(rx, process_stop_rx));

        *tasks = Some(RunningTasks {
            collect_stop,
            process_stop,
            collection,
            processing,
        });

        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            channel_capacity = self.config.channel_capacity,
            "Collector service started"
        );
    }

    /// Stop both loops and wait for them to exit; a no-op when already stopped
    ///
    /// A `Failed` status is kept so the fatal error stays visible.
    pub async fn stop(&self) {
        let mut tasks = self.tasks.lock().await;
        let Some(running) = tasks.take() else {
            return;
        };

        running.shutdown().await;

        let failed = self.status.borrow().is_failed();
        if !failed {
            self.set_status(CollectorStatus::Stopped).await;
        }
        info!("Collector service stopped");
    }

    async fn set_status(&self, status: CollectorStatus) {
        self.metrics.set_collector_running(status.is_running());
        self.health.record_collector_status(&status).await;
        self.status.send_replace(status);
    }

    pub fn status(&self) -> CollectorStatus {
        self.status.borrow().clone()
    }

    /// Receiver notified on every status transition
    pub fn subscribe_status(&self) -> watch::Receiver<CollectorStatus> {
        self.status.subscribe()
    }

    pub fn stats(&self) -> CollectorStats {
        self.counters.snapshot()
    }

    /// Read-only dashboard accessors over the live window and recent anomalies
    pub fn dashboard(&self) -> DashboardView {
        DashboardView::new(self.window.reader(), self.recent.clone())
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }

    pub fn detector(&self) -> &Arc<dyn AnomalyScorer> {
        &self.detector
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// Refit the detector from the snapshots currently in the window
    ///
    /// Returns the number of samples the new baseline was fitted on.
    pub fn fit_from_window(&self) -> Result<usize, DetectorError> {
        let snapshots: Vec<Snapshot> = self.window.reader().snapshots();
        let samples = self.extractor.fitting_set(&snapshots);
        self.detector.fit(&samples)?;
        self.logger.log_baseline_fitted(samples.len(), "window");
        Ok(samples.len())
    }
}

/// Builder for the collector service
pub struct CollectorBuilder {
    sampler: Option<Arc<dyn Sampler>>,
    sink: Option<Arc<dyn Sink>>,
    detector: Option<Arc<dyn AnomalyScorer>>,
    extractor: FeatureExtractor,
    config: CollectorConfig,
    health: Option<HealthRegistry>,
    logger: Option<StructuredLogger>,
}

impl CollectorBuilder {
    pub fn new() -> Self {
        Self {
            sampler: None,
            sink: None,
            detector: None,
            extractor: FeatureExtractor::default(),
            config: CollectorConfig::default(),
            health: None,
            logger: None,
        }
    }

    pub fn sampler(mut self, sampler: Arc<dyn Sampler>) -> Self {
        self.sampler = Some(sampler);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Defaults to an unfitted `ZScoreDetector` named after the extractor's features
    pub fn detector(mut self, detector: Arc<dyn AnomalyScorer>) -> Self {
        self.detector = Some(detector);
        self
    }

    pub fn extractor(mut self, extractor: FeatureExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn config(mut self, config: CollectorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    pub fn window_duration(mut self, duration: Duration) -> Self {
        self.config.window_duration = duration;
        self
    }

    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    pub fn fatal_after(mut self, failures: u32) -> Self {
        self.config.fatal_after = failures;
        self
    }

    pub fn housekeeping_interval(mut self, interval: Duration) -> Self {
        self.config.housekeeping_interval = interval;
        self
    }

    pub fn baseline_warmup_samples(mut self, samples: usize) -> Self {
        self.config.baseline_warmup_samples = Some(samples);
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn build(self) -> Result<CollectorService> {
        let sampler = self
            .sampler
            .ok_or_else(|| anyhow::anyhow!("Sampler is required"))?;
        let sink = self
            .sink
            .ok_or_else(|| anyhow::anyhow!("Sink is required"))?;

        if self.config.interval.is_zero() {
            anyhow::bail!("Collection interval must be positive");
        }
        if self.config.housekeeping_interval.is_zero() {
            anyhow::bail!("Housekeeping interval must be positive");
        }
        if self.config.fatal_after == 0 {
            anyhow::bail!("fatal_after must be at least 1");
        }
        if self.extractor.dimensions() == 0 {
            anyhow::bail!("At least one detection feature is required");
        }

        let detector = self.detector.unwrap_or_else(|| {
            Arc::new(
                ZScoreDetector::default()
                    .with_feature_names(self.extractor.feature_names().iter().cloned()),
            )
        });
        let (status, _) = watch::channel(CollectorStatus::Stopped);

        Ok(CollectorService {
            sampler,
            detector,
            extractor: self.extractor,
            sink,
            window: SharedWindow::new(self.config.window_duration),
            recent: RecentAnomalies::new(self.config.recent_anomalies_capacity),
            config: self.config,
            counters: Arc::new(PipelineCounters::default()),
            seq: Arc::new(AtomicU64::new(0)),
            status: Arc::new(status),
            health: self.health.unwrap_or_default(),
            metrics: MonitorMetrics::new(),
            logger: self
                .logger
                .unwrap_or_else(|| StructuredLogger::new("unknown")),
            tasks: Mutex::new(None),
        })
    }
}

impl Default for CollectorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
