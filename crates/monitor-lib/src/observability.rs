//! Observability infrastructure for the host monitor
//!
//! Provides:
//! - Prometheus metrics (sample latency, pipeline counters, window size)
//! - Structured JSON logging of pipeline events with tracing

use crate::error::FatalCollectorError;
use crate::models::Anomaly;
use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, Histogram, IntCounter, IntGauge,
};
use std::sync::OnceLock;
use tracing::{error, info, warn};

/// Histogram buckets for sample latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<MonitorMetricsInner> = OnceLock::new();

struct MonitorMetricsInner {
    sample_latency_seconds: Histogram,
    snapshots_collected: IntCounter,
    collection_errors: IntCounter,
    backpressure_drops: IntCounter,
    snapshots_processed: IntCounter,
    sink_write_errors: IntCounter,
    anomalies_detected: IntCounter,
    window_snapshots: IntGauge,
    collector_running: IntGauge,
}

impl MonitorMetricsInner {
    fn new() -> Self {
        Self {
            sample_latency_seconds: register_histogram!(
                "host_monitor_sample_latency_seconds",
                "Time spent reading host resource usage",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register sample_latency_seconds"),

            snapshots_collected: register_int_counter!(
                "host_monitor_snapshots_collected_total",
                "Snapshots handed from the sampler to the channel"
            )
            .expect("Failed to register snapshots_collected"),

            collection_errors: register_int_counter!(
                "host_monitor_collection_errors_total",
                "Failed or timed out samples"
            )
            .expect("Failed to register collection_errors"),

            backpressure_drops: register_int_counter!(
                "host_monitor_backpressure_drops_total",
                "Snapshots evicted from a full channel"
            )
            .expect("Failed to register backpressure_drops"),

            snapshots_processed: register_int_counter!(
                "host_monitor_snapshots_processed_total",
                "Snapshots appended to the window and written to the sink"
            )
            .expect("Failed to register snapshots_processed"),

            sink_write_errors: register_int_counter!(
                "host_monitor_sink_write_errors_total",
                "Records the sink failed to persist"
            )
            .expect("Failed to register sink_write_errors"),

            anomalies_detected: register_int_counter!(
                "host_monitor_anomalies_detected_total",
                "Anomalies raised by the detector"
            )
            .expect("Failed to register anomalies_detected"),

            window_snapshots: register_int_gauge!(
                "host_monitor_window_snapshots",
                "Snapshots currently held in the rolling window"
            )
            .expect("Failed to register window_snapshots"),

            collector_running: register_int_gauge!(
                "host_monitor_collector_running",
                "1 while the collector service is running"
            )
            .expect("Failed to register collector_running"),
        }
    }
}

/// Monitor metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct MonitorMetrics {
    _private: (),
}

impl Default for MonitorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &MonitorMetricsInner {
        GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new)
    }

    pub fn observe_sample_latency(&self, duration_secs: f64) {
        self.inner().sample_latency_seconds.observe(duration_secs);
    }

    pub fn inc_snapshots_collected(&self) {
        self.inner().snapshots_collected.inc();
    }

    pub fn inc_collection_errors(&self) {
        self.inner().collection_errors.inc();
    }

    pub fn inc_backpressure_drops(&self) {
        self.inner().backpressure_drops.inc();
    }

    pub fn inc_snapshots_processed(&self) {
        self.inner().snapshots_processed.inc();
    }

    pub fn inc_sink_write_errors(&self) {
        self.inner().sink_write_errors.inc();
    }

    pub fn inc_anomalies_detected(&self) {
        self.inner().anomalies_detected.inc();
    }

    pub fn set_window_snapshots(&self, count: usize) {
        self.inner().window_snapshots.set(count as i64);
    }

    pub fn set_collector_running(&self, running: bool) {
        self.inner().collector_running.set(i64::from(running));
    }
}

/// Structured logger for pipeline events
///
/// Emits consistently named `event` fields so log pipelines can route
/// anomalies and collector failures without parsing messages.
#[derive(Clone)]
pub struct StructuredLogger {
    host: String,
}

impl StructuredLogger {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Log an anomaly raised by the detector
    pub fn log_anomaly(&self, anomaly: &Anomaly) {
        let feature = anomaly.dominant_feature.as_deref().unwrap_or("none");

        warn!(
            event = "anomaly_detected",
            host = %self.host,
            snapshot_seq = anomaly.snapshot.seq,
            feature = %feature,
            max_z_score = anomaly.max_z_score(),
            threshold = anomaly.threshold,
            severity = %anomaly.severity,
            details = %anomaly.message,
            "Anomaly detected"
        );
    }

    /// Log a snapshot evicted from a full channel
    pub fn log_backpressure(&self, dropped_seq: u64, capacity: usize, total_dropped: u64) {
        warn!(
            event = "backpressure_drop",
            host = %self.host,
            dropped_seq = dropped_seq,
            capacity = capacity,
            total_dropped = total_dropped,
            "Channel full, dropped oldest snapshot"
        );
    }

    /// Log the collector giving up after repeated sampling failures
    pub fn log_collector_fatal(&self, err: &FatalCollectorError) {
        error!(
            event = "collector_fatal",
            host = %self.host,
            consecutive_failures = err.consecutive_failures,
            last_error = %err.last_error,
            "Collector stopped after repeated sampling failures"
        );
    }

    /// Log a baseline (re)fit
    pub fn log_baseline_fitted(&self, samples: usize, source: &str) {
        info!(
            event = "baseline_fitted",
            host = %self.host,
            samples = samples,
            source = %source,
            "Anomaly baseline fitted"
        );
    }

    pub fn log_startup(&self, version: &str) {
        info!(
            event = "monitor_started",
            host = %self.host,
            version = %version,
            "Host monitor started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "monitor_shutdown",
            host = %self.host,
            reason = %reason,
            "Host monitor shutting down"
        );
    }
}
