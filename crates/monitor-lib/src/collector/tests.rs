//! Lifecycle tests for the collector service
//!
//! These tests drive the full pipeline with scripted samplers and in-memory
//! sinks on short intervals.

#[cfg(test)]
mod service_tests {
    use crate::anomaly::{AnomalyScorer, FeatureExtractor, ZScoreDetector};
    use crate::collector::{CollectorService, CollectorStatus, Sampler};
    use crate::error::{CollectionError, DetectorError, SinkError};
    use crate::health::{components, ComponentStatus};
    use crate::models::{SinkRecord, Snapshot};
    use crate::sink::{MemorySink, Sink};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    type Script = Box<dyn Fn(u64) -> Option<f64> + Send + Sync>;

    /// Sampler whose CPU reading is scripted per call; `None` fails the call
    struct ScriptedSampler {
        calls: AtomicU64,
        broken: AtomicBool,
        script: Script,
    }

    impl ScriptedSampler {
        fn new(script: impl Fn(u64) -> Option<f64> + Send + Sync + 'static) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU64::new(0),
                broken: AtomicBool::new(false),
                script: Box::new(script),
            })
        }

        fn steady() -> Arc<Self> {
            Self::new(|n| Some(40.0 + (n % 5) as f64))
        }
    }

    #[async_trait]
    impl Sampler for ScriptedSampler {
        async fn sample(&self) -> Result<Snapshot, CollectionError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.broken.load(Ordering::SeqCst) {
                return Err(CollectionError::Unavailable("sensor offline".to_string()));
            }
            match (self.script)(n) {
                Some(cpu) => Ok(Snapshot::new(Utc::now())
                    .with_metric("cpu_percent", cpu)
                    .with_metric("memory_percent", 50.0)),
                None => Err(CollectionError::Other(format!("call {} failed", n))),
            }
        }
    }

    struct BrokenSink;

    impl Sink for BrokenSink {
        fn write(&self, _record: &SinkRecord) -> Result<(), SinkError> {
            Err(SinkError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only filesystem",
            )))
        }
    }

    /// Sink that fails while `broken` is set
    struct ToggleSink {
        inner: MemorySink,
        broken: AtomicBool,
    }

    impl Sink for ToggleSink {
        fn write(&self, record: &SinkRecord) -> Result<(), SinkError> {
            if self.broken.load(Ordering::SeqCst) {
                return Err(SinkError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "disk full",
                )));
            }
            self.inner.write(record)
        }
    }

    /// Sink that blocks on every write
    struct SlowSink {
        inner: MemorySink,
        delay: Duration,
    }

    impl Sink for SlowSink {
        fn write(&self, record: &SinkRecord) -> Result<(), SinkError> {
            std::thread::sleep(self.delay);
            self.inner.write(record)
        }
    }

    fn service(sampler: Arc<dyn Sampler>, sink: Arc<dyn Sink>) -> CollectorService {
        CollectorService::builder()
            .sampler(sampler)
            .sink(sink)
            .extractor(FeatureExtractor::new(["cpu_percent"]))
            .interval(Duration::from_millis(10))
            .housekeeping_interval(Duration::from_millis(20))
            .fatal_after(3)
            .build()
            .unwrap()
    }

    async fn wait_for_status(service: &CollectorService, wanted: fn(&CollectorStatus) -> bool) {
        let mut rx = service.subscribe_status();
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| wanted(s)))
            .await
            .expect("status change timed out")
            .expect("status channel closed");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_runs_for_a_while_then_stops_cleanly() {
        let sink = Arc::new(MemorySink::new());
        let service = service(ScriptedSampler::steady(), sink.clone());

        service.start().await;
        assert_eq!(service.status(), CollectorStatus::Running);
        tokio::time::sleep(Duration::from_millis(500)).await;
        service.stop().await;

        assert_eq!(service.status(), CollectorStatus::Stopped);
        let written = sink.len();
        assert!(
            (40..=55).contains(&written),
            "expected about 50 records, got {}",
            written
        );

        // Nothing is written after stop returns
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(sink.len(), written);

        let stats = service.stats();
        assert_eq!(stats.processed as usize, written);
        assert_eq!(stats.collected, stats.processed + stats.dropped);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_consecutive_failures_fail_the_service() {
        let sampler = ScriptedSampler::steady();
        sampler.broken.store(true, Ordering::SeqCst);
        let service = service(sampler.clone(), Arc::new(MemorySink::new()));

        service.start().await;
        wait_for_status(&service, CollectorStatus::is_failed).await;

        match service.status() {
            CollectorStatus::Failed { error } => {
                assert_eq!(error.consecutive_failures, 3);
                assert!(error.last_error.contains("sensor offline"));
            }
            other => panic!("expected failed status, got {:?}", other),
        }
        let collector = service
            .health()
            .component(components::COLLECTOR)
            .await
            .unwrap();
        assert_eq!(collector.status, ComponentStatus::Unhealthy);
        assert!(!service.health().readiness().await.ready);

        // Failed survives stop and is cleared by the next start
        service.stop().await;
        assert!(service.status().is_failed());

        sampler.broken.store(false, Ordering::SeqCst);
        service.start().await;
        assert_eq!(service.status(), CollectorStatus::Running);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(service.status(), CollectorStatus::Running);
        service.stop().await;
        assert_eq!(service.status(), CollectorStatus::Stopped);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_isolated_failures_are_skipped() {
        let sink = Arc::new(MemorySink::new());
        let sampler = ScriptedSampler::new(|n| if n % 2 == 1 { None } else { Some(40.0) });
        let service = service(sampler, sink.clone());

        service.start().await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(service.status(), CollectorStatus::Running);
        service.stop().await;

        let stats = service.stats();
        assert!(stats.collection_errors > 0);
        assert!(stats.collected > 0);
        assert_eq!(sink.len() as u64, stats.processed);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let service = service(ScriptedSampler::steady(), Arc::new(MemorySink::new()));

        // Never started
        service.stop().await;
        assert_eq!(service.status(), CollectorStatus::Stopped);

        service.start().await;
        service.start().await;
        service.stop().await;
        service.stop().await;
        assert_eq!(service.status(), CollectorStatus::Stopped);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_restart_keeps_baseline_and_sequence() {
        let sink = Arc::new(MemorySink::new());
        let detector = Arc::new(ZScoreDetector::new(2.0).with_feature_names(["cpu_percent"]));
        detector
            .fit(&[vec![40.0], vec![42.0], vec![38.0], vec![41.0]])
            .unwrap();
        let fitted_at = detector.baseline().unwrap().fitted_at;

        let service = CollectorService::builder()
            .sampler(ScriptedSampler::steady())
            .sink(sink.clone())
            .detector(detector.clone())
            .extractor(FeatureExtractor::new(["cpu_percent"]))
            .interval(Duration::from_millis(10))
            .build()
            .unwrap();

        service.start().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        service.stop().await;
        service.start().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        service.stop().await;

        assert_eq!(detector.baseline().unwrap().fitted_at, fitted_at);

        let seqs: Vec<u64> = sink
            .records()
            .iter()
            .filter_map(|r| match r {
                SinkRecord::Snapshot(s) => Some(s.seq),
                _ => None,
            })
            .collect();
        assert!(seqs.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_failing_sink_does_not_stop_collection() {
        let service = service(ScriptedSampler::steady(), Arc::new(BrokenSink));

        service.start().await;
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(service.status(), CollectorStatus::Running);
        service.stop().await;

        let stats = service.stats();
        assert!(stats.processed > 0);
        assert!(stats.sink_errors >= stats.processed);
        // The window keeps filling even though nothing is persisted
        assert_eq!(
            service.dashboard().recent_metrics().len() as u64,
            stats.processed
        );
        let sink = service.health().component(components::SINK).await.unwrap();
        assert_eq!(sink.status, ComponentStatus::Degraded);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_sink_recovers_after_restart() {
        let sink = Arc::new(ToggleSink {
            inner: MemorySink::new(),
            broken: AtomicBool::new(true),
        });
        let service = service(ScriptedSampler::steady(), sink.clone());

        service.start().await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        service.stop().await;
        let degraded = service.health().component(components::SINK).await.unwrap();
        assert_eq!(degraded.status, ComponentStatus::Degraded);

        sink.broken.store(false, Ordering::SeqCst);
        service.start().await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        service.stop().await;

        assert!(!sink.inner.is_empty());
        let recovered = service.health().component(components::SINK).await.unwrap();
        assert_eq!(recovered.status, ComponentStatus::Healthy);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_slow_sink_drops_oldest_snapshots() {
        let sink = Arc::new(SlowSink {
            inner: MemorySink::new(),
            delay: Duration::from_millis(40),
        });
        let service = CollectorService::builder()
            .sampler(ScriptedSampler::steady())
            .sink(sink.clone())
            .interval(Duration::from_millis(5))
            .channel_capacity(2)
            .build()
            .unwrap();

        service.start().await;
        tokio::time::sleep(Duration::from_millis(300)).await;
        service.stop().await;

        let stats = service.stats();
        assert!(stats.dropped > 0, "expected drops, got {:?}", stats);
        assert_eq!(stats.collected, stats.processed + stats.dropped);
        assert_eq!(sink.inner.len() as u64, stats.processed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_anomaly_follows_its_snapshot() {
        let sink = Arc::new(MemorySink::new());
        let detector = Arc::new(ZScoreDetector::new(2.0).with_feature_names(["cpu_percent"]));
        let baseline: Vec<Vec<f64>> = (0..100).map(|i| vec![38.0 + (i % 5) as f64]).collect();
        detector.fit(&baseline).unwrap();

        let sampler = ScriptedSampler::new(|n| Some(if n == 5 { 95.0 } else { 40.0 }));
        let service = CollectorService::builder()
            .sampler(sampler)
            .sink(sink.clone())
            .detector(detector)
            .extractor(FeatureExtractor::new(["cpu_percent"]))
            .interval(Duration::from_millis(10))
            .build()
            .unwrap();

        service.start().await;
        tokio::time::sleep(Duration::from_millis(150)).await;
        service.stop().await;

        let records = sink.records();
        let idx = records
            .iter()
            .position(|r| matches!(r, SinkRecord::Anomaly(_)))
            .expect("anomaly record");
        let SinkRecord::Anomaly(anomaly) = &records[idx] else {
            unreachable!()
        };
        match &records[idx - 1] {
            SinkRecord::Snapshot(s) => assert_eq!(s.seq, anomaly.snapshot.seq),
            other => panic!("expected snapshot before anomaly, got {:?}", other),
        }
        assert_eq!(anomaly.dominant_feature.as_deref(), Some("cpu_percent"));
        assert!(anomaly.message.starts_with("cpu_percent z="));
        assert_eq!(service.dashboard().recent_anomalies().len(), 1);
        assert_eq!(service.stats().anomalies, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_warmup_fits_detector_from_window() {
        let detector = Arc::new(ZScoreDetector::new(2.0).with_feature_names(["cpu_percent"]));
        let service = CollectorService::builder()
            .sampler(ScriptedSampler::steady())
            .sink(Arc::new(MemorySink::new()))
            .detector(detector.clone())
            .extractor(FeatureExtractor::new(["cpu_percent"]))
            .interval(Duration::from_millis(10))
            .baseline_warmup_samples(5)
            .build()
            .unwrap();

        service.start().await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        service.stop().await;

        let baseline = detector.baseline().expect("fitted during warmup");
        assert_eq!(baseline.sample_count, 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_fit_from_window() {
        let service = service(ScriptedSampler::steady(), Arc::new(MemorySink::new()));
        assert_eq!(
            service.fit_from_window(),
            Err(DetectorError::InsufficientData)
        );

        service.start().await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        service.stop().await;

        let fitted = service.fit_from_window().unwrap();
        assert_eq!(fitted, service.dashboard().window_len());
        assert!(service.detector().is_fitted());
        assert_eq!(service.dashboard().recent_metrics_limited(3).len(), 3);
    }

    #[test]
    fn test_builder_requires_sampler_and_sink() {
        let err = CollectorService::builder()
            .sink(Arc::new(MemorySink::new()))
            .build()
            .err()
            .unwrap();
        assert!(err.to_string().contains("Sampler"));

        let err = CollectorService::builder()
            .sampler(ScriptedSampler::steady())
            .build()
            .err()
            .unwrap();
        assert!(err.to_string().contains("Sink"));
    }
}
