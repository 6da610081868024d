//! z-score anomaly detection against a fixed baseline
//!
//! The detector is fitted once on a baseline sample set (per-feature mean
//! and population standard deviation) and then scores each new feature
//! vector with `z = |x - mean| / std`. A sample is anomalous when its largest
//! per-feature z-score exceeds the configured threshold.
//!
//! The baseline is immutable and held behind an `Arc`. Re-fitting builds a
//! new baseline and swaps the pointer, so a concurrent `detect` always scores
//! against one complete baseline.

use crate::error::DetectorError;
use crate::models::{Anomaly, FeatureScore, FeatureVector};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, RwLock};

/// Default z-score threshold
pub const DEFAULT_THRESHOLD: f64 = 2.0;

/// Pluggable anomaly scorer
pub trait AnomalyScorer: Send + Sync {
    /// Replace the baseline with one computed from `samples`
    fn fit(&self, samples: &[Vec<f64>]) -> Result<(), DetectorError>;

    /// Score one feature vector against the current baseline
    fn detect(&self, sample: &FeatureVector) -> Result<Anomaly, DetectorError>;

    fn is_fitted(&self) -> bool;

    fn threshold(&self) -> f64;
}

/// Mean and standard deviation of one feature
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureStats {
    pub name: String,
    pub mean: f64,
    pub std_dev: f64,
}

impl FeatureStats {
    /// z-score of `value`; zero when the feature had no variance
    pub fn z_score(&self, value: f64) -> f64 {
        if self.std_dev <= self.mean.abs().max(1.0) * 1e-12 {
            return 0.0;
        }
        (value - self.mean).abs() / self.std_dev
    }
}

/// Baseline statistics computed by `fit`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Baseline {
    pub features: Vec<FeatureStats>,
    pub sample_count: usize,
    pub fitted_at: DateTime<Utc>,
}

impl Baseline {
    /// Compute per-feature statistics from a non-empty, rectangular sample set
    pub fn compute(names: &[String], samples: &[Vec<f64>]) -> Result<Self, DetectorError> {
        let first = samples.first().ok_or(DetectorError::InsufficientData)?;
        let dims = first.len();
        if dims == 0 {
            return Err(DetectorError::InsufficientData);
        }
        if !names.is_empty() && names.len() != dims {
            return Err(DetectorError::DimensionMismatch {
                expected: names.len(),
                actual: dims,
            });
        }

        for sample in samples {
            if sample.len() != dims {
                return Err(DetectorError::DimensionMismatch {
                    expected: dims,
                    actual: sample.len(),
                });
            }
            if sample.iter().any(|v| !v.is_finite()) {
                return Err(DetectorError::NonFinite);
            }
        }

        let n = samples.len() as f64;
        let features = (0..dims)
            .map(|i| {
                let mean = samples.iter().map(|s| s[i]).sum::<f64>() / n;
                let variance = samples.iter().map(|s| (s[i] - mean).powi(2)).sum::<f64>() / n;
                FeatureStats {
                    name: names
                        .get(i)
                        .cloned()
                        .unwrap_or_else(|| format!("feature_{}", i)),
                    mean,
                    std_dev: variance.sqrt(),
                }
            })
            .collect();

        Ok(Self {
            features,
            sample_count: samples.len(),
            fitted_at: Utc::now(),
        })
    }

    pub fn dimensions(&self) -> usize {
        self.features.len()
    }
}

/// Per-feature z-score detector with a max-over-features trigger
pub struct ZScoreDetector {
    threshold: f64,
    feature_names: Vec<String>,
    baseline: RwLock<Option<Arc<Baseline>>>,
}

impl ZScoreDetector {
    /// Create an unfitted detector
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            feature_names: Vec::new(),
            baseline: RwLock::new(None),
        }
    }

    /// Name the features for attribution in anomaly records
    pub fn with_feature_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.feature_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// The baseline currently in effect
    pub fn baseline(&self) -> Option<Arc<Baseline>> {
        self.baseline
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Default for ZScoreDetector {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl AnomalyScorer for ZScoreDetector {
    fn fit(&self, samples: &[Vec<f64>]) -> Result<(), DetectorError> {
        let baseline = Arc::new(Baseline::compute(&self.feature_names, samples)?);
        *self.baseline.write().unwrap_or_else(|e| e.into_inner()) = Some(baseline);
        Ok(())
    }

    fn detect(&self, sample: &FeatureVector) -> Result<Anomaly, DetectorError> {
        let baseline = self.baseline().ok_or(DetectorError::NotFitted)?;

        if sample.values.len() != baseline.dimensions() {
            return Err(DetectorError::DimensionMismatch {
                expected: baseline.dimensions(),
                actual: sample.values.len(),
            });
        }
        if sample.values.iter().any(|v| !v.is_finite()) {
            return Err(DetectorError::NonFinite);
        }

        let z_scores: Vec<FeatureScore> = baseline
            .features
            .iter()
            .zip(&sample.values)
            .map(|(stats, &value)| FeatureScore {
                feature: stats.name.clone(),
                value,
                z_score: stats.z_score(value),
            })
            .collect();

        Ok(Anomaly::from_scores(
            Utc::now(),
            sample.snapshot,
            z_scores,
            self.threshold,
        ))
    }

    fn is_fitted(&self) -> bool {
        self.baseline
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    fn threshold(&self) -> f64 {
        self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Snapshot;

    fn vector(values: &[f64]) -> FeatureVector {
        FeatureVector {
            snapshot: Snapshot::new(Utc::now()).reference(),
            values: values.to_vec(),
        }
    }

    /// 100 samples of cpu 40±2, memory 50±2
    fn baseline_samples() -> Vec<Vec<f64>> {
        let offsets = [-2.0, -1.0, 0.0, 1.0, 2.0];
        (0..100)
            .map(|i| {
                vec![
                    40.0 + offsets[i % 5],
                    50.0 + offsets[(i + 2) % 5],
                ]
            })
            .collect()
    }

    fn fitted_detector() -> ZScoreDetector {
        let detector = ZScoreDetector::new(2.0).with_feature_names(["cpu", "memory"]);
        detector.fit(&baseline_samples()).unwrap();
        detector
    }

    #[test]
    fn test_detect_before_fit_fails() {
        let detector = ZScoreDetector::default();
        assert!(!detector.is_fitted());
        assert_eq!(
            detector.detect(&vector(&[1.0, 2.0])),
            Err(DetectorError::NotFitted)
        );
    }

    #[test]
    fn test_fit_empty_fails() {
        let detector = ZScoreDetector::default();
        assert_eq!(detector.fit(&[]), Err(DetectorError::InsufficientData));
        assert!(!detector.is_fitted());
    }

    #[test]
    fn test_fit_ragged_samples_fails() {
        let detector = ZScoreDetector::default();
        let result = detector.fit(&[vec![1.0, 2.0], vec![1.0]]);
        assert_eq!(
            result,
            Err(DetectorError::DimensionMismatch {
                expected: 2,
                actual: 1
            })
        );
    }

    #[test]
    fn test_fit_names_must_match_dimensions() {
        let detector = ZScoreDetector::new(2.0).with_feature_names(["cpu"]);
        assert!(matches!(
            detector.fit(&[vec![1.0, 2.0]]),
            Err(DetectorError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_baseline_statistics() {
        let detector = fitted_detector();
        let baseline = detector.baseline().unwrap();

        assert_eq!(baseline.sample_count, 100);
        assert!((baseline.features[0].mean - 40.0).abs() < 1e-9);
        assert!((baseline.features[1].mean - 50.0).abs() < 1e-9);
        // Population std of {-2,-1,0,1,2} is sqrt(2)
        assert!((baseline.features[0].std_dev - 2f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_normal_sample_not_anomalous() {
        let detector = fitted_detector();
        let result = detector.detect(&vector(&[41.0, 51.0])).unwrap();

        assert!(!result.is_anomaly);
        assert_eq!(result.threshold, 2.0);
        assert_eq!(result.z_scores.len(), 2);
    }

    #[test]
    fn test_cpu_spike_is_anomalous_and_attributed() {
        let detector = fitted_detector();
        let result = detector.detect(&vector(&[90.0, 50.0])).unwrap();

        assert!(result.is_anomaly);
        let dominant = result.dominant().unwrap();
        assert_eq!(dominant.feature, "cpu");
        assert!(dominant.z_score > 30.0);
        assert!(result.z_scores[1].z_score < 1e-9);
    }

    #[test]
    fn test_zero_variance_feature_scores_zero() {
        let detector = ZScoreDetector::new(2.0).with_feature_names(["cpu", "disk"]);
        let samples: Vec<Vec<f64>> = (0..50).map(|i| vec![40.0 + (i % 3) as f64, 70.0]).collect();
        detector.fit(&samples).unwrap();

        for value in [70.0, 0.0, 1e9, -5.0] {
            let result = detector.detect(&vector(&[41.0, value])).unwrap();
            assert_eq!(result.z_scores[1].z_score, 0.0);
            assert!(result.z_scores.iter().all(|s| s.z_score.is_finite()));
            assert!(!result.is_anomaly);
        }
    }

    #[test]
    fn test_dimension_mismatch_on_detect() {
        let detector = fitted_detector();
        assert_eq!(
            detector.detect(&vector(&[40.0])),
            Err(DetectorError::DimensionMismatch {
                expected: 2,
                actual: 1
            })
        );
        assert!(detector.detect(&vector(&[40.0, 50.0, 60.0])).is_err());
    }

    #[test]
    fn test_non_finite_rejected() {
        let detector = fitted_detector();
        assert_eq!(
            detector.detect(&vector(&[f64::NAN, 50.0])),
            Err(DetectorError::NonFinite)
        );
    }

    #[test]
    fn test_refit_replaces_baseline() {
        let detector = fitted_detector();
        assert!(detector.detect(&vector(&[90.0, 50.0])).unwrap().is_anomaly);

        let shifted: Vec<Vec<f64>> = baseline_samples()
            .into_iter()
            .map(|s| vec![s[0] + 50.0, s[1]])
            .collect();
        detector.fit(&shifted).unwrap();

        assert!(!detector.detect(&vector(&[90.0, 50.0])).unwrap().is_anomaly);
        assert!(detector.detect(&vector(&[40.0, 50.0])).unwrap().is_anomaly);
    }

    #[test]
    fn test_failed_refit_keeps_previous_baseline() {
        let detector = fitted_detector();
        let before = detector.baseline().unwrap();

        assert!(detector.fit(&[]).is_err());
        assert_eq!(detector.baseline().unwrap(), before);
    }

    #[test]
    fn test_concurrent_detect_during_refit_is_consistent() {
        let detector = Arc::new(ZScoreDetector::new(2.0));
        let low: Vec<Vec<f64>> = (0..10).map(|i| vec![(i % 2) as f64, (i % 2) as f64]).collect();
        let high: Vec<Vec<f64>> = low.iter().map(|s| vec![s[0] + 100.0, s[1] + 100.0]).collect();
        detector.fit(&low).unwrap();

        let writer = {
            let detector = detector.clone();
            std::thread::spawn(move || {
                for i in 0..500 {
                    let samples = if i % 2 == 0 { &high } else { &low };
                    detector.fit(samples).unwrap();
                }
            })
        };

        // Both features always shift together, so their z-scores must match
        for _ in 0..2000 {
            let result = detector.detect(&vector(&[50.0, 50.0])).unwrap();
            assert_eq!(result.z_scores[0].z_score, result.z_scores[1].z_score);
        }
        writer.join().unwrap();
    }
}
