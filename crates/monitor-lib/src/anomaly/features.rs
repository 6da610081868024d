//! Feature extraction from snapshots
//!
//! Maps a snapshot's open set of metrics onto the ordered feature vector the
//! detector was fitted with.

use crate::error::DetectorError;
use crate::models::{metric_names, FeatureVector, Snapshot};

/// Selects detector features from snapshots by name
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureExtractor {
    features: Vec<String>,
}

impl FeatureExtractor {
    pub fn new<I, S>(features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            features: features.into_iter().map(Into::into).collect(),
        }
    }

    pub fn feature_names(&self) -> &[String] {
        &self.features
    }

    pub fn dimensions(&self) -> usize {
        self.features.len()
    }

    /// Extract the configured features, failing on the first missing one
    pub fn extract(&self, snapshot: &Snapshot) -> Result<FeatureVector, DetectorError> {
        let values = self
            .features
            .iter()
            .map(|name| {
                snapshot
                    .get(name)
                    .ok_or_else(|| DetectorError::MissingFeature(name.clone()))
            })
            .collect::<Result<Vec<f64>, _>>()?;

        Ok(FeatureVector {
            snapshot: snapshot.reference(),
            values,
        })
    }

    /// Build a fitting set from a run of snapshots, skipping incomplete ones
    pub fn fitting_set<'a, I>(&self, snapshots: I) -> Vec<Vec<f64>>
    where
        I: IntoIterator<Item = &'a Snapshot>,
    {
        snapshots
            .into_iter()
            .filter_map(|s| self.extract(s).ok())
            .map(|fv| fv.values)
            .collect()
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new([
            metric_names::CPU_PERCENT,
            metric_names::MEMORY_PERCENT,
            metric_names::DISK_PERCENT,
        ])
    }
}
