//! Read accessors for dashboards and the HTTP API

use crate::anomaly::RecentAnomalies;
use crate::models::{Anomaly, Snapshot};
use crate::window::WindowReader;

/// Read-only view over the live window and the recent anomaly list
#[derive(Debug, Clone)]
pub struct DashboardView {
    window: WindowReader,
    anomalies: RecentAnomalies,
}

impl DashboardView {
    pub fn new(window: WindowReader, anomalies: RecentAnomalies) -> Self {
        Self { window, anomalies }
    }

    /// Every snapshot currently in the window, oldest first
    pub fn recent_metrics(&self) -> Vec<Snapshot> {
        self.window.snapshots()
    }

    /// The last `limit` snapshots in the window, oldest first
    pub fn recent_metrics_limited(&self, limit: usize) -> Vec<Snapshot> {
        self.window.recent(limit)
    }

    /// Anomalies raised recently, oldest first
    pub fn recent_anomalies(&self) -> Vec<Anomaly> {
        self.anomalies.list()
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }
}
