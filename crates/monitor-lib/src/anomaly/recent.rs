//! Bounded buffer of recently raised anomalies
//!
//! Written by the processing loop, read by the dashboard. FIFO eviction
//! once the capacity is reached.

use crate::models::Anomaly;
use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

/// Default number of anomalies retained
pub const DEFAULT_RECENT_CAPACITY: usize = 100;

#[derive(Debug, Clone)]
pub struct RecentAnomalies {
    entries: Arc<RwLock<VecDeque<Anomaly>>>,
    capacity: usize,
}

impl RecentAnomalies {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Arc::new(RwLock::new(VecDeque::with_capacity(capacity.min(1024)))),
            capacity,
        }
    }

    pub fn push(&self, anomaly: Anomaly) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(anomaly);
    }

    /// All retained anomalies, oldest first
    pub fn list(&self) -> Vec<Anomaly> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for RecentAnomalies {
    fn default() -> Self {
        Self::new(DEFAULT_RECENT_CAPACITY)
    }
}
