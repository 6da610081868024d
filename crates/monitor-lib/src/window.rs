//! Time-bounded rolling window of snapshots
//!
//! Entries are kept in timestamp order in a deque; pruning pops from the
//! front, so append and prune are O(1) amortized over a non-decreasing
//! stream. The processing loop is the only writer. Readers go through
//! [`WindowReader`], which exposes no mutation.

use crate::models::Snapshot;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tracing::warn;

/// Default retention (1 hour)
pub const DEFAULT_WINDOW_DURATION: Duration = Duration::from_secs(60 * 60);

/// Ordered trailing buffer of snapshots
#[derive(Debug, Clone)]
pub struct RollingWindow {
    entries: VecDeque<Snapshot>,
    duration: Duration,
    out_of_order: u64,
}

impl RollingWindow {
    pub fn new(duration: Duration) -> Self {
        Self {
            entries: VecDeque::new(),
            duration,
            out_of_order: 0,
        }
    }

    /// Append a snapshot; an out-of-order snapshot is dropped and `false` returned
    pub fn append(&mut self, snapshot: Snapshot) -> bool {
        if let Some(last) = self.entries.back() {
            if snapshot.timestamp < last.timestamp {
                self.out_of_order += 1;
                warn!(
                    seq = snapshot.seq,
                    timestamp = %snapshot.timestamp,
                    newest = %last.timestamp,
                    "Dropping out-of-order snapshot"
                );
                return false;
            }
        }

        self.entries.push_back(snapshot);
        true
    }

    /// Remove entries older than the window duration, returning how many were removed
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let Some(cutoff) = chrono::Duration::from_std(self.duration)
            .ok()
            .and_then(|d| now.checked_sub_signed(d))
        else {
            return 0;
        };

        let mut removed = 0;
        while let Some(front) = self.entries.front() {
            if front.timestamp < cutoff {
                self.entries.pop_front();
                removed += 1;
            } else {
                break;
            }
        }
        removed
    }

    /// The last `k` snapshots in time order (fewer if history is short)
    pub fn recent(&self, k: usize) -> Vec<Snapshot> {
        let skip = self.entries.len().saturating_sub(k);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Snapshot> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Snapshots dropped for arriving out of order
    pub fn out_of_order_count(&self) -> u64 {
        self.out_of_order
    }
}

impl Default for RollingWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_DURATION)
    }
}

/// Window shared between the processing loop (writer) and dashboard readers
#[derive(Debug, Clone)]
pub struct SharedWindow {
    inner: Arc<RwLock<RollingWindow>>,
}

impl SharedWindow {
    pub fn new(duration: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(RollingWindow::new(duration))),
        }
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, RollingWindow> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn reader(&self) -> WindowReader {
        WindowReader {
            inner: self.inner.clone(),
        }
    }
}

/// Read-only view of the live window
#[derive(Debug, Clone)]
pub struct WindowReader {
    inner: Arc<RwLock<RollingWindow>>,
}

impl WindowReader {
    fn read(&self) -> RwLockReadGuard<'_, RollingWindow> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn recent(&self, k: usize) -> Vec<Snapshot> {
        self.read().recent(k)
    }

    pub fn snapshots(&self) -> Vec<Snapshot> {
        self.read().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
