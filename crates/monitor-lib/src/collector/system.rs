//! Host sampler backed by `sysinfo`
//!
//! CPU usage is computed by sysinfo from the delta between two refreshes, so
//! the first sample after construction reflects the priming refresh done in
//! `new`. Disk figures aggregate all mounted disks; network counters are
//! cumulative totals over all interfaces.

use super::Sampler;
use crate::error::CollectionError;
use crate::models::{metric_names, Snapshot};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::{Arc, Mutex};
use sysinfo::{Disks, Networks, System};

/// Samples CPU, memory, swap, disk and network usage of the local host
pub struct SystemSampler {
    system: Arc<Mutex<System>>,
}

impl SystemSampler {
    pub fn new() -> Self {
        let mut system = System::new();
        // Prime CPU counters so the first real sample has a delta
        system.refresh_cpu_usage();
        system.refresh_memory();

        Self {
            system: Arc::new(Mutex::new(system)),
        }
    }

    fn read(system: &Mutex<System>) -> Result<Snapshot, CollectionError> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(CollectionError::Unavailable(
                "sysinfo does not support this platform".to_string(),
            ));
        }

        let mut system = system
            .lock()
            .map_err(|_| CollectionError::Other("system handle poisoned".to_string()))?;
        system.refresh_cpu_usage();
        system.refresh_memory();

        let total_memory = system.total_memory();
        if total_memory == 0 {
            return Err(CollectionError::Unavailable(
                "platform reported zero total memory".to_string(),
            ));
        }
        let used_memory = system.used_memory();
        let total_swap = system.total_swap();

        let disks = Disks::new_with_refreshed_list();
        let (disk_total, disk_available) = disks
            .list()
            .iter()
            .fold((0u64, 0u64), |(total, avail), disk| {
                (total + disk.total_space(), avail + disk.available_space())
            });
        let disk_used = disk_total.saturating_sub(disk_available);

        let networks = Networks::new_with_refreshed_list();
        let (sent, recv, packets_sent, packets_recv) = networks.list().values().fold(
            (0u64, 0u64, 0u64, 0u64),
            |(s, r, ps, pr), data| {
                (
                    s + data.total_transmitted(),
                    r + data.total_received(),
                    ps + data.total_packets_transmitted(),
                    pr + data.total_packets_received(),
                )
            },
        );

        Ok(Snapshot::new(Utc::now())
            .with_metric(metric_names::CPU_PERCENT, system.global_cpu_usage() as f64)
            .with_metric(
                metric_names::MEMORY_PERCENT,
                percent(used_memory, total_memory),
            )
            .with_metric(metric_names::DISK_PERCENT, percent(disk_used, disk_total))
            .with_metric(
                metric_names::SWAP_PERCENT,
                percent(system.used_swap(), total_swap),
            )
            .with_metric(metric_names::MEMORY_USED_BYTES, used_memory as f64)
            .with_metric(
                metric_names::MEMORY_AVAILABLE_BYTES,
                system.available_memory() as f64,
            )
            .with_metric(metric_names::DISK_USED_BYTES, disk_used as f64)
            .with_metric(metric_names::DISK_TOTAL_BYTES, disk_total as f64)
            .with_metric(metric_names::NETWORK_BYTES_SENT, sent as f64)
            .with_metric(metric_names::NETWORK_BYTES_RECV, recv as f64)
            .with_metric(metric_names::NETWORK_PACKETS_SENT, packets_sent as f64)
            .with_metric(metric_names::NETWORK_PACKETS_RECV, packets_recv as f64)
            .with_metric(metric_names::CPU_COUNT, system.cpus().len() as f64)
            .with_metric(
                metric_names::LOAD_AVERAGE_1M,
                System::load_average().one,
            ))
    }
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sampler for SystemSampler {
    async fn sample(&self) -> Result<Snapshot, CollectionError> {
        let system = self.system.clone();
        tokio::task::spawn_blocking(move || Self::read(&system))
            .await
            .map_err(|e| CollectionError::Other(format!("sampling task failed: {}", e)))?
    }
}

fn percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    used as f64 / total as f64 * 100.0
}
