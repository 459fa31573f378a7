//! System totals collector backed by sysinfo.

use chrono::Utc;
use sysinfo::System;

use super::{SystemSampler, SystemSnapshot};
use crate::error::DetectorError;

/// Samples host-wide CPU, memory, and cumulative disk byte counters.
///
/// sysinfo only exposes disk I/O per process, so the system-wide counters
/// are the sum of every visible process's cumulative usage. That sum is
/// monotonic for live processes but can drop when a heavy writer exits;
/// the aggregator clamps negative deltas to zero.
pub struct SystemCollector {
    sys: System,
    last_known: Option<SystemSnapshot>,
}

impl SystemCollector {
    pub fn new() -> Self {
        let mut sys = System::new_all();
        sys.refresh_all();
        Self {
            sys,
            last_known: None,
        }
    }
}

impl Default for SystemCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemSampler for SystemCollector {
    fn sample(&mut self) -> Result<SystemSnapshot, DetectorError> {
        self.sys.refresh_cpu();
        self.sys.refresh_memory();
        self.sys.refresh_processes();

        let total_memory = self.sys.total_memory();
        if total_memory == 0 {
            // OS query came back empty; reuse the previous snapshot so the
            // tick survives instead of aborting.
            if let Some(last) = &self.last_known {
                log::warn!("system metrics unavailable, reusing last known snapshot");
                return Ok(SystemSnapshot {
                    timestamp: Utc::now(),
                    ..last.clone()
                });
            }
            return Err(DetectorError::CollectorUnavailable(
                "system metrics unavailable and no previous snapshot".into(),
            ));
        }

        let memory_percent = self.sys.used_memory() as f64 / total_memory as f64 * 100.0;
        let cpu_percent = self.sys.global_cpu_info().cpu_usage() as f64;

        let mut disk_read_bytes = 0u64;
        let mut disk_write_bytes = 0u64;
        for process in self.sys.processes().values() {
            let usage = process.disk_usage();
            disk_read_bytes = disk_read_bytes.saturating_add(usage.total_read_bytes);
            disk_write_bytes = disk_write_bytes.saturating_add(usage.total_written_bytes);
        }

        let snapshot = SystemSnapshot {
            cpu_percent,
            memory_percent,
            disk_read_bytes,
            disk_write_bytes,
            timestamp: Utc::now(),
        };
        self.last_known = Some(snapshot.clone());
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_yields_plausible_values() {
        let mut collector = SystemCollector::new();
        let snapshot = collector.sample().expect("live host should sample");

        assert!(snapshot.cpu_percent >= 0.0);
        assert!(snapshot.memory_percent > 0.0 && snapshot.memory_percent <= 100.0);
    }

    #[test]
    fn test_counters_do_not_explode_between_samples() {
        let mut collector = SystemCollector::new();
        let first = collector.sample().unwrap();
        let second = collector.sample().unwrap();

        assert!(second.timestamp >= first.timestamp);
    }
}
