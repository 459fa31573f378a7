//! Host-capacity-relative threshold policy.
//!
//! Probed once at startup and passed read-only into the aggregator and the
//! analyzer. The same raw value ("50 MB/s of writes") means different
//! things on a 2-core laptop and a 32-core server, so every absolute
//! threshold below scales with host capacity.

use serde::{Deserialize, Serialize};
use sysinfo::System;

/// Per-process CPU percent considered high, before capacity scaling.
const BASE_HIGH_CPU_PROCESS_PCT: f64 = 85.0;

/// Per-process I/O rate (bytes/sec) treated as the top of the normal range
/// on a 4-core reference host.
const BASE_IO_RATE_SCALE: f64 = 50.0 * 1024.0 * 1024.0;

/// Disk rate floors (bytes/sec) on the reference host. Below these, a
/// statistically anomalous tick is suppressed as near-idle noise.
const BASE_READ_FLOOR: f64 = 4.0 * 1024.0 * 1024.0;
const BASE_WRITE_FLOOR: f64 = 2.0 * 1024.0 * 1024.0;

/// File events per tick below which the host counts as near-idle.
const BASE_FILE_EVENT_FLOOR: f64 = 20.0;

/// Immutable snapshot of the host-derived decision parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostThresholds {
    pub cpu_cores: usize,
    pub total_memory_bytes: u64,

    /// Per-process CPU percent above which a process counts toward the
    /// `high_cpu_process_count` feature.
    pub high_cpu_process_pct: f64,

    /// Normalization divisor for per-process I/O in the suspicion score.
    pub io_rate_scale: f64,

    /// Absolute noise floors consumed by the analyzer: anomaly verdicts
    /// are suppressed while all raw activity sits below these.
    pub disk_read_floor: f64,
    pub disk_write_floor: f64,
    pub file_event_floor: f64,
}

impl HostThresholds {
    /// Inspect the running host once and derive its thresholds.
    pub fn probe() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu();
        sys.refresh_memory();

        let cores = sys.cpus().len().max(1);
        let total_memory = sys.total_memory();

        let thresholds = Self::from_capacity(cores, total_memory);
        log::info!(
            "host thresholds: {} cores, {:.1} GiB RAM, write floor {:.1} MiB/s",
            thresholds.cpu_cores,
            thresholds.total_memory_bytes as f64 / (1024.0 * 1024.0 * 1024.0),
            thresholds.disk_write_floor / (1024.0 * 1024.0),
        );
        thresholds
    }

    /// Derive thresholds for a given capacity. Scaling is linear in core
    /// count relative to a 4-core reference host, clamped to [0.5, 4.0] so
    /// extreme machines do not push the floors into useless territory.
    pub fn from_capacity(cpu_cores: usize, total_memory_bytes: u64) -> Self {
        let cores = cpu_cores.max(1);
        let scale = (cores as f64 / 4.0).clamp(0.5, 4.0);

        Self {
            cpu_cores: cores,
            total_memory_bytes,
            high_cpu_process_pct: BASE_HIGH_CPU_PROCESS_PCT,
            io_rate_scale: BASE_IO_RATE_SCALE * scale,
            disk_read_floor: BASE_READ_FLOOR * scale,
            disk_write_floor: BASE_WRITE_FLOOR * scale,
            file_event_floor: BASE_FILE_EVENT_FLOOR * scale,
        }
    }
}
