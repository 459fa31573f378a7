//! Per-tick feature aggregation.
//!
//! Turns the three raw collector snapshots into one fixed-shape
//! `FeatureVector`, the user-facing `SystemMetrics`, and the ranked
//! suspicious-process list. Owns the previous system snapshot explicitly so
//! cumulative-counter-to-rate conversion has no hidden state.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::collectors::{FileActivity, FileEventKind, ProcessSample, SystemSnapshot};
use crate::config::{KnownProcesses, SuspicionWeights};
use crate::features::vector::FeatureVector;
use crate::thresholds::HostThresholds;

/// Host metrics snapshot carried on every `DetectionResult`. Rates are 0.0
/// on the first tick (no previous counter to diff against) and never
/// negative afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_read_bytes: u64,
    pub disk_write_bytes: u64,
    pub disk_read_rate: f64,
    pub disk_write_rate: f64,
    pub timestamp: DateTime<Utc>,
}

/// A process with its per-tick composite suspicion score. Rebuilt every
/// tick; never assume the same PID refers to the same process later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    pub cpu_percent: f32,
    pub io_rate: f64,
    /// File events attributed to this PID within the tick.
    pub file_writes: u32,
    pub user: Option<String>,
    pub suspicion: f64,
}

/// Everything the aggregator produces for one tick.
#[derive(Debug, Clone)]
pub struct TickFeatures {
    pub vector: FeatureVector,
    pub metrics: SystemMetrics,
    /// Descending by suspicion, at most `top_n` entries, zero-score
    /// processes dropped.
    pub suspicious_processes: Vec<ProcessInfo>,
}

pub struct FeatureAggregator {
    thresholds: HostThresholds,
    weights: SuspicionWeights,
    known: KnownProcesses,
    top_n: usize,
    prev: Option<SystemSnapshot>,
    /// Last computed (read, write) rates, reused when elapsed time is
    /// zero or negative (clock skew between snapshots).
    prev_rates: (f64, f64),
}

impl FeatureAggregator {
    pub fn new(
        thresholds: HostThresholds,
        weights: SuspicionWeights,
        known: KnownProcesses,
        top_n: usize,
    ) -> Self {
        Self {
            thresholds,
            weights,
            known,
            top_n,
            prev: None,
            prev_rates: (0.0, 0.0),
        }
    }

    /// Forget the previous snapshot, e.g. when detection restarts after a
    /// long gap and a stale diff would produce a misleading rate.
    pub fn reset(&mut self) {
        self.prev = None;
        self.prev_rates = (0.0, 0.0);
    }

    pub fn aggregate(
        &mut self,
        system: SystemSnapshot,
        processes: Vec<ProcessSample>,
        files: Vec<FileActivity>,
    ) -> TickFeatures {
        let (read_rate, write_rate) = self.compute_rates(&system);

        // File events per kind within the tick window.
        let mut created = 0u32;
        let mut modified = 0u32;
        let mut deleted = 0u32;
        let mut renamed = 0u32;
        let mut writes_by_pid: HashMap<u32, u32> = HashMap::new();
        for event in &files {
            match event.kind {
                FileEventKind::Created => created += 1,
                FileEventKind::Modified => modified += 1,
                FileEventKind::Deleted => deleted += 1,
                FileEventKind::Renamed => renamed += 1,
            }
            if let Some(pid) = event.pid {
                *writes_by_pid.entry(pid).or_insert(0) += 1;
            }
        }

        let high_cpu_count = processes
            .iter()
            .filter(|p| p.cpu_percent as f64 > self.thresholds.high_cpu_process_pct)
            .count();
        let total_process_io: f64 = processes.iter().map(|p| p.io_rate).sum();

        let suspicious_processes = self.rank_processes(processes, &writes_by_pid);

        let vector = FeatureVector::from_values([
            system.cpu_percent,
            system.memory_percent,
            read_rate,
            write_rate,
            created as f64,
            modified as f64,
            deleted as f64,
            renamed as f64,
            high_cpu_count as f64,
            total_process_io,
        ]);

        let metrics = SystemMetrics {
            cpu_percent: system.cpu_percent,
            memory_percent: system.memory_percent,
            disk_read_bytes: system.disk_read_bytes,
            disk_write_bytes: system.disk_write_bytes,
            disk_read_rate: read_rate,
            disk_write_rate: write_rate,
            timestamp: system.timestamp,
        };

        self.prev = Some(system);
        self.prev_rates = (read_rate, write_rate);

        TickFeatures {
            vector,
            metrics,
            suspicious_processes,
        }
    }

    /// Rates from consecutive cumulative counters. Counter resets (current
    /// below previous) clamp to zero; non-positive elapsed time reuses the
    /// previous rates instead of dividing by garbage.
    fn compute_rates(&self, current: &SystemSnapshot) -> (f64, f64) {
        let prev = match &self.prev {
            Some(p) => p,
            None => return (0.0, 0.0),
        };

        let elapsed = (current.timestamp - prev.timestamp)
            .num_milliseconds() as f64
            / 1000.0;
        if elapsed <= 0.0 {
            log::warn!("non-positive elapsed time between snapshots, reusing previous rates");
            return self.prev_rates;
        }

        let read_delta = current.disk_read_bytes.saturating_sub(prev.disk_read_bytes);
        let write_delta = current
            .disk_write_bytes
            .saturating_sub(prev.disk_write_bytes);

        (read_delta as f64 / elapsed, write_delta as f64 / elapsed)
    }

    /// Composite suspicion score: weighted CPU + I/O rate + attributed file
    /// events, each normalized against the host thresholds. Computed every
    /// tick regardless of the anomaly verdict. Known system processes never
    /// enter the ranking; an active browser relaxes the CPU normalization
    /// for everyone and browsers themselves are skipped unless their CPU
    /// climbs well past even the relaxed mark.
    fn rank_processes(
        &self,
        processes: Vec<ProcessSample>,
        writes_by_pid: &HashMap<u32, u32>,
    ) -> Vec<ProcessInfo> {
        let browser_active = processes.iter().any(|p| self.known.is_browser(&p.name));
        let high_cpu_pct = if browser_active {
            self.thresholds.high_cpu_process_pct * 1.2
        } else {
            self.thresholds.high_cpu_process_pct
        };

        let mut ranked: Vec<ProcessInfo> = processes
            .into_iter()
            .filter(|p| !self.known.is_system(&p.name))
            .filter(|p| {
                !self.known.is_browser(&p.name) || p.cpu_percent as f64 > high_cpu_pct * 1.5
            })
            .map(|p| {
                let file_writes = writes_by_pid.get(&p.pid).copied().unwrap_or(0);
                let cpu_norm = p.cpu_percent as f64 / high_cpu_pct;
                let io_norm = p.io_rate / self.thresholds.io_rate_scale;
                let suspicion = self.weights.cpu * cpu_norm
                    + self.weights.io * io_norm
                    + self.weights.file_writes * file_writes as f64;

                ProcessInfo {
                    pid: p.pid,
                    name: p.name,
                    cpu_percent: p.cpu_percent,
                    io_rate: p.io_rate,
                    file_writes,
                    user: p.user,
                    suspicion,
                }
            })
            .filter(|p| p.suspicion > 0.0)
            .collect();

        ranked.sort_by(|a, b| {
            b.suspicion
                .partial_cmp(&a.suspicion)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked.truncate(self.top_n);
        ranked
    }
}
