//! Raw OS collectors.
//!
//! Three independent collectors sample disjoint OS state once per tick:
//! system totals, per-process activity, and filesystem events. Each returns
//! a plain snapshot; missing values are sentinels (zero / `None`), never
//! panics. Rate derivation from the cumulative counters happens downstream
//! in the aggregator, which owns the previous-snapshot state.

pub mod files;
pub mod process;
pub mod system;

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DetectorError;

pub use files::FileActivityCollector;
pub use process::ProcessCollector;
pub use system::SystemCollector;

/// Point-in-time system totals. Disk byte counters are cumulative since
/// collector start; they only ever grow (resets are handled downstream).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemSnapshot {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_read_bytes: u64,
    pub disk_write_bytes: u64,
    pub timestamp: DateTime<Utc>,
}

/// One process as seen this tick. PIDs are opaque keys: a PID may vanish
/// or be reused between ticks, so nothing here is a stable identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessSample {
    pub pid: u32,
    pub name: String,
    pub cpu_percent: f32,
    /// Combined read+write bytes/sec since the previous sample.
    pub io_rate: f64,
    pub user: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileEventKind {
    Created,
    Modified,
    Deleted,
    Renamed,
}

/// A discrete filesystem event observed within the tick window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileActivity {
    pub path: PathBuf,
    pub kind: FileEventKind,
    pub size: u64,
    /// PID attributed to the change when resolvable; usually unknown from
    /// a filesystem watcher.
    pub pid: Option<u32>,
    pub timestamp: DateTime<Utc>,
}

/// System totals source.
pub trait SystemSampler: Send {
    fn sample(&mut self) -> Result<SystemSnapshot, DetectorError>;
}

/// Per-process activity source.
pub trait ProcessSampler: Send {
    fn sample(&mut self) -> Result<Vec<ProcessSample>, DetectorError>;
}

/// Filesystem event source. `drain` hands over everything buffered since
/// the previous call; it cannot fail (an unhealthy watcher just yields
/// nothing).
pub trait FileActivitySampler: Send {
    fn drain(&mut self) -> Vec<FileActivity>;
}
