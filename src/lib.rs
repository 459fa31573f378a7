//! RansomGuard - behavioral ransomware detection.
//!
//! Watches a host for the behavioral fingerprint of encryption-style mass
//! file mutation: disk-write bursts, CPU/memory pressure, rapid file churn.
//! No malware signatures; an isolation forest trained on an unlabeled
//! baseline window flags statistical outliers in a fixed feature schema.
//!
//! Pipeline (one direction only):
//! collectors -> aggregator (+ host thresholds) -> trainer | analyzer ->
//! detector -> caller.

pub mod collectors;
pub mod config;
pub mod detector;
pub mod error;
pub mod features;
pub mod model;
pub mod storage;
pub mod thresholds;

pub use config::{DetectorConfig, SuspicionWeights};
pub use detector::{DetectionResult, DetectorState, RansomwareDetector, TrainingReport};
pub use error::DetectorError;
pub use thresholds::HostThresholds;
