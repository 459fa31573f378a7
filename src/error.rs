//! Crate-wide error taxonomy.
//!
//! Transient errors (`CollectorUnavailable`) are recovered locally by the
//! detection loop; everything else means the pipeline or model is unusable
//! and is surfaced to the caller immediately.

use thiserror::Error;

use crate::features::layout::LayoutMismatchError;

#[derive(Debug, Error)]
pub enum DetectorError {
    /// A collector could not produce a fresh snapshot this tick. Recovered
    /// by reusing the last known value or retrying after a short backoff.
    #[error("collector unavailable: {0}")]
    CollectorUnavailable(String),

    /// The training window produced too few samples to fit a model. Fatal
    /// for the training attempt; the detector returns to `Idle`.
    #[error("insufficient training data: collected {collected} samples, need at least {required}")]
    InsufficientData { collected: usize, required: usize },

    /// `detect()` was called before a trained model exists. Sequencing
    /// error on the caller's side.
    #[error("no trained model: call train() or load a saved baseline before detect()")]
    ModelNotTrained,

    /// The per-tick retry budget was exhausted. The detector transitions to
    /// `Stopped` and will not accept further `detect()` calls.
    #[error("detection aborted after {failures} consecutive tick failures: {last_error}")]
    ConsecutiveTickFailure { failures: u32, last_error: String },

    /// A feature vector or persisted model was produced under a different
    /// feature schema than the one compiled into this binary.
    #[error("feature schema mismatch: {0}")]
    SchemaMismatch(#[from] LayoutMismatchError),

    /// The detector is in `Stopped` and no longer processes ticks.
    #[error("detector is stopped")]
    Stopped,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("model serialization error: {0}")]
    ModelFormat(#[from] serde_json::Error),
}
