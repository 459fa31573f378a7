//! Baseline model: standardization, isolation forest, training, scoring.

pub mod analyzer;
pub mod forest;
pub mod scaler;
pub mod trainer;

pub use analyzer::{OnlineAnalyzer, ScoreOutcome};
pub use forest::IsolationForest;
pub use scaler::StandardScaler;
pub use trainer::{BaselineTrainer, TrainedModel, MIN_TRAINING_SAMPLES};
