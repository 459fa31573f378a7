//! Feature schema and per-tick aggregation.

pub mod aggregator;
pub mod layout;
pub mod vector;

pub use aggregator::{FeatureAggregator, ProcessInfo, SystemMetrics, TickFeatures};
pub use layout::{FEATURE_COUNT, FEATURE_VERSION};
pub use vector::FeatureVector;
