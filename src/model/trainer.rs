//! Baseline training.

use chrono::{DateTime, Utc};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DetectorError;
use crate::features::layout::{layout_hash, FEATURE_COUNT, FEATURE_VERSION};
use crate::features::FeatureVector;
use crate::model::forest::IsolationForest;
use crate::model::scaler::StandardScaler;

/// Fewest training samples a fit will accept. Below this the forest's path
/// lengths carry no signal.
pub const MIN_TRAINING_SAMPLES: usize = 16;

/// A fitted baseline, self-describing enough to be persisted and reloaded:
/// it carries the feature schema it was fitted under plus the score
/// calibration taken from its own training window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedModel {
    pub id: Uuid,
    pub trained_at: DateTime<Utc>,
    pub feature_version: u8,
    pub layout_hash: u32,
    pub sample_count: usize,
    pub scaler: StandardScaler,
    pub forest: IsolationForest,
    /// Decision boundary: the contamination-quantile of the training
    /// scores. Live scores below this are anomalies.
    pub score_offset: f64,
    pub score_mean: f64,
    pub score_std: f64,
}

impl TrainedModel {
    /// Refuse models fitted under a different feature schema than the one
    /// compiled into this binary.
    pub fn validate_schema(&self) -> Result<(), DetectorError> {
        crate::features::layout::validate_layout(self.feature_version, self.layout_hash)?;
        Ok(())
    }
}

pub struct BaselineTrainer {
    contamination: f64,
    seed: Option<u64>,
}

impl BaselineTrainer {
    pub fn new(contamination: f64, seed: Option<u64>) -> Self {
        Self {
            contamination,
            seed,
        }
    }

    /// Fit scaler and forest on the collected window, then calibrate the
    /// decision offset against the window's own score distribution.
    pub fn fit(&self, samples: &[FeatureVector]) -> Result<TrainedModel, DetectorError> {
        if samples.len() < MIN_TRAINING_SAMPLES {
            return Err(DetectorError::InsufficientData {
                collected: samples.len(),
                required: MIN_TRAINING_SAMPLES,
            });
        }
        for sample in samples {
            sample.validate()?;
        }

        let mut flat = Vec::with_capacity(samples.len() * FEATURE_COUNT);
        for sample in samples {
            flat.extend_from_slice(sample.as_slice());
        }
        let data = Array2::from_shape_vec((samples.len(), FEATURE_COUNT), flat)
            .map_err(|e| DetectorError::InvalidConfig(format!("bad training matrix: {}", e)))?;

        let scaler = StandardScaler::fit(&data);
        let scaled = scaler.transform_matrix(&data);

        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let forest = IsolationForest::fit(&scaled, &mut rng);

        // Score the training window itself to place the boundary.
        let mut scores: Vec<f64> = scaled
            .rows()
            .into_iter()
            .map(|row| forest.score_sample(row.as_slice().unwrap_or(&[])))
            .collect();

        let n = scores.len() as f64;
        let score_mean = scores.iter().sum::<f64>() / n;
        let score_std = (scores.iter().map(|s| (s - score_mean).powi(2)).sum::<f64>() / n).sqrt();

        scores.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let quantile_idx =
            ((self.contamination * scores.len() as f64).floor() as usize).min(scores.len() - 1);
        let score_offset = scores[quantile_idx];

        let model = TrainedModel {
            id: Uuid::new_v4(),
            trained_at: Utc::now(),
            feature_version: FEATURE_VERSION,
            layout_hash: layout_hash(),
            sample_count: samples.len(),
            scaler,
            forest,
            score_offset,
            score_mean,
            score_std,
        };
        log::info!(
            "baseline fitted: {} samples, {} trees, offset {:.4}, mean {:.4}",
            model.sample_count,
            model.forest.n_trees(),
            model.score_offset,
            model.score_mean,
        );
        Ok(model)
    }
}
