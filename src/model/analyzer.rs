//! Online scoring against a trained baseline.

use serde::{Deserialize, Serialize};

use crate::error::DetectorError;
use crate::features::FeatureVector;
use crate::model::trainer::TrainedModel;
use crate::thresholds::HostThresholds;

/// One scored tick.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoreOutcome {
    /// Raw forest score in (-1, 0]; more negative is more anomalous.
    pub score: f64,
    pub is_anomaly: bool,
    /// True when the score crossed the boundary but every raw activity
    /// signal sat below the host's noise floors, so the verdict was
    /// withheld. Statistical outliers on a near-idle host are scaler
    /// artifacts, not encryption bursts.
    pub suppressed: bool,
}

pub struct OnlineAnalyzer {
    model: TrainedModel,
    thresholds: HostThresholds,
}

impl OnlineAnalyzer {
    pub fn new(model: TrainedModel, thresholds: HostThresholds) -> Result<Self, DetectorError> {
        model.validate_schema()?;
        Ok(Self { model, thresholds })
    }

    pub fn model(&self) -> &TrainedModel {
        &self.model
    }

    pub fn score(&self, vector: &FeatureVector) -> Result<ScoreOutcome, DetectorError> {
        vector.validate()?;

        let scaled = self.model.scaler.transform(vector.as_slice());
        let score = self.model.forest.score_sample(&scaled);
        let crossed = score < self.model.score_offset;

        if crossed && self.is_near_idle(vector) {
            log::debug!(
                "anomaly score {:.4} below offset {:.4} suppressed: activity under noise floor",
                score,
                self.model.score_offset
            );
            return Ok(ScoreOutcome {
                score,
                is_anomaly: false,
                suppressed: true,
            });
        }

        Ok(ScoreOutcome {
            score,
            is_anomaly: crossed,
            suppressed: false,
        })
    }

    /// All raw activity signals below the host floors.
    fn is_near_idle(&self, vector: &FeatureVector) -> bool {
        let read = vector.get_by_name("disk_read_rate").unwrap_or(0.0);
        let write = vector.get_by_name("disk_write_rate").unwrap_or(0.0);
        let file_events = ["file_created", "file_modified", "file_deleted", "file_renamed"]
            .iter()
            .map(|n| vector.get_by_name(n).unwrap_or(0.0))
            .sum::<f64>();

        read < self.thresholds.disk_read_floor
            && write < self.thresholds.disk_write_floor
            && file_events < self.thresholds.file_event_floor
    }
}
