//! On-disk persistence: the latest trained model plus daily jsonl logs of
//! training samples and detection results.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use chrono::Utc;

use crate::detector::DetectionResult;
use crate::error::DetectorError;
use crate::features::FeatureVector;
use crate::model::TrainedModel;

const MODEL_FILE: &str = "model_latest.json";

/// Persistence seam. The detector only depends on this trait so tests can
/// run against an in-memory stand-in.
pub trait Storage: Send {
    fn save_model(&self, model: &TrainedModel) -> Result<(), DetectorError>;
    /// `Ok(None)` when no model has been saved yet.
    fn load_model(&self) -> Result<Option<TrainedModel>, DetectorError>;
    fn append_sample(&self, sample: &FeatureVector) -> Result<(), DetectorError>;
    fn append_result(&self, result: &DetectionResult) -> Result<(), DetectorError>;
}

/// Flat-file storage under a data directory. The model is a single json
/// document replaced atomically on save; samples and results append to
/// per-day jsonl files.
pub struct JsonFileStorage {
    base_dir: PathBuf,
}

impl JsonFileStorage {
    /// Default location under the platform data dir.
    pub fn new() -> Result<Self, DetectorError> {
        let base_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ransomguard");
        Self::from_path(base_dir)
    }

    pub fn from_path(base_dir: PathBuf) -> Result<Self, DetectorError> {
        fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    fn append_line<T: serde::Serialize>(&self, prefix: &str, value: &T) -> Result<(), DetectorError> {
        let filename = format!("{}-{}.jsonl", prefix, Utc::now().format("%Y-%m-%d"));
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.base_dir.join(filename))?;
        let json = serde_json::to_string(value)?;
        writeln!(file, "{}", json)?;
        Ok(())
    }
}

impl Storage for JsonFileStorage {
    fn save_model(&self, model: &TrainedModel) -> Result<(), DetectorError> {
        let path = self.base_dir.join(MODEL_FILE);
        let tmp = self.base_dir.join(format!("{}.tmp", MODEL_FILE));

        let json = serde_json::to_string(model)?;
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;

        log::info!("saved model {} to {}", model.id, path.display());
        Ok(())
    }

    fn load_model(&self) -> Result<Option<TrainedModel>, DetectorError> {
        let path = self.base_dir.join(MODEL_FILE);
        if !path.exists() {
            return Ok(None);
        }
        // Any failure to read the saved model means "no baseline"; the
        // caller falls back to training instead of dying on startup.
        let json = match fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) => {
                log::warn!("could not read {}: {}", path.display(), e);
                return Ok(None);
            }
        };
        match serde_json::from_str(&json) {
            Ok(model) => Ok(Some(model)),
            Err(e) => {
                log::warn!("ignoring unparseable model file {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }

    fn append_sample(&self, sample: &FeatureVector) -> Result<(), DetectorError> {
        self.append_line("samples", sample)
    }

    fn append_result(&self, result: &DetectionResult) -> Result<(), DetectorError> {
        self.append_line("detections", result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BaselineTrainer;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn sample_model() -> TrainedModel {
        let mut rng = StdRng::seed_from_u64(2);
        let window: Vec<FeatureVector> = (0..32)
            .map(|_| {
                let mut v = FeatureVector::new();
                v.set_by_name("cpu_percent", rng.gen_range(1.0..10.0));
                v.set_by_name("memory_percent", rng.gen_range(30.0..50.0));
                v.set_by_name("disk_write_rate", rng.gen_range(0.0..100_000.0));
                v
            })
            .collect();
        BaselineTrainer::new(0.1, Some(4)).fit(&window).unwrap()
    }

    #[test]
    fn test_load_without_save_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::from_path(dir.path().to_path_buf()).unwrap();
        assert!(storage.load_model().unwrap().is_none());
    }

    #[test]
    fn test_model_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::from_path(dir.path().to_path_buf()).unwrap();

        let model = sample_model();
        storage.save_model(&model).unwrap();

        let loaded = storage.load_model().unwrap().unwrap();
        assert_eq!(loaded.id, model.id);
        assert_eq!(loaded.sample_count, model.sample_count);
        assert_eq!(loaded.score_offset, model.score_offset);
        assert_eq!(loaded.layout_hash, model.layout_hash);
    }

    #[test]
    fn test_corrupt_model_file_means_no_baseline() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::from_path(dir.path().to_path_buf()).unwrap();

        fs::write(dir.path().join("model_latest.json"), "{not valid json").unwrap();
        assert!(storage.load_model().unwrap().is_none());

        // A fresh save over the damaged file recovers normally.
        let model = sample_model();
        storage.save_model(&model).unwrap();
        assert_eq!(storage.load_model().unwrap().unwrap().id, model.id);
    }

    #[test]
    fn test_samples_append_as_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::from_path(dir.path().to_path_buf()).unwrap();

        storage.append_sample(&FeatureVector::new()).unwrap();
        storage.append_sample(&FeatureVector::new()).unwrap();

        let file = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .find(|p| p.extension().map_or(false, |e| e == "jsonl"))
            .expect("a jsonl file should exist");
        let content = fs::read_to_string(file).unwrap();
        assert_eq!(content.lines().count(), 2);
        for line in content.lines() {
            let v: FeatureVector = serde_json::from_str(line).unwrap();
            assert!(v.validate().is_ok());
        }
    }
}
