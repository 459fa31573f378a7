//! Detection orchestrator.
//!
//! Drives the train-then-detect lifecycle over the collectors, the feature
//! aggregator, and the model. State machine:
//!
//!   Idle -> Training -> Ready -> Detecting -> ... -> Stopped
//!
//! `Ready` and `Detecting` both accept `detect()`; `Stopped` is terminal
//! and every call against it fails with `DetectorError::Stopped`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::collectors::{
    FileActivity, FileActivitySampler, ProcessSample, ProcessSampler, SystemSampler,
    SystemSnapshot,
};
use crate::config::DetectorConfig;
use crate::error::DetectorError;
use crate::features::{FeatureAggregator, ProcessInfo, SystemMetrics};
use crate::model::{BaselineTrainer, OnlineAnalyzer};
use crate::storage::Storage;
use crate::thresholds::HostThresholds;

/// Collection attempts per tick before the tick counts as failed.
const MAX_TICK_RETRIES: u32 = 3;

/// Linear backoff step between retries within a tick.
const RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// Failed ticks in a row before the detector gives up and stops.
const MAX_CONSECUTIVE_FAILURES: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectorState {
    Idle,
    Training,
    Ready,
    Detecting,
    Stopped,
}

/// Verdict for one detection tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionResult {
    pub timestamp: DateTime<Utc>,
    pub model_id: Uuid,
    /// Raw forest score in (-1, 0]; more negative is more anomalous.
    pub score: f64,
    pub is_anomaly: bool,
    /// Score crossed the boundary but raw activity sat under the host's
    /// noise floors, so no anomaly was raised.
    pub suppressed: bool,
    /// Score crossed the boundary but an alert already fired within the
    /// cooldown window, so the verdict was withheld.
    pub cooldown: bool,
    pub metrics: SystemMetrics,
    /// Ranked top-N regardless of the verdict; consumers get the same
    /// context on quiet ticks as on alerts.
    pub suspicious_processes: Vec<ProcessInfo>,
}

/// Summary of a completed training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub model_id: Uuid,
    pub sample_count: usize,
    pub window: Duration,
    /// True when the window was cut short by cancellation but still held
    /// enough samples to fit.
    pub cancelled_early: bool,
}

pub struct RansomwareDetector {
    config: DetectorConfig,
    thresholds: HostThresholds,
    system: Box<dyn SystemSampler>,
    processes: Box<dyn ProcessSampler>,
    files: Box<dyn FileActivitySampler>,
    storage: Box<dyn Storage>,
    aggregator: FeatureAggregator,
    analyzer: Option<OnlineAnalyzer>,
    state: DetectorState,
    consecutive_failures: u32,
    last_alert: Option<Instant>,
}

impl RansomwareDetector {
    pub fn new(
        config: DetectorConfig,
        thresholds: HostThresholds,
        system: Box<dyn SystemSampler>,
        processes: Box<dyn ProcessSampler>,
        files: Box<dyn FileActivitySampler>,
        storage: Box<dyn Storage>,
    ) -> Result<Self, DetectorError> {
        config.validate()?;
        let aggregator = FeatureAggregator::new(
            thresholds.clone(),
            config.suspicion_weights.clone(),
            config.known_processes.clone(),
            config.top_n,
        );
        Ok(Self {
            config,
            thresholds,
            system,
            processes,
            files,
            storage,
            aggregator,
            analyzer: None,
            state: DetectorState::Idle,
            consecutive_failures: 0,
            last_alert: None,
        })
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }

    /// Adopt the persisted model if one exists and matches the current
    /// feature schema. Returns whether a baseline was loaded; a stale
    /// schema is not an error, it just means a retrain is needed.
    pub fn try_load_baseline(&mut self) -> Result<bool, DetectorError> {
        if self.state == DetectorState::Stopped {
            return Err(DetectorError::Stopped);
        }
        let model = match self.storage.load_model()? {
            Some(m) => m,
            None => return Ok(false),
        };
        if let Err(e) = model.validate_schema() {
            log::warn!("ignoring persisted model {}: {}", model.id, e);
            return Ok(false);
        }
        log::info!(
            "loaded baseline {} ({} samples, trained {})",
            model.id,
            model.sample_count,
            model.trained_at
        );
        self.analyzer = Some(OnlineAnalyzer::new(model, self.thresholds.clone())?);
        self.state = DetectorState::Ready;
        Ok(true)
    }

    /// Collect a baseline window and fit a model on it. Checks `cancel`
    /// every tick; a cancelled window that already holds enough samples is
    /// fitted early, otherwise the detector returns to `Idle`.
    pub fn train(&mut self, cancel: &AtomicBool) -> Result<TrainingReport, DetectorError> {
        if self.state == DetectorState::Stopped {
            return Err(DetectorError::Stopped);
        }
        self.state = DetectorState::Training;
        self.aggregator.reset();
        log::info!(
            "training baseline for {:?} at {:?} intervals",
            self.config.training_duration,
            self.config.tick_interval
        );

        let started = Instant::now();
        let mut samples = Vec::new();
        let mut cancelled_early = false;

        while started.elapsed() < self.config.training_duration {
            if cancel.load(Ordering::Relaxed) {
                cancelled_early = true;
                break;
            }

            match self.collect_tick() {
                Ok((system, processes, files)) => {
                    let tick = self.aggregator.aggregate(system, processes, files);
                    if let Err(e) = self.storage.append_sample(&tick.vector) {
                        log::warn!("failed to persist training sample: {}", e);
                    }
                    samples.push(tick.vector);
                }
                Err(e) => {
                    // A dropped tick just shortens the window.
                    log::warn!("skipping training tick: {}", e);
                }
            }

            thread::sleep(self.config.tick_interval);
        }

        let trainer = BaselineTrainer::new(self.config.contamination, self.config.seed);
        let model = match trainer.fit(&samples) {
            Ok(model) => model,
            Err(e) => {
                self.state = DetectorState::Idle;
                return Err(e);
            }
        };

        if let Err(e) = self.storage.save_model(&model) {
            log::error!("failed to persist model {}: {}", model.id, e);
        }

        let report = TrainingReport {
            model_id: model.id,
            sample_count: model.sample_count,
            window: started.elapsed(),
            cancelled_early,
        };
        self.analyzer = Some(OnlineAnalyzer::new(model, self.thresholds.clone())?);
        self.state = DetectorState::Ready;
        Ok(report)
    }

    /// Run one detection tick: collect, aggregate, score, persist.
    ///
    /// Collection failures are retried within the tick; a tick that fails
    /// all retries increments the consecutive-failure count and surfaces
    /// `CollectorUnavailable` so the caller keeps its cadence. Crossing
    /// `MAX_CONSECUTIVE_FAILURES` stops the detector for good.
    pub fn detect(&mut self) -> Result<DetectionResult, DetectorError> {
        if self.state == DetectorState::Stopped {
            return Err(DetectorError::Stopped);
        }
        if self.analyzer.is_none() {
            return Err(DetectorError::ModelNotTrained);
        }
        self.state = DetectorState::Detecting;

        let (system, processes, files) = match self.collect_tick_with_retries() {
            Ok(tick) => tick,
            Err(e) => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                    log::error!(
                        "stopping after {} consecutive failed ticks",
                        self.consecutive_failures
                    );
                    self.state = DetectorState::Stopped;
                    return Err(DetectorError::ConsecutiveTickFailure {
                        failures: self.consecutive_failures,
                        last_error: e.to_string(),
                    });
                }
                return Err(e);
            }
        };
        self.consecutive_failures = 0;

        let tick = self.aggregator.aggregate(system, processes, files);
        let analyzer = self.analyzer.as_ref().ok_or(DetectorError::ModelNotTrained)?;
        let outcome = analyzer.score(&tick.vector)?;

        // One sustained burst raises one alert, not one per tick.
        let mut is_anomaly = outcome.is_anomaly;
        let mut cooldown = false;
        if is_anomaly {
            if let Some(at) = self.last_alert {
                if at.elapsed() < self.config.alert_cooldown {
                    log::info!(
                        "anomalous tick within {:?} of the last alert, verdict withheld",
                        self.config.alert_cooldown
                    );
                    is_anomaly = false;
                    cooldown = true;
                }
            }
        }
        if is_anomaly {
            self.last_alert = Some(Instant::now());
        }

        let result = DetectionResult {
            timestamp: tick.metrics.timestamp,
            model_id: analyzer.model().id,
            score: outcome.score,
            is_anomaly,
            suppressed: outcome.suppressed,
            cooldown,
            metrics: tick.metrics,
            suspicious_processes: tick.suspicious_processes,
        };

        if result.is_anomaly {
            log::warn!(
                "anomaly: score {:.4}, write rate {:.1} MiB/s, {} suspicious processes",
                result.score,
                result.metrics.disk_write_rate / (1024.0 * 1024.0),
                result.suspicious_processes.len()
            );
        }
        if let Err(e) = self.storage.append_result(&result) {
            log::warn!("failed to persist detection result: {}", e);
        }
        Ok(result)
    }

    /// Terminal. Further `train()`/`detect()` calls fail with `Stopped`.
    pub fn stop(&mut self) {
        log::info!("detector stopped");
        self.state = DetectorState::Stopped;
    }

    fn collect_tick(
        &mut self,
    ) -> Result<(SystemSnapshot, Vec<ProcessSample>, Vec<FileActivity>), DetectorError> {
        let system = self.system.sample()?;
        let processes = self.processes.sample()?;
        let files = self.files.drain();
        Ok((system, processes, files))
    }

    fn collect_tick_with_retries(
        &mut self,
    ) -> Result<(SystemSnapshot, Vec<ProcessSample>, Vec<FileActivity>), DetectorError> {
        let mut last_err = None;
        for attempt in 1..=MAX_TICK_RETRIES {
            match self.collect_tick() {
                Ok(tick) => return Ok(tick),
                Err(e) => {
                    log::warn!("tick collection attempt {} failed: {}", attempt, e);
                    last_err = Some(e);
                    if attempt < MAX_TICK_RETRIES {
                        thread::sleep(RETRY_BACKOFF * attempt);
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| {
            DetectorError::CollectorUnavailable("tick collection failed".into())
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureVector;
    use crate::model::TrainedModel;
    use parking_lot::Mutex;
    use std::sync::Arc;

    // Fabricated clock: each sample advances one second regardless of wall
    // time, so rate features are exact under millisecond tick intervals.
    struct FakeSystem {
        tick: u64,
        base: DateTime<Utc>,
        write_bytes_per_tick: u64,
        fail: bool,
    }

    impl FakeSystem {
        fn idle() -> Self {
            Self {
                tick: 0,
                base: Utc::now(),
                write_bytes_per_tick: 50_000,
                fail: false,
            }
        }
    }

    impl SystemSampler for FakeSystem {
        fn sample(&mut self) -> Result<SystemSnapshot, DetectorError> {
            if self.fail {
                return Err(DetectorError::CollectorUnavailable("fake outage".into()));
            }
            self.tick += 1;
            // Mild jitter keeps the feature columns non-constant.
            let jitter = (self.tick % 7) as f64;
            Ok(SystemSnapshot {
                cpu_percent: 5.0 + jitter,
                memory_percent: 40.0 + jitter / 2.0,
                disk_read_bytes: self.tick * 10_000,
                disk_write_bytes: self.tick * self.write_bytes_per_tick,
                timestamp: self.base + chrono::Duration::seconds(self.tick as i64),
            })
        }
    }

    struct FakeProcesses;

    impl ProcessSampler for FakeProcesses {
        fn sample(&mut self) -> Result<Vec<ProcessSample>, DetectorError> {
            Ok(vec![ProcessSample {
                pid: 100,
                name: "editor".into(),
                cpu_percent: 2.0,
                io_rate: 1_000.0,
                user: Some("dev".into()),
            }])
        }
    }

    struct NoFiles;

    impl FileActivitySampler for NoFiles {
        fn drain(&mut self) -> Vec<FileActivity> {
            Vec::new()
        }
    }

    #[derive(Default)]
    struct MemoryStorage {
        model: Mutex<Option<TrainedModel>>,
        samples: Mutex<Vec<FeatureVector>>,
        results: Mutex<Vec<DetectionResult>>,
    }

    impl Storage for Arc<MemoryStorage> {
        fn save_model(&self, model: &TrainedModel) -> Result<(), DetectorError> {
            *self.model.lock() = Some(model.clone());
            Ok(())
        }
        fn load_model(&self) -> Result<Option<TrainedModel>, DetectorError> {
            Ok(self.model.lock().clone())
        }
        fn append_sample(&self, sample: &FeatureVector) -> Result<(), DetectorError> {
            self.samples.lock().push(sample.clone());
            Ok(())
        }
        fn append_result(&self, result: &DetectionResult) -> Result<(), DetectorError> {
            self.results.lock().push(result.clone());
            Ok(())
        }
    }

    fn fast_config() -> DetectorConfig {
        DetectorConfig {
            training_duration: Duration::from_millis(400),
            tick_interval: Duration::from_millis(1),
            seed: Some(9),
            ..DetectorConfig::default()
        }
    }

    fn detector_with(
        config: DetectorConfig,
        system: FakeSystem,
        storage: Arc<MemoryStorage>,
    ) -> RansomwareDetector {
        RansomwareDetector::new(
            config,
            HostThresholds::from_capacity(4, 16 << 30),
            Box::new(system),
            Box::new(FakeProcesses),
            Box::new(NoFiles),
            Box::new(storage),
        )
        .unwrap()
    }

    #[test]
    fn test_detect_before_training_fails() {
        let storage = Arc::new(MemoryStorage::default());
        let mut det = detector_with(fast_config(), FakeSystem::idle(), storage);

        assert!(matches!(det.detect(), Err(DetectorError::ModelNotTrained)));
        assert_eq!(det.state(), DetectorState::Idle);
    }

    #[test]
    fn test_train_then_detect() {
        let storage = Arc::new(MemoryStorage::default());
        let mut det = detector_with(fast_config(), FakeSystem::idle(), Arc::clone(&storage));

        let cancel = AtomicBool::new(false);
        let report = det.train(&cancel).unwrap();
        assert!(report.sample_count >= crate::model::MIN_TRAINING_SAMPLES);
        assert!(!report.cancelled_early);
        assert_eq!(det.state(), DetectorState::Ready);
        assert!(storage.model.lock().is_some());
        assert_eq!(storage.samples.lock().len(), report.sample_count);

        let result = det.detect().unwrap();
        assert_eq!(det.state(), DetectorState::Detecting);
        assert_eq!(result.model_id, report.model_id);
        assert!(result.score > -1.0 && result.score <= 0.0);
        assert_eq!(storage.results.lock().len(), 1);

        // Quiet ticks carry the ranked process context too: the editor has
        // nonzero CPU and I/O, so it must appear even without an alarm.
        assert!(!result.is_anomaly);
        assert_eq!(result.suspicious_processes.len(), 1);
        assert_eq!(result.suspicious_processes[0].pid, 100);
        assert!(result.suspicious_processes[0].suspicion > 0.0);
    }

    #[test]
    fn test_cancel_before_enough_samples_returns_to_idle() {
        let storage = Arc::new(MemoryStorage::default());
        let mut config = fast_config();
        config.training_duration = Duration::from_secs(60);
        let mut det = detector_with(config, FakeSystem::idle(), storage);

        let cancel = AtomicBool::new(true);
        let err = det.train(&cancel).unwrap_err();
        assert!(matches!(err, DetectorError::InsufficientData { .. }));
        assert_eq!(det.state(), DetectorState::Idle);

        // The failed attempt must not leave a half-usable model behind.
        assert!(matches!(det.detect(), Err(DetectorError::ModelNotTrained)));
    }

    #[test]
    fn test_cancel_with_enough_samples_fits_early() {
        let storage = Arc::new(MemoryStorage::default());
        let mut config = fast_config();
        config.training_duration = Duration::from_secs(60);
        let mut det = detector_with(config, FakeSystem::idle(), storage);

        let cancel = Arc::new(AtomicBool::new(false));
        let trigger = Arc::clone(&cancel);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(500));
            trigger.store(true, Ordering::Relaxed);
        });

        let report = det.train(&cancel).unwrap();
        handle.join().unwrap();

        assert!(report.cancelled_early);
        assert!(report.sample_count >= crate::model::MIN_TRAINING_SAMPLES);
        assert_eq!(det.state(), DetectorState::Ready);
    }

    #[test]
    fn test_stopped_is_terminal() {
        let storage = Arc::new(MemoryStorage::default());
        let mut det = detector_with(fast_config(), FakeSystem::idle(), storage);

        let cancel = AtomicBool::new(false);
        det.train(&cancel).unwrap();
        det.stop();

        assert!(matches!(det.detect(), Err(DetectorError::Stopped)));
        assert!(matches!(det.train(&cancel), Err(DetectorError::Stopped)));
        assert!(matches!(det.try_load_baseline(), Err(DetectorError::Stopped)));
    }

    #[test]
    fn test_consecutive_failures_stop_the_detector() {
        let storage = Arc::new(MemoryStorage::default());
        let mut det = detector_with(fast_config(), FakeSystem::idle(), storage);

        let cancel = AtomicBool::new(false);
        det.train(&cancel).unwrap();

        // Swap in a permanently failing sampler.
        let mut broken = FakeSystem::idle();
        broken.fail = true;
        det.system = Box::new(broken);

        for i in 1..MAX_CONSECUTIVE_FAILURES {
            let err = det.detect().unwrap_err();
            assert!(
                matches!(err, DetectorError::CollectorUnavailable(_)),
                "failure {} should stay recoverable, got {}",
                i,
                err
            );
            assert_ne!(det.state(), DetectorState::Stopped);
        }

        let err = det.detect().unwrap_err();
        assert!(matches!(err, DetectorError::ConsecutiveTickFailure { .. }));
        assert_eq!(det.state(), DetectorState::Stopped);
    }

    #[test]
    fn test_load_baseline_round_trip() {
        let storage = Arc::new(MemoryStorage::default());
        let cancel = AtomicBool::new(false);

        let report = {
            let mut det =
                detector_with(fast_config(), FakeSystem::idle(), Arc::clone(&storage));
            det.train(&cancel).unwrap()
        };

        // A fresh detector over the same storage picks the model up.
        let mut det = detector_with(fast_config(), FakeSystem::idle(), Arc::clone(&storage));
        assert!(det.try_load_baseline().unwrap());
        assert_eq!(det.state(), DetectorState::Ready);

        let result = det.detect().unwrap();
        assert_eq!(result.model_id, report.model_id);
    }

    #[test]
    fn test_load_baseline_without_model_is_false() {
        let storage = Arc::new(MemoryStorage::default());
        let mut det = detector_with(fast_config(), FakeSystem::idle(), storage);
        assert!(!det.try_load_baseline().unwrap());
        assert_eq!(det.state(), DetectorState::Idle);
    }
}
