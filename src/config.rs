//! Detector configuration.
//!
//! Everything the caller tunes lives here and is validated up front; the
//! pipeline itself never reads global mutable state.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::DetectorError;

/// Weights of the composite suspicion score used to rank processes.
///
/// The exact formula is a placeholder pending calibration, so the weights
/// are configuration rather than constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuspicionWeights {
    /// Weight of per-process CPU usage (normalized by the host's
    /// high-CPU-process threshold).
    pub cpu: f64,
    /// Weight of per-process I/O byte rate (normalized by the host's
    /// I/O rate scale).
    pub io: f64,
    /// Weight per file event attributed to the process this tick.
    pub file_writes: f64,
}

impl Default for SuspicionWeights {
    fn default() -> Self {
        Self {
            cpu: 0.4,
            io: 0.4,
            file_writes: 0.2,
        }
    }
}

/// Process-name context consulted by the suspicion ranking. System
/// processes never enter the ranking; active browsers relax the CPU
/// normalization, since a video call or a heavy tab burns CPU in ways
/// that look nothing like encryption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnownProcesses {
    /// Names excluded from the ranking outright. Matched case-insensitively.
    pub system: Vec<String>,
    /// Browser executables. Any of these present in a tick relaxes the
    /// ranking thresholds for every process.
    pub browsers: Vec<String>,
}

impl Default for KnownProcesses {
    fn default() -> Self {
        Self {
            system: [
                "svchost.exe",
                "explorer.exe",
                "searchui.exe",
                "runtimebroker.exe",
                "shellexperiencehost.exe",
                "searchindexer.exe",
                "dwm.exe",
                "system",
                "registry",
                "fontdrvhost.exe",
                "spoolsv.exe",
                "wininit.exe",
                "winlogon.exe",
                "services.exe",
                "lsass.exe",
                "csrss.exe",
                "smss.exe",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            browsers: [
                "chrome.exe",
                "firefox.exe",
                "msedge.exe",
                "browser_broker.exe",
                "webviewhost.exe",
                "opera.exe",
                "brave.exe",
                "vivaldi.exe",
                "iexplore.exe",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl KnownProcesses {
    pub fn is_system(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.system.iter().any(|s| *s == name)
    }

    pub fn is_browser(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.browsers.iter().any(|b| *b == name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Wall-clock length of the baseline training window.
    pub training_duration: Duration,

    /// Interval between feature samples during training. Also the minimum
    /// safe interval between `detect()` calls: rates are computed from
    /// consecutive snapshots, so calling faster than this during detection
    /// makes the rate features noisier than the ones the model was fit on.
    pub tick_interval: Duration,

    /// Expected fraction of the baseline window that the model treats as
    /// outliers when calibrating its decision offset.
    pub contamination: f64,

    /// How many suspicious processes each `DetectionResult` carries.
    pub top_n: usize,

    /// Process ranking weights.
    pub suspicion_weights: SuspicionWeights,

    /// Process-name whitelists consulted by the ranking.
    pub known_processes: KnownProcesses,

    /// Minimum gap between raised alerts. An anomalous tick inside this
    /// window after the last alert is reported with the verdict withheld,
    /// so one sustained burst produces one alert instead of a stream.
    pub alert_cooldown: Duration,

    /// Seed for the forest's randomized splits. `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            training_duration: Duration::from_secs(300),
            tick_interval: Duration::from_secs(1),
            contamination: 0.1,
            top_n: 5,
            suspicion_weights: SuspicionWeights::default(),
            known_processes: KnownProcesses::default(),
            alert_cooldown: Duration::from_secs(300),
            seed: None,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<(), DetectorError> {
        if self.training_duration.is_zero() {
            return Err(DetectorError::InvalidConfig(
                "training duration must be > 0".into(),
            ));
        }
        if self.tick_interval.is_zero() {
            return Err(DetectorError::InvalidConfig(
                "tick interval must be > 0".into(),
            ));
        }
        if !(self.contamination > 0.0 && self.contamination < 0.5) {
            return Err(DetectorError::InvalidConfig(format!(
                "contamination must be in (0, 0.5), got {}",
                self.contamination
            )));
        }
        if self.top_n == 0 {
            return Err(DetectorError::InvalidConfig("top_n must be > 0".into()));
        }
        let w = &self.suspicion_weights;
        if w.cpu < 0.0 || w.io < 0.0 || w.file_writes < 0.0 {
            return Err(DetectorError::InvalidConfig(
                "suspicion weights must be >= 0".into(),
            ));
        }
        if w.cpu + w.io + w.file_writes == 0.0 {
            return Err(DetectorError::InvalidConfig(
                "at least one suspicion weight must be > 0".into(),
            ));
        }
        Ok(())
    }
}
