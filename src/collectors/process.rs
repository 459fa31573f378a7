//! Per-process collector backed by sysinfo.

use std::time::Instant;

use sysinfo::{System, Users};

use super::{ProcessSample, ProcessSampler};
use crate::error::DetectorError;

/// Samples every visible process: CPU percent, I/O byte rate, owning user.
///
/// sysinfo reports per-process disk usage as a delta since the previous
/// refresh, so the I/O rate is that delta divided by the elapsed time
/// between our own `sample` calls. The first call reports 0.0 rates.
pub struct ProcessCollector {
    sys: System,
    users: Users,
    last_sample: Option<Instant>,
}

impl ProcessCollector {
    pub fn new() -> Self {
        let mut sys = System::new_all();
        sys.refresh_all();
        Self {
            sys,
            users: Users::new_with_refreshed_list(),
            last_sample: None,
        }
    }
}

impl Default for ProcessCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSampler for ProcessCollector {
    fn sample(&mut self) -> Result<Vec<ProcessSample>, DetectorError> {
        self.sys.refresh_processes();

        let elapsed = self
            .last_sample
            .map(|at| at.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        self.last_sample = Some(Instant::now());

        let mut samples = Vec::with_capacity(self.sys.processes().len());
        for (pid, process) in self.sys.processes() {
            let usage = process.disk_usage();
            let io_bytes = usage.read_bytes.saturating_add(usage.written_bytes);
            let io_rate = if elapsed > 0.0 {
                io_bytes as f64 / elapsed
            } else {
                0.0
            };

            let user = process
                .user_id()
                .and_then(|uid| self.users.get_user_by_id(uid))
                .map(|u| u.name().to_string());

            samples.push(ProcessSample {
                pid: pid.as_u32(),
                name: process.name().to_string(),
                cpu_percent: process.cpu_usage(),
                io_rate,
                user,
            });
        }

        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_sees_ourselves() {
        let mut collector = ProcessCollector::new();
        let samples = collector.sample().unwrap();

        assert!(!samples.is_empty());
        let own_pid = std::process::id();
        assert!(samples.iter().any(|p| p.pid == own_pid));
    }

    #[test]
    fn test_first_sample_has_zero_io_rates() {
        let mut collector = ProcessCollector::new();
        let samples = collector.sample().unwrap();

        assert!(samples.iter().all(|p| p.io_rate == 0.0));
    }
}
