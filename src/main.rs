//! ransomguard - behavioral ransomware detector CLI.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;

use ransomguard::collectors::{FileActivityCollector, ProcessCollector, SystemCollector};
use ransomguard::storage::JsonFileStorage;
use ransomguard::{DetectorConfig, DetectorError, HostThresholds, RansomwareDetector};

#[derive(Parser, Debug)]
#[command(
    name = "ransomguard",
    about = "Signature-free ransomware detection from host behavior"
)]
struct Args {
    /// Baseline training window in seconds.
    #[arg(long, default_value_t = 300)]
    train_duration: u64,

    /// Seconds between samples during training.
    #[arg(long, default_value_t = 1)]
    tick_interval: u64,

    /// Seconds between detection ticks.
    #[arg(long, default_value_t = 5)]
    interval: u64,

    /// Expected outlier fraction of the training window, in (0, 0.5).
    #[arg(long, default_value_t = 0.1)]
    contamination: f64,

    /// Suspicious processes reported per anomaly.
    #[arg(long, default_value_t = 5)]
    top_n: usize,

    /// Seconds between raised alerts; anomalous ticks inside this window
    /// are reported without re-alerting.
    #[arg(long, default_value_t = 300)]
    alert_cooldown: u64,

    /// Directory tree to watch for file activity. Defaults to the home
    /// directory.
    #[arg(long)]
    watch_path: Option<PathBuf>,

    /// Where models and logs live. Defaults to the platform data dir.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Train a fresh baseline even when a persisted model exists.
    #[arg(long)]
    retrain: bool,

    /// Seed for the forest's randomized splits (reproducible runs).
    #[arg(long)]
    seed: Option<u64>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run(Args::parse()) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), DetectorError> {
    let config = DetectorConfig {
        training_duration: Duration::from_secs(args.train_duration),
        tick_interval: Duration::from_secs(args.tick_interval),
        contamination: args.contamination,
        top_n: args.top_n,
        alert_cooldown: Duration::from_secs(args.alert_cooldown),
        seed: args.seed,
        ..DetectorConfig::default()
    };

    let watch_path = args
        .watch_path
        .or_else(dirs::home_dir)
        .ok_or_else(|| DetectorError::InvalidConfig("no watch path and no home dir".into()))?;

    let storage = match args.data_dir {
        Some(dir) => JsonFileStorage::from_path(dir)?,
        None => JsonFileStorage::new()?,
    };
    log::info!("data dir: {}", storage.base_dir().display());

    let thresholds = HostThresholds::probe();
    let detect_interval = Duration::from_secs(args.interval);
    let mut detector = RansomwareDetector::new(
        config,
        thresholds,
        Box::new(SystemCollector::new()),
        Box::new(ProcessCollector::new()),
        Box::new(FileActivityCollector::new(&watch_path)?),
        Box::new(storage),
    )?;

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    ctrlc::set_handler(move || {
        log::info!("interrupt received, shutting down");
        flag.store(true, Ordering::Relaxed);
    })
    .map_err(|e| DetectorError::InvalidConfig(format!("signal handler: {}", e)))?;

    let loaded = !args.retrain && detector.try_load_baseline()?;
    if !loaded {
        println!("training baseline for {}s, keep the host on its normal workload", args.train_duration);
        let report = detector.train(&cancel)?;
        println!(
            "baseline ready: model {} from {} samples{}",
            report.model_id,
            report.sample_count,
            if report.cancelled_early {
                " (window cut short)"
            } else {
                ""
            }
        );
    }

    println!("detecting, ctrl-c to stop");
    while !cancel.load(Ordering::Relaxed) {
        match detector.detect() {
            Ok(result) => {
                if result.is_anomaly {
                    println!(
                        "[{}] ANOMALY score {:.4}, write {:.1} MiB/s",
                        result.timestamp.format("%H:%M:%S"),
                        result.score,
                        result.metrics.disk_write_rate / (1024.0 * 1024.0)
                    );
                    for proc in &result.suspicious_processes {
                        println!(
                            "  pid {} {} cpu {:.1}% io {:.1} MiB/s writes {}",
                            proc.pid,
                            proc.name,
                            proc.cpu_percent,
                            proc.io_rate / (1024.0 * 1024.0),
                            proc.file_writes
                        );
                    }
                } else {
                    log::debug!(
                        "tick ok: score {:.4}{}",
                        result.score,
                        if result.suppressed { " (suppressed)" } else { "" }
                    );
                }
            }
            Err(DetectorError::CollectorUnavailable(msg)) => {
                log::warn!("tick skipped: {}", msg);
            }
            Err(e) => {
                detector.stop();
                return Err(e);
            }
        }
        thread::sleep(detect_interval);
    }

    detector.stop();
    Ok(())
}
