//! Filesystem activity collector backed by a notify watcher.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;

use super::{FileActivity, FileActivitySampler, FileEventKind};
use crate::error::DetectorError;

/// Cap on buffered events between drains so a mass-mutation burst cannot
/// grow the buffer without bound; the count still matters more than the
/// individual paths once we are this far past normal.
const MAX_BUFFERED_EVENTS: usize = 50_000;

/// Watches a directory tree and buffers events until the tick drains them.
///
/// PID attribution is not available from the watcher, so `pid` stays `None`
/// here; the aggregator attributes bursts to processes by I/O rate instead.
pub struct FileActivityCollector {
    // Held for its Drop side effect: dropping the watcher stops the stream.
    _watcher: RecommendedWatcher,
    buffer: Arc<Mutex<Vec<FileActivity>>>,
}

impl FileActivityCollector {
    pub fn new(watch_path: &Path) -> Result<Self, DetectorError> {
        let buffer: Arc<Mutex<Vec<FileActivity>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buffer);

        let mut watcher =
            notify::recommended_watcher(move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if let Some(kind) = convert_event_kind(&event.kind) {
                        let mut buf = sink.lock();
                        for path in event.paths {
                            if buf.len() >= MAX_BUFFERED_EVENTS {
                                return;
                            }
                            let size = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
                            buf.push(FileActivity {
                                path,
                                kind,
                                size,
                                pid: None,
                                timestamp: Utc::now(),
                            });
                        }
                    }
                }
                Err(e) => {
                    log::warn!("filesystem watcher error: {}", e);
                }
            })
            .map_err(|e| {
                DetectorError::CollectorUnavailable(format!("failed to create watcher: {}", e))
            })?;

        watcher
            .watch(watch_path, RecursiveMode::Recursive)
            .map_err(|e| {
                DetectorError::CollectorUnavailable(format!(
                    "failed to watch {}: {}",
                    watch_path.display(),
                    e
                ))
            })?;

        log::info!("watching {} for file activity", watch_path.display());
        Ok(Self {
            _watcher: watcher,
            buffer,
        })
    }
}

impl FileActivitySampler for FileActivityCollector {
    fn drain(&mut self) -> Vec<FileActivity> {
        std::mem::take(&mut *self.buffer.lock())
    }
}

/// Map notify's event taxonomy onto ours, ignoring kinds we do not track
/// (access events, metadata-only changes on some platforms).
fn convert_event_kind(kind: &EventKind) -> Option<FileEventKind> {
    match kind {
        EventKind::Create(_) => Some(FileEventKind::Created),
        EventKind::Modify(ModifyKind::Name(_)) => Some(FileEventKind::Renamed),
        EventKind::Modify(_) => Some(FileEventKind::Modified),
        EventKind::Remove(_) => Some(FileEventKind::Deleted),
        _ => None,
    }
}
