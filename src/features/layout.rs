//! Feature layout - the single source of truth for the model's input schema.
//!
//! The trainer and the analyzer share this schema as a hard contract: a
//! model fitted under one layout must never score vectors built under
//! another. Any change here (order, count, meaning) invalidates every
//! persisted model, so:
//! 1. Add a feature -> increment `FEATURE_VERSION`
//! 2. Reorder features -> increment `FEATURE_VERSION`
//! 3. Remove a feature -> increment `FEATURE_VERSION`

use crc32fast::Hasher;
use thiserror::Error;

/// Current feature layout version.
pub const FEATURE_VERSION: u8 = 1;

/// Feature names in the exact order they appear in the vector.
pub const FEATURE_LAYOUT: &[&str] = &[
    "cpu_percent",            // 0: host CPU usage percent
    "memory_percent",         // 1: host memory usage percent
    "disk_read_rate",         // 2: host disk read bytes/sec
    "disk_write_rate",        // 3: host disk write bytes/sec
    "file_created",           // 4: file creations this tick
    "file_modified",          // 5: file modifications this tick
    "file_deleted",           // 6: file deletions this tick
    "file_renamed",           // 7: file renames this tick
    "high_cpu_process_count", // 8: processes above the host high-CPU mark
    "process_io_rate",        // 9: summed per-process I/O bytes/sec
];

/// Must match `FEATURE_LAYOUT.len()`.
pub const FEATURE_COUNT: usize = 10;

/// CRC32 over version + ordered feature names; detects layout drift
/// between a persisted model and the running binary.
pub fn layout_hash() -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(&[FEATURE_VERSION]);
    for name in FEATURE_LAYOUT {
        hasher.update(name.as_bytes());
        hasher.update(&[0]);
    }
    hasher.finalize()
}

#[derive(Debug, Clone, Error)]
#[error(
    "feature layout mismatch: expected v{expected_version} (hash {expected_hash:08x}), \
     got v{actual_version} (hash {actual_hash:08x})"
)]
pub struct LayoutMismatchError {
    pub expected_version: u8,
    pub expected_hash: u32,
    pub actual_version: u8,
    pub actual_hash: u32,
}

pub fn validate_layout(version: u8, hash: u32) -> Result<(), LayoutMismatchError> {
    let current = layout_hash();
    if version != FEATURE_VERSION || hash != current {
        return Err(LayoutMismatchError {
            expected_version: FEATURE_VERSION,
            expected_hash: current,
            actual_version: version,
            actual_hash: hash,
        });
    }
    Ok(())
}

/// Index of a feature by name.
pub fn feature_index(name: &str) -> Option<usize> {
    FEATURE_LAYOUT.iter().position(|&n| n == name)
}

/// Name of a feature by index.
pub fn feature_name(index: usize) -> Option<&'static str> {
    FEATURE_LAYOUT.get(index).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_matches_count() {
        assert_eq!(FEATURE_LAYOUT.len(), FEATURE_COUNT);
    }

    #[test]
    fn test_layout_hash_stable_and_nonzero() {
        assert_eq!(layout_hash(), layout_hash());
        assert_ne!(layout_hash(), 0);
    }

    #[test]
    fn test_validate_layout() {
        assert!(validate_layout(FEATURE_VERSION, layout_hash()).is_ok());
        assert!(validate_layout(FEATURE_VERSION + 1, layout_hash()).is_err());
        assert!(validate_layout(FEATURE_VERSION, layout_hash().wrapping_add(1)).is_err());
    }

    #[test]
    fn test_feature_lookup() {
        assert_eq!(feature_index("cpu_percent"), Some(0));
        assert_eq!(feature_index("process_io_rate"), Some(9));
        assert_eq!(feature_index("nonexistent"), None);
        assert_eq!(feature_name(3), Some("disk_write_rate"));
        assert_eq!(feature_name(100), None);
    }
}
