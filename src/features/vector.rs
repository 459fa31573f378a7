//! Versioned feature vector.

use serde::{Deserialize, Serialize};

use super::layout::{
    feature_index, layout_hash, validate_layout, LayoutMismatchError, FEATURE_COUNT,
    FEATURE_VERSION,
};

/// Fixed-order numeric features for one tick, stamped with the layout
/// version and hash they were built under. The stamp travels with the
/// vector so a model fitted under a different schema can refuse it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub version: u8,
    pub layout_hash: u32,
    pub values: [f64; FEATURE_COUNT],
}

impl FeatureVector {
    pub fn new() -> Self {
        Self {
            version: FEATURE_VERSION,
            layout_hash: layout_hash(),
            values: [0.0; FEATURE_COUNT],
        }
    }

    pub fn from_values(values: [f64; FEATURE_COUNT]) -> Self {
        Self {
            version: FEATURE_VERSION,
            layout_hash: layout_hash(),
            values,
        }
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn get_by_name(&self, name: &str) -> Option<f64> {
        feature_index(name).map(|i| self.values[i])
    }

    pub fn set_by_name(&mut self, name: &str, value: f64) -> bool {
        match feature_index(name) {
            Some(i) => {
                self.values[i] = value;
                true
            }
            None => false,
        }
    }

    /// Check this vector against the schema compiled into the binary.
    pub fn validate(&self) -> Result<(), LayoutMismatchError> {
        validate_layout(self.version, self.layout_hash)
    }
}

impl Default for FeatureVector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_stamped_with_current_layout() {
        let v = FeatureVector::new();
        assert_eq!(v.version, FEATURE_VERSION);
        assert_eq!(v.layout_hash, layout_hash());
        assert!(v.validate().is_ok());
    }

    #[test]
    fn test_named_access() {
        let mut v = FeatureVector::new();
        assert!(v.set_by_name("disk_write_rate", 42.0));
        assert_eq!(v.get_by_name("disk_write_rate"), Some(42.0));
        assert!(!v.set_by_name("nope", 1.0));
        assert_eq!(v.get_by_name("nope"), None);
    }

    #[test]
    fn test_stale_stamp_fails_validation() {
        let mut v = FeatureVector::new();
        v.version = FEATURE_VERSION + 1;
        assert!(v.validate().is_err());
    }
}
