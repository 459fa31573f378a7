//! Per-feature standardization.

use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

/// Floor on the per-feature standard deviation so constant features do not
/// blow up the transform.
const STD_FLOOR: f64 = 1e-9;

/// Fitted mean/std per feature column. Persisted with the model so live
/// vectors are standardized exactly the way the training matrix was.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(data: &Array2<f64>) -> Self {
        let n = data.nrows().max(1) as f64;
        let mean: Vec<f64> = data
            .mean_axis(Axis(0))
            .map(|m| m.to_vec())
            .unwrap_or_else(|| vec![0.0; data.ncols()]);

        let std: Vec<f64> = (0..data.ncols())
            .map(|j| {
                let col = data.column(j);
                let m = mean[j];
                let var = col.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / n;
                var.sqrt().max(STD_FLOOR)
            })
            .collect();

        Self { mean, std }
    }

    pub fn transform(&self, values: &[f64]) -> Vec<f64> {
        values
            .iter()
            .zip(self.mean.iter().zip(self.std.iter()))
            .map(|(v, (m, s))| (v - m) / s)
            .collect()
    }

    /// Standardize a whole matrix in place, column by column.
    pub fn transform_matrix(&self, data: &Array2<f64>) -> Array2<f64> {
        let mut out = data.clone();
        for (j, mut col) in out.axis_iter_mut(Axis(1)).enumerate() {
            let (m, s) = (self.mean[j], self.std[j]);
            col.mapv_inplace(|v| (v - m) / s);
        }
        out
    }
}
