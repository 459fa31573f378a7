//! Isolation forest.
//!
//! Unsupervised anomaly scoring by random recursive partitioning: outliers
//! sit in sparse regions and isolate in few splits, so their expected path
//! length through the trees is short. Scores follow the convention that
//! values lie in (-1, 0] and MORE NEGATIVE means MORE ANOMALOUS.

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Trees per forest.
pub const N_ESTIMATORS: usize = 100;

/// Subsample size per tree, capped at the classic 256. Small subsamples
/// are the point: they keep path lengths discriminative.
pub const MAX_SUBSAMPLE: usize = 256;

/// Euler-Mascheroni constant, used in the harmonic-number approximation.
const EULER_GAMMA: f64 = 0.577_215_664_9;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
    Leaf {
        size: usize,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationForest {
    trees: Vec<Node>,
    subsample_size: usize,
}

impl IsolationForest {
    /// Fit `N_ESTIMATORS` trees on random subsamples of `data` (rows are
    /// samples, columns features). `data` must be non-empty.
    pub fn fit(data: &Array2<f64>, rng: &mut StdRng) -> Self {
        let n_rows = data.nrows();
        let subsample_size = n_rows.min(MAX_SUBSAMPLE);
        let depth_limit = (subsample_size.max(2) as f64).log2().ceil() as usize;

        let trees = (0..N_ESTIMATORS)
            .map(|_| {
                let idx: Vec<usize> = if subsample_size < n_rows {
                    sample(rng, n_rows, subsample_size).into_vec()
                } else {
                    (0..n_rows).collect()
                };
                build_node(data, &idx, 0, depth_limit, rng)
            })
            .collect();

        Self {
            trees,
            subsample_size,
        }
    }

    /// Anomaly score for one standardized sample, in (-1, 0].
    pub fn score_sample(&self, values: &[f64]) -> f64 {
        let mean_path: f64 = self
            .trees
            .iter()
            .map(|t| path_length(t, values, 0))
            .sum::<f64>()
            / self.trees.len() as f64;

        let c = average_path_length(self.subsample_size);
        -(2.0f64.powf(-mean_path / c))
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

fn build_node(
    data: &Array2<f64>,
    idx: &[usize],
    depth: usize,
    depth_limit: usize,
    rng: &mut StdRng,
) -> Node {
    if idx.len() <= 1 || depth >= depth_limit {
        return Node::Leaf { size: idx.len() };
    }

    // Pick a feature with spread among the candidate features; all-constant
    // partitions terminate as leaves.
    let n_features = data.ncols();
    let start = rng.gen_range(0..n_features);
    let mut chosen = None;
    for off in 0..n_features {
        let f = (start + off) % n_features;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for &i in idx {
            let v = data[[i, f]];
            min = min.min(v);
            max = max.max(v);
        }
        if max > min {
            chosen = Some((f, min, max));
            break;
        }
    }
    let (feature, min, max) = match chosen {
        Some(c) => c,
        None => return Node::Leaf { size: idx.len() },
    };

    let threshold = rng.gen_range(min..max);
    let (left_idx, right_idx): (Vec<usize>, Vec<usize>) =
        idx.iter().partition(|&&i| data[[i, feature]] < threshold);

    Node::Split {
        feature,
        threshold,
        left: Box::new(build_node(data, &left_idx, depth + 1, depth_limit, rng)),
        right: Box::new(build_node(data, &right_idx, depth + 1, depth_limit, rng)),
    }
}

fn path_length(node: &Node, values: &[f64], depth: usize) -> f64 {
    match node {
        Node::Leaf { size } => depth as f64 + average_path_length(*size),
        Node::Split {
            feature,
            threshold,
            left,
            right,
        } => {
            let next = if values[*feature] < *threshold {
                left
            } else {
                right
            };
            path_length(next, values, depth + 1)
        }
    }
}

/// c(n): expected path length of an unsuccessful BST search over n points,
/// the normalizer from the isolation forest paper.
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        n => {
            let n = n as f64;
            let harmonic = (n - 1.0).ln() + EULER_GAMMA;
            2.0 * harmonic - 2.0 * (n - 1.0) / n
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn clustered_data() -> Array2<f64> {
        // Tight cluster around (0, 0) with mild jitter.
        let mut rows = Vec::new();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            rows.push(rng.gen_range(-1.0..1.0));
            rows.push(rng.gen_range(-1.0..1.0));
        }
        Array2::from_shape_vec((200, 2), rows).unwrap()
    }

    #[test]
    fn test_scores_in_range() {
        let data = clustered_data();
        let mut rng = StdRng::seed_from_u64(42);
        let forest = IsolationForest::fit(&data, &mut rng);

        for row in data.rows() {
            let s = forest.score_sample(row.as_slice().unwrap());
            assert!(s > -1.0 && s <= 0.0, "score {} out of range", s);
        }
    }

    #[test]
    fn test_outlier_scores_lower_than_inliers() {
        let data = clustered_data();
        let mut rng = StdRng::seed_from_u64(42);
        let forest = IsolationForest::fit(&data, &mut rng);

        let inlier = forest.score_sample(&[0.1, -0.2]);
        let outlier = forest.score_sample(&[50.0, 50.0]);
        assert!(
            outlier < inlier,
            "outlier {} should score below inlier {}",
            outlier,
            inlier
        );
    }

    #[test]
    fn test_fit_is_deterministic_for_a_seed() {
        let data = clustered_data();
        let f1 = IsolationForest::fit(&data, &mut StdRng::seed_from_u64(9));
        let f2 = IsolationForest::fit(&data, &mut StdRng::seed_from_u64(9));

        let probe = [3.0, -3.0];
        assert_eq!(f1.score_sample(&probe), f2.score_sample(&probe));
    }

    #[test]
    fn test_average_path_length_growth() {
        assert_eq!(average_path_length(0), 0.0);
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        assert!(average_path_length(256) > average_path_length(16));
    }

    #[test]
    fn test_serde_round_trip_preserves_scores() {
        let data = clustered_data();
        let forest = IsolationForest::fit(&data, &mut StdRng::seed_from_u64(1));

        let json = serde_json::to_string(&forest).unwrap();
        let restored: IsolationForest = serde_json::from_str(&json).unwrap();

        let probe = [0.5, 0.5];
        assert_eq!(forest.score_sample(&probe), restored.score_sample(&probe));
    }
}
