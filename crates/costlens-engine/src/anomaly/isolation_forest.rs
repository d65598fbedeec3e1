//! Isolation forest outlier scoring.
//!
//! Each tree recursively splits a random subsample on a random feature at a
//! uniformly random threshold until points are isolated or the depth limit
//! `ceil(log2(max_samples))` is hit. Points that isolate in few splits are
//! outliers.
//!
//! `score_samples` returns `-2^(-E[h(x)] / c(n))`, in `[-1, 0)`, lower meaning
//! more anomalous. `decision_function` shifts that by the contamination
//! quantile of the training scores so that negative values are outliers.

use rand::rngs::StdRng;
use rand::seq::{SliceRandom, index};
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::stats;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Average path length of an unsuccessful BST search over `n` points.
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// A single isolation tree stored as a node arena; index 0 is the root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationTree {
    nodes: Vec<Node>,
}

impl IsolationTree {
    fn fit(data: &[Vec<f64>], sample: &[usize], max_depth: usize, rng: &mut StdRng) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.grow(data, sample.to_vec(), 0, max_depth, rng);
        tree
    }

    fn grow(
        &mut self,
        data: &[Vec<f64>],
        indices: Vec<usize>,
        depth: usize,
        max_depth: usize,
        rng: &mut StdRng,
    ) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf {
            size: indices.len(),
        });

        if indices.len() <= 1 || depth >= max_depth {
            return id;
        }

        // Try features in random order, take the first one that is not constant here
        let n_features = data[indices[0]].len();
        let mut features: Vec<usize> = (0..n_features).collect();
        features.shuffle(rng);

        let split = features.into_iter().find_map(|feature| {
            let (lo, hi) = indices.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |acc, &i| {
                (acc.0.min(data[i][feature]), acc.1.max(data[i][feature]))
            });
            (hi > lo).then_some((feature, lo, hi))
        });

        let Some((feature, lo, hi)) = split else {
            return id;
        };

        let threshold = lo + rng.random::<f64>() * (hi - lo);
        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) =
            indices.into_iter().partition(|&i| data[i][feature] < threshold);

        let left = self.grow(data, left_idx, depth + 1, max_depth, rng);
        let right = self.grow(data, right_idx, depth + 1, max_depth, rng);
        self.nodes[id] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        id
    }

    /// Path length of `x`, including the expected depth below a leaf.
    fn path_length(&self, x: &[f64]) -> f64 {
        let mut node = 0;
        let mut depth = 0.0;
        loop {
            match &self.nodes[node] {
                Node::Leaf { size } => return depth + average_path_length(*size),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if x[*feature] < *threshold { *left } else { *right };
                    depth += 1.0;
                }
            }
        }
    }
}

/// Parameters for fitting an [`IsolationForest`].
#[derive(Debug, Clone, Copy)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_samples: usize,
    pub contamination: f64,
    pub seed: u64,
}

/// A fitted isolation forest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    sample_size: usize,
    n_features: usize,
    offset: f64,
}

impl IsolationForest {
    /// Fit the forest on a row-major matrix.
    pub fn fit(data: &[Vec<f64>], params: ForestParams) -> Result<Self> {
        if data.is_empty() {
            return Err(EngineError::computation("cannot fit isolation forest on empty data"));
        }
        let n_features = data[0].len();
        if n_features == 0 || data.iter().any(|row| row.len() != n_features) {
            return Err(EngineError::computation("ragged or empty feature matrix"));
        }
        if data.iter().flatten().any(|v| !v.is_finite()) {
            return Err(EngineError::computation("feature matrix contains non-finite values"));
        }

        let sample_size = params.max_samples.clamp(1, data.len());
        let max_depth = (sample_size as f64).log2().ceil().max(1.0) as usize;
        let mut rng = StdRng::seed_from_u64(params.seed);

        let trees = (0..params.n_estimators.max(1))
            .map(|_| {
                let sample = index::sample(&mut rng, data.len(), sample_size).into_vec();
                IsolationTree::fit(data, &sample, max_depth, &mut rng)
            })
            .collect();

        let mut forest = Self {
            trees,
            sample_size,
            n_features,
            offset: 0.0,
        };

        let training_scores = forest.score_samples(data)?;
        forest.offset = stats::quantile(&training_scores, params.contamination.clamp(0.0, 0.5));
        Ok(forest)
    }

    /// Raw scores in `[-1, 0)`, lower is more anomalous.
    pub fn score_samples(&self, data: &[Vec<f64>]) -> Result<Vec<f64>> {
        let norm = average_path_length(self.sample_size).max(f64::MIN_POSITIVE);
        data.iter()
            .map(|row| {
                if row.len() != self.n_features {
                    return Err(EngineError::computation(format!(
                        "expected {} features, got {}",
                        self.n_features,
                        row.len()
                    )));
                }
                let mean_depth = self.trees.iter().map(|t| t.path_length(row)).sum::<f64>()
                    / self.trees.len() as f64;
                Ok(-(2.0_f64.powf(-mean_depth / norm)))
            })
            .collect()
    }

    /// Scores shifted so that negative values are outliers.
    pub fn decision_function(&self, data: &[Vec<f64>]) -> Result<Vec<f64>> {
        Ok(self
            .score_samples(data)?
            .into_iter()
            .map(|s| s - self.offset)
            .collect())
    }

    /// Threshold subtracted from raw scores.
    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Number of fitted trees.
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ForestParams {
        ForestParams {
            n_estimators: 100,
            max_samples: 256,
            contamination: 0.1,
            seed: 42,
        }
    }

    fn cluster_with_outlier() -> Vec<Vec<f64>> {
        let mut data: Vec<Vec<f64>> = (0..60)
            .map(|i| {
                let x = (i % 10) as f64 * 0.1;
                let y = (i / 10) as f64 * 0.1;
                vec![x, y]
            })
            .collect();
        data.push(vec![25.0, 25.0]);
        data
    }

    #[test]
    fn test_average_path_length() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        assert!(average_path_length(256) > average_path_length(16));
    }

    #[test]
    fn test_outlier_scores_lowest() {
        let data = cluster_with_outlier();
        let forest = IsolationForest::fit(&data, params()).unwrap();
        let scores = forest.score_samples(&data).unwrap();

        let outlier = *scores.last().unwrap();
        assert!(scores[..60].iter().all(|&s| s > outlier));
        assert!(scores.iter().all(|&s| (-1.0..0.0).contains(&s)));

        let decision = forest.decision_function(&data).unwrap();
        assert!(*decision.last().unwrap() < 0.0);
    }

    #[test]
    fn test_seeded_fit_is_deterministic() {
        let data = cluster_with_outlier();
        let a = IsolationForest::fit(&data, params()).unwrap();
        let b = IsolationForest::fit(&data, params()).unwrap();
        assert_eq!(a.score_samples(&data).unwrap(), b.score_samples(&data).unwrap());
        assert_eq!(a.n_trees(), 100);
    }

    #[test]
    fn test_constant_data_does_not_panic() {
        let data = vec![vec![1.0, 1.0]; 10];
        let forest = IsolationForest::fit(&data, params()).unwrap();
        let scores = forest.score_samples(&data).unwrap();
        assert!(scores.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_rejects_wrong_width() {
        let forest = IsolationForest::fit(&cluster_with_outlier(), params()).unwrap();
        assert!(forest.score_samples(&[vec![1.0]]).is_err());
    }
}
