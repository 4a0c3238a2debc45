//! Isolation Forest scoring
//!
//! Trees are stored as parallel node arrays (the layout training tooling
//! exports): `children_left[i] == -1` marks a leaf. Samples with
//! `x[feature] <= threshold` go left, with `x` rounded to `f32` first since
//! the trees were grown on single-precision input.
//!
//! Score for a sample `x`:
//! - `h(x)`: depth of the reached leaf plus `c(n_leaf)`
//! - `score = 2^(-mean(h) / c(max_samples))`
//! - `decision = -score - offset`; negative decision is an outlier

use serde::Deserialize;

use super::inference::{Classifier, InferenceError, Prediction, INLIER_LABEL, OUTLIER_LABEL};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Marker for "no child" in the node arrays
const TREE_LEAF: i64 = -1;

fn default_offset() -> f64 {
    -0.5
}

#[derive(Debug, Clone, Deserialize)]
pub struct IsolationForest {
    /// Sub-sample size each tree was grown on
    pub max_samples: u64,
    #[serde(default = "default_offset")]
    pub offset: f64,
    pub trees: Vec<IsolationTree>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IsolationTree {
    pub children_left: Vec<i64>,
    pub children_right: Vec<i64>,
    pub feature: Vec<i64>,
    pub threshold: Vec<f64>,
    pub n_node_samples: Vec<u64>,
    /// Tree-local feature index -> schema index, when the tree was grown on a
    /// feature subset
    #[serde(default)]
    pub features: Option<Vec<usize>>,
}

/// Average path length of an unsuccessful BST search over `n` samples
pub fn average_path_length(n: u64) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

impl IsolationTree {
    fn node_count(&self) -> usize {
        self.children_left.len()
    }

    fn is_leaf(&self, node: usize) -> bool {
        self.children_left[node] == TREE_LEAF
    }

    fn schema_feature(&self, node: usize) -> Option<usize> {
        let local = usize::try_from(self.feature[node]).ok()?;
        match &self.features {
            Some(map) => map.get(local).copied(),
            None => Some(local),
        }
    }

    fn validate(&self, tree_index: usize, feature_count: usize) -> Result<(), String> {
        let n = self.node_count();
        if n == 0 {
            return Err(format!("tree {tree_index} has no nodes"));
        }
        if [
            self.children_right.len(),
            self.feature.len(),
            self.threshold.len(),
            self.n_node_samples.len(),
        ]
        .iter()
        .any(|&len| len != n)
        {
            return Err(format!("tree {tree_index} has node arrays of different lengths"));
        }

        for node in 0..n {
            let (left, right) = (self.children_left[node], self.children_right[node]);
            if (left == TREE_LEAF) != (right == TREE_LEAF) {
                return Err(format!("tree {tree_index} node {node} has a single child"));
            }
            if left == TREE_LEAF {
                continue;
            }
            // Children always come after their parent, which also rules out cycles
            for child in [left, right] {
                let in_range = usize::try_from(child)
                    .map(|c| c > node && c < n)
                    .unwrap_or(false);
                if !in_range {
                    return Err(format!(
                        "tree {tree_index} node {node} points to invalid child {child}"
                    ));
                }
            }
            match self.schema_feature(node) {
                Some(f) if f < feature_count => {}
                _ => {
                    return Err(format!(
                        "tree {tree_index} node {node} splits on feature {} outside the schema",
                        self.feature[node]
                    ))
                }
            }
            if self.threshold[node].is_nan() {
                return Err(format!("tree {tree_index} node {node} has a NaN threshold"));
            }
        }
        Ok(())
    }

    /// Path length for one sample; assumes a validated tree
    fn path_length(&self, x: &[f64]) -> f64 {
        let mut node = 0usize;
        let mut depth = 0.0;
        while !self.is_leaf(node) {
            let value = self.schema_feature(node).and_then(|f| x.get(f)).copied().unwrap_or(0.0);
            let next = if f64::from(value as f32) <= self.threshold[node] {
                self.children_left[node]
            } else {
                self.children_right[node]
            };
            node = next as usize;
            depth += 1.0;
        }
        depth + average_path_length(self.n_node_samples[node])
    }
}

impl IsolationForest {
    /// Structural checks against the schema size. Run once at load.
    pub fn validate(&self, feature_count: usize) -> Result<(), String> {
        if self.trees.is_empty() {
            return Err("isolation forest has no trees".to_string());
        }
        if self.max_samples == 0 {
            return Err("max_samples must be at least 1".to_string());
        }
        if !self.offset.is_finite() {
            return Err("offset must be finite".to_string());
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(i, feature_count)?;
        }
        Ok(())
    }

    /// Anomaly score in (0, 1]; higher is more anomalous
    pub fn anomaly_score(&self, x: &[f64]) -> f64 {
        let mean_depth = self.trees.iter().map(|t| t.path_length(x)).sum::<f64>()
            / self.trees.len() as f64;
        let normalizer = average_path_length(self.max_samples);
        if normalizer == 0.0 {
            return 1.0;
        }
        2f64.powf(-mean_depth / normalizer)
    }

    pub fn decision_function(&self, x: &[f64]) -> f64 {
        -self.anomaly_score(x) - self.offset
    }
}

impl Classifier for IsolationForest {
    fn model_type(&self) -> &'static str {
        "isolation_forest"
    }

    fn predict(&self, features: &[f64]) -> Result<Prediction, InferenceError> {
        if let Some(i) = features.iter().position(|v| !v.is_finite()) {
            return Err(InferenceError::Input(format!("feature {i} is not finite")));
        }

        let decision = self.decision_function(features);
        Ok(Prediction {
            label: if decision < 0.0 { OUTLIER_LABEL } else { INLIER_LABEL },
            decision,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Root splits feature 0 at 30.0: a crowded left leaf and a lonely right leaf
    fn stump_forest() -> IsolationForest {
        IsolationForest {
            max_samples: 201,
            offset: -0.5,
            trees: vec![IsolationTree {
                children_left: vec![1, -1, -1],
                children_right: vec![2, -1, -1],
                feature: vec![0, -2, -2],
                threshold: vec![30.0, -2.0, -2.0],
                n_node_samples: vec![201, 200, 1],
                features: None,
            }],
        }
    }

    #[test]
    fn test_average_path_length() {
        assert_eq!(average_path_length(0), 0.0);
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        // 2 * (ln(255) + gamma) - 2 * 255 / 256
        let c256 = average_path_length(256);
        assert!((c256 - 10.2448).abs() < 1e-3, "c(256) = {c256}");
    }

    #[test]
    fn test_crowded_leaf_is_inlier() {
        let forest = stump_forest();
        let p = forest.predict(&[20.0, 0.0]).unwrap();
        assert_eq!(p.label, INLIER_LABEL);
        assert!(p.decision > 0.0);
    }

    #[test]
    fn test_isolated_leaf_is_outlier() {
        let forest = stump_forest();
        let p = forest.predict(&[40.0, 0.0]).unwrap();
        assert_eq!(p.label, OUTLIER_LABEL);
        assert!(p.decision < 0.0);
        assert!(forest.anomaly_score(&[40.0, 0.0]) > forest.anomaly_score(&[20.0, 0.0]));
    }

    #[test]
    fn test_threshold_goes_left() {
        let forest = stump_forest();
        assert_eq!(forest.predict(&[30.0, 0.0]).unwrap().label, INLIER_LABEL);
    }

    #[test]
    fn test_split_compares_at_single_precision() {
        let forest = stump_forest();
        // Rounds to exactly 30.0 as f32
        assert_eq!(forest.predict(&[30.000_000_1, 0.0]).unwrap().label, INLIER_LABEL);
        // Next f32 above 30.0 goes right
        let above = f64::from(f32::from_bits(30.0f32.to_bits() + 1));
        assert_eq!(forest.predict(&[above, 0.0]).unwrap().label, OUTLIER_LABEL);
    }

    #[test]
    fn test_feature_subset_mapping() {
        let mut forest = stump_forest();
        // Local feature 0 is schema feature 1
        forest.trees[0].features = Some(vec![1]);
        assert!(forest.validate(2).is_ok());
        assert_eq!(forest.predict(&[99.0, 10.0]).unwrap().label, INLIER_LABEL);
        assert_eq!(forest.predict(&[0.0, 99.0]).unwrap().label, OUTLIER_LABEL);
    }

    #[test]
    fn test_rejects_non_finite_input() {
        let forest = stump_forest();
        assert!(forest.predict(&[f64::INFINITY, 0.0]).is_err());
    }

    #[test]
    fn test_validate_accepts_stump() {
        assert!(stump_forest().validate(2).is_ok());
    }

    #[test]
    fn test_validate_rejects_feature_outside_schema() {
        let forest = stump_forest();
        let err = forest.validate(0).unwrap_err();
        assert!(err.contains("outside the schema"), "{err}");
    }

    #[test]
    fn test_validate_rejects_backward_child() {
        let mut forest = stump_forest();
        forest.trees[0].children_left[0] = 0;
        assert!(forest.validate(2).is_err());
    }

    #[test]
    fn test_validate_rejects_ragged_arrays() {
        let mut forest = stump_forest();
        forest.trees[0].threshold.pop();
        assert!(forest.validate(2).is_err());
    }

    #[test]
    fn test_validate_rejects_empty_forest() {
        let mut forest = stump_forest();
        forest.trees.clear();
        assert!(forest.validate(2).is_err());
    }
}
