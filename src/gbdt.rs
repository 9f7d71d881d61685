use crate::error::Result;
use crate::model::{check_prediction_set, check_training_set, encode_labels, Classifier};
use crate::param::Boosting;
use crate::tree::{NewtonParams, Tree, TreeParams};
use crate::utils::softmax;
use log::debug;
use serde::{Deserialize, Serialize};
use statrs::function::logistic::logistic;

const PROBA_EPSILON: f64 = 1e-15;

/// Gradient-boosted regression trees on the logistic loss (Newton steps).
///
/// Two classes use a single raw score; more classes use a softmax over one
/// score per class, each round growing one tree per class.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GradientBoosting {
    pub n_rounds: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    pub lambda_l2: f64,
    pub min_hessian: f64,
    /// One entry per round, one tree per output inside a round
    pub trees: Vec<Vec<Tree>>,
    init: Vec<f64>,
    classes: Vec<u8>,
    n_features: usize,
}

impl GradientBoosting {
    pub fn new() -> GradientBoosting {
        GradientBoosting::from_param(&Boosting::default())
    }

    pub fn from_param(param: &Boosting) -> GradientBoosting {
        GradientBoosting {
            n_rounds: param.n_rounds,
            learning_rate: param.learning_rate,
            max_depth: param.max_depth,
            min_samples_leaf: param.min_samples_leaf,
            lambda_l2: param.lambda_l2,
            min_hessian: param.min_hessian,
            trees: Vec::new(),
            init: Vec::new(),
            classes: Vec::new(),
            n_features: 0,
        }
    }

    /// Number of times each input column is used to split, over all trees
    pub fn feature_importance(&self) -> Vec<usize> {
        let mut importance = vec![0; self.n_features];
        for tree in self.trees.iter().flatten() {
            for (total, count) in importance.iter_mut().zip(tree.split_counts(self.n_features)) {
                *total += count;
            }
        }
        importance
    }

    fn n_outputs(&self) -> usize {
        if self.classes.len() == 2 {
            1
        } else {
            self.classes.len()
        }
    }

    fn raw_scores(&self, row: &[f64]) -> Vec<f64> {
        let mut raw = self.init.clone();
        for round in &self.trees {
            for (k, tree) in round.iter().enumerate() {
                raw[k] += self.learning_rate * tree.leaf_value(row)[0];
            }
        }
        raw
    }

    fn raw_to_proba(&self, raw: &[f64]) -> Vec<f64> {
        if raw.len() == 1 {
            let p = logistic(raw[0]);
            vec![1.0 - p, p]
        } else {
            softmax(raw)
        }
    }
}

impl Default for GradientBoosting {
    fn default() -> Self {
        Self::new()
    }
}

impl Classifier for GradientBoosting {
    fn fit(&mut self, X: &[Vec<f64>], y: &[u8]) -> Result<()> {
        self.classes = check_training_set(X, y)?;
        self.n_features = X[0].len();
        self.trees = Vec::with_capacity(self.n_rounds);
        let labels = encode_labels(y, &self.classes);
        let n = X.len();
        let n_outputs = self.n_outputs();

        // Prior log-odds (binary) or log-priors (softmax)
        let priors: Vec<f64> = (0..self.classes.len())
            .map(|k| {
                let count = labels.iter().filter(|l| **l == k).count() as f64;
                (count / n as f64).clamp(PROBA_EPSILON, 1.0 - PROBA_EPSILON)
            })
            .collect();
        self.init = if n_outputs == 1 {
            vec![(priors[1] / (1.0 - priors[1])).ln()]
        } else {
            priors.iter().map(|p| p.ln()).collect()
        };

        let params = TreeParams {
            max_depth: self.max_depth,
            min_samples_split: 2,
            min_samples_leaf: self.min_samples_leaf,
            max_features: self.n_features,
        };
        let newton = NewtonParams { lambda_l2: self.lambda_l2, min_hessian: self.min_hessian };

        let mut raw: Vec<Vec<f64>> = vec![self.init.clone(); n];
        for round in 0..self.n_rounds {
            let proba: Vec<Vec<f64>> = raw.iter().map(|r| self.raw_to_proba(r)).collect();
            let mut round_trees = Vec::with_capacity(n_outputs);
            for k in 0..n_outputs {
                // the binary score models the second class
                let column = if n_outputs == 1 { 1 } else { k };
                let grad: Vec<f64> = (0..n)
                    .map(|i| proba[i][column] - if labels[i] == column { 1.0 } else { 0.0 })
                    .collect();
                let hess: Vec<f64> = (0..n)
                    .map(|i| (proba[i][column] * (1.0 - proba[i][column])).max(PROBA_EPSILON))
                    .collect();

                let tree = Tree::grow_newton(X, &grad, &hess, (0..n).collect(), &params, &newton);
                for (i, row) in X.iter().enumerate() {
                    raw[i][k] += self.learning_rate * tree.leaf_value(row)[0];
                }
                round_trees.push(tree);
            }
            self.trees.push(round_trees);

            if round % 25 == 0 {
                debug!("boosting round {} / {}", round + 1, self.n_rounds);
            }
        }

        Ok(())
    }

    fn predict_proba(&self, X: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        check_prediction_set(X, self.n_features)?;
        Ok(X.iter().map(|row| self.raw_to_proba(&self.raw_scores(row))).collect())
    }

    fn classes(&self) -> &[u8] {
        &self.classes
    }

    fn name(&self) -> &str {
        "GradientBoosting"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EvomalError;

    fn create_test_boosting() -> GradientBoosting {
        let mut param = Boosting::default();
        param.n_rounds = 20;
        param.min_samples_leaf = 2;
        GradientBoosting::from_param(&param)
    }

    #[test]
    fn test_boosting_binary() {
        let X: Vec<Vec<f64>> = (0..30).map(|i| vec![i as f64, (i % 3) as f64]).collect();
        let y: Vec<u8> = (0..30).map(|i| if i < 15 { 0 } else { 1 }).collect();
        let mut model = create_test_boosting();
        model.fit(&X, &y).unwrap();

        assert_eq!(model.trees.len(), 20);
        assert!(model.trees.iter().all(|round| round.len() == 1), "binary boosting grows one tree per round");
        assert_eq!(model.predict(&X).unwrap(), y);

        let proba = model.predict_proba(&[vec![0.0, 0.0], vec![29.0, 2.0]]).unwrap();
        assert!(proba[0][1] < 0.5 && proba[1][1] > 0.5);
        assert!((proba[0][0] + proba[0][1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_boosting_multiclass() {
        let X: Vec<Vec<f64>> = (0..30).map(|i| vec![i as f64]).collect();
        let y: Vec<u8> = (0..30).map(|i| (i / 10) as u8).collect();
        let mut model = create_test_boosting();
        model.fit(&X, &y).unwrap();

        assert!(model.trees.iter().all(|round| round.len() == 3), "softmax boosting grows one tree per class");
        assert_eq!(model.classes(), &[0, 1, 2]);
        assert_eq!(model.predict(&X).unwrap(), y);
    }

    #[test]
    fn test_boosting_init_is_log_odds() {
        let X: Vec<Vec<f64>> = (0..4).map(|i| vec![i as f64]).collect();
        let mut param = Boosting::default();
        param.n_rounds = 1;
        let mut model = GradientBoosting::from_param(&param);
        model.fit(&X, &[0, 1, 1, 1]).unwrap();
        assert!((model.init[0] - 3f64.ln()).abs() < 1e-12, "init should be log(3/1)");
        // 4 samples cannot fill two leaves of 20, and gradients sum to zero at the prior
        let proba = model.predict_proba(&X).unwrap();
        assert!(proba.iter().all(|p| (p[1] - 0.75).abs() < 1e-9), "a single leaf keeps the prior");
    }

    #[test]
    fn test_feature_importance_counts_splits() {
        let X: Vec<Vec<f64>> = (0..30).map(|i| vec![i as f64, 1.0]).collect();
        let y: Vec<u8> = (0..30).map(|i| if i < 15 { 0 } else { 1 }).collect();
        let mut model = create_test_boosting();
        model.fit(&X, &y).unwrap();
        let importance = model.feature_importance();
        assert_eq!(importance.len(), 2);
        assert!(importance[0] > 0, "the informative column should be used");
        assert_eq!(importance[1], 0, "a constant column can never split");
    }

    #[test]
    fn test_boosting_rejects_empty_subset() {
        let mut model = create_test_boosting();
        let result = model.fit(&[vec![], vec![]], &[0, 1]);
        assert!(matches!(result, Err(EvomalError::EmptySubset(_))));
    }
}
