use crate::error::Result;
use crate::model::{check_prediction_set, check_training_set, encode_labels, Classifier};
use crate::param::{Fitness, MaxFeatures};
use crate::tree::{Tree, TreeParams};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Bagged CART classification trees, probabilities are the mean of the leaf distributions
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RandomForest {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub max_features: MaxFeatures,
    pub seed: u64,
    pub trees: Vec<Tree>,
    classes: Vec<u8>,
    n_features: usize,
}

impl RandomForest {
    pub fn new(n_trees: usize, max_features: MaxFeatures, seed: u64) -> RandomForest {
        RandomForest {
            n_trees,
            max_depth: 0,
            min_samples_split: 2,
            max_features,
            seed,
            trees: Vec::new(),
            classes: Vec::new(),
            n_features: 0,
        }
    }

    pub fn from_param(param: &Fitness, seed: u64) -> RandomForest {
        RandomForest {
            max_depth: param.max_depth,
            min_samples_split: param.min_samples_split,
            ..RandomForest::new(param.n_trees, param.max_features, seed)
        }
    }
}

impl Classifier for RandomForest {
    fn fit(&mut self, X: &[Vec<f64>], y: &[u8]) -> Result<()> {
        self.classes = check_training_set(X, y)?;
        self.n_features = X[0].len();
        let labels = encode_labels(y, &self.classes);
        let params = TreeParams {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: 1,
            max_features: self.max_features.resolve(self.n_features),
        };

        let n = X.len();
        self.trees = (0..self.n_trees)
            .map(|t| {
                let mut rng = ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(t as u64));
                let bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                Tree::grow_classifier(X, &labels, self.classes.len(), bootstrap, &params, &mut rng)
            })
            .collect();

        Ok(())
    }

    fn predict_proba(&self, X: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        check_prediction_set(X, self.n_features)?;
        let n_trees = self.trees.len() as f64;
        Ok(X
            .iter()
            .map(|row| {
                let mut proba = vec![0.0; self.classes.len()];
                for tree in &self.trees {
                    for (p, v) in proba.iter_mut().zip(tree.leaf_value(row)) {
                        *p += v;
                    }
                }
                proba.iter().map(|p| p / n_trees).collect()
            })
            .collect())
    }

    fn classes(&self) -> &[u8] {
        &self.classes
    }

    fn name(&self) -> &str {
        "RandomForest"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EvomalError;

    fn create_test_matrix() -> (Vec<Vec<f64>>, Vec<u8>) {
        let X: Vec<Vec<f64>> = (0..40)
            .map(|i| vec![if i < 20 { 0.0 } else { 1.0 }, (i % 7) as f64, ((i * 3) % 5) as f64])
            .collect();
        let y: Vec<u8> = (0..40).map(|i| if i < 20 { 0 } else { 1 }).collect();
        (X, y)
    }

    #[test]
    fn test_forest_learns_separable_data() {
        let (X, y) = create_test_matrix();
        let mut forest = RandomForest::new(30, MaxFeatures::sqrt, 42);
        forest.fit(&X, &y).unwrap();
        assert_eq!(forest.trees.len(), 30);
        assert_eq!(forest.predict(&X).unwrap(), y, "training data should be recovered");

        let proba = forest.predict_proba(&X).unwrap();
        assert!(proba.iter().all(|p| (p.iter().sum::<f64>() - 1.0).abs() < 1e-9), "rows should be distributions");
    }

    #[test]
    fn test_forest_is_reproducible() {
        let (X, y) = create_test_matrix();
        let mut forest1 = RandomForest::new(5, MaxFeatures::sqrt, 7);
        let mut forest2 = RandomForest::new(5, MaxFeatures::sqrt, 7);
        forest1.fit(&X, &y).unwrap();
        forest2.fit(&X, &y).unwrap();
        assert_eq!(forest1.trees, forest2.trees, "the same seed must grow the same trees");
    }

    #[test]
    fn test_forest_rejects_single_class() {
        let mut forest = RandomForest::new(5, MaxFeatures::sqrt, 7);
        let result = forest.fit(&[vec![0.0], vec![1.0]], &[1, 1]);
        assert!(matches!(result, Err(EvomalError::SingleClass(1))));
    }

    #[test]
    fn test_forest_not_fitted() {
        let forest = RandomForest::new(5, MaxFeatures::sqrt, 7);
        assert!(matches!(forest.predict_proba(&[vec![0.0]]), Err(EvomalError::NotFitted(_))));
    }

    #[test]
    fn test_forest_from_param() {
        let forest = RandomForest::from_param(&Fitness::default(), 3);
        assert_eq!(forest.n_trees, 30);
        assert_eq!(forest.max_features, MaxFeatures::sqrt);
        assert_eq!(forest.seed, 3);
    }
}
