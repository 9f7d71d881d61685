use crate::error::{EvomalError, Result};
use crate::utils::{argmax, unique_classes};

//-----------------------------------------------------------------------------
// Classifier capability shared by every learner
//-----------------------------------------------------------------------------

/// Minimal contract shared by the fitness proxy, the base learners and the ensemble.
///
/// `predict_proba` returns one row per sample and one column per class, columns
/// following the sorted class codes seen during `fit` (see `classes`).
pub trait Classifier: Send + Sync {
    /// Train the model on a row-major matrix and aligned labels
    fn fit(&mut self, X: &[Vec<f64>], y: &[u8]) -> Result<()>;

    /// Per-class probabilities
    fn predict_proba(&self, X: &[Vec<f64>]) -> Result<Vec<Vec<f64>>>;

    /// Class codes learnt during `fit`, in probability column order
    fn classes(&self) -> &[u8];

    /// Human readable model name
    fn name(&self) -> &str;

    /// Hard labels: the most probable class of each row
    fn predict(&self, X: &[Vec<f64>]) -> Result<Vec<u8>> {
        let classes = self.classes();
        Ok(self
            .predict_proba(X)?
            .iter()
            .map(|p| classes[argmax(p)])
            .collect())
    }
}

/// Validate a training set and return its sorted classes.
///
/// Training fails on an empty subset, misaligned labels or a single class.
pub fn check_training_set(X: &[Vec<f64>], y: &[u8]) -> Result<Vec<u8>> {
    if X.is_empty() {
        return Err(EvomalError::Data("no training sample".to_string()));
    }
    if X.len() != y.len() {
        return Err(EvomalError::ShapeMismatch {
            expected: format!("{} labels", X.len()),
            actual: format!("{} labels", y.len()),
        });
    }
    let n_features = X[0].len();
    if n_features == 0 {
        return Err(EvomalError::EmptySubset(
            "cannot train a model without any feature".to_string(),
        ));
    }
    if let Some(i) = X.iter().position(|row| row.len() != n_features) {
        return Err(EvomalError::ShapeMismatch {
            expected: format!("{} columns", n_features),
            actual: format!("{} columns in row {}", X[i].len(), i),
        });
    }
    let classes = unique_classes(y);
    if classes.len() < 2 {
        return Err(EvomalError::SingleClass(classes[0]));
    }
    Ok(classes)
}

/// Validate that a matrix can be scored by a model trained on `n_features` columns
pub fn check_prediction_set(X: &[Vec<f64>], n_features: usize) -> Result<()> {
    if n_features == 0 {
        return Err(EvomalError::NotFitted("model has not been trained".to_string()));
    }
    if let Some(i) = X.iter().position(|row| row.len() != n_features) {
        return Err(EvomalError::ShapeMismatch {
            expected: format!("{} columns", n_features),
            actual: format!("{} columns in row {}", X[i].len(), i),
        });
    }
    Ok(())
}

/// Position of each label inside `classes`
pub fn encode_labels(y: &[u8], classes: &[u8]) -> Vec<usize> {
    y.iter()
        .map(|c| classes.iter().position(|k| k == c).unwrap_or(0))
        .collect()
}

/// Probability of the positive class, i.e. the last probability column
pub fn positive_proba(proba: &[Vec<f64>]) -> Vec<f64> {
    proba
        .iter()
        .map(|p| p.last().copied().unwrap_or(0.0))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_training_set_returns_sorted_classes() {
        let X = vec![vec![0.0], vec![1.0], vec![2.0]];
        assert_eq!(check_training_set(&X, &[2, 0, 2]).unwrap(), vec![0, 2]);
    }

    #[test]
    fn test_check_training_set_single_class() {
        let X = vec![vec![0.0], vec![1.0]];
        assert!(matches!(check_training_set(&X, &[1, 1]), Err(EvomalError::SingleClass(1))));
    }

    #[test]
    fn test_check_training_set_empty_subset() {
        let X = vec![vec![], vec![]];
        assert!(matches!(check_training_set(&X, &[0, 1]), Err(EvomalError::EmptySubset(_))));
    }

    #[test]
    fn test_check_training_set_misaligned() {
        let X = vec![vec![0.0], vec![1.0]];
        assert!(matches!(check_training_set(&X, &[0]), Err(EvomalError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_check_prediction_set() {
        assert!(check_prediction_set(&[vec![1.0, 2.0]], 2).is_ok());
        assert!(check_prediction_set(&[vec![1.0]], 2).is_err());
        assert!(matches!(check_prediction_set(&[vec![1.0]], 0), Err(EvomalError::NotFitted(_))));
    }

    #[test]
    fn test_encode_labels_and_positive_proba() {
        assert_eq!(encode_labels(&[3, 1, 3], &[1, 3]), vec![1, 0, 1]);
        assert_eq!(positive_proba(&[vec![0.2, 0.8], vec![0.9, 0.1]]), vec![0.8, 0.1]);
    }
}
