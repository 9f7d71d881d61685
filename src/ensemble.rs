use crate::error::{EvomalError, Result};
use crate::model::Classifier;
use crate::param::Ensemble as EnsembleParam;
use crate::utils::argmax;
use log::debug;
use serde::{Deserialize, Serialize};

/// Weighted sum of two probability vectors
pub fn combine(first: &[f64], second: &[f64], weights: (f64, f64)) -> Vec<f64> {
    first
        .iter()
        .zip(second.iter())
        .map(|(a, b)| weights.0 * a + weights.1 * b)
        .collect()
}

/// Soft voting over two classifiers trained on the same data.
///
/// Two classes: predict the greater class iff the combined probability of that
/// class reaches `threshold`. More classes: argmax of the combined distribution.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SoftVoting<A, B> {
    pub first: A,
    pub second: B,
    pub weights: [f64; 2],
    pub threshold: f64,
}

impl<A: Classifier, B: Classifier> SoftVoting<A, B> {
    pub fn new(first: A, second: B, param: &EnsembleParam) -> Result<SoftVoting<A, B>> {
        let [w1, w2] = param.weights;
        if w1 < 0.0 || w2 < 0.0 || ((w1 + w2) - 1.0).abs() > 1e-9 {
            return Err(EvomalError::Configuration(format!(
                "ensemble weights [{}, {}] must be non-negative and sum to 1",
                w1, w2
            )));
        }
        Ok(SoftVoting { first, second, weights: param.weights, threshold: param.threshold })
    }

    /// Per-class probabilities of both members, in member order
    pub fn member_proba(&self, X: &[Vec<f64>]) -> Result<(Vec<Vec<f64>>, Vec<Vec<f64>>)> {
        Ok((self.first.predict_proba(X)?, self.second.predict_proba(X)?))
    }
}

impl<A: Classifier, B: Classifier> Classifier for SoftVoting<A, B> {
    fn fit(&mut self, X: &[Vec<f64>], y: &[u8]) -> Result<()> {
        debug!("Fitting {}...", self.first.name());
        self.first.fit(X, y)?;
        debug!("Fitting {}...", self.second.name());
        self.second.fit(X, y)?;
        if self.first.classes() != self.second.classes() {
            return Err(EvomalError::ShapeMismatch {
                expected: format!("classes {:?}", self.first.classes()),
                actual: format!("classes {:?}", self.second.classes()),
            });
        }
        Ok(())
    }

    fn predict_proba(&self, X: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        let (first, second) = self.member_proba(X)?;
        let weights = (self.weights[0], self.weights[1]);
        Ok(first
            .iter()
            .zip(second.iter())
            .map(|(a, b)| combine(a, b, weights))
            .collect())
    }

    fn predict(&self, X: &[Vec<f64>]) -> Result<Vec<u8>> {
        let classes = self.classes();
        let proba = self.predict_proba(X)?;
        Ok(proba
            .iter()
            .map(|p| {
                if classes.len() == 2 {
                    if p[1] >= self.threshold {
                        classes[1]
                    } else {
                        classes[0]
                    }
                } else {
                    classes[argmax(p)]
                }
            })
            .collect())
    }

    fn classes(&self) -> &[u8] {
        self.first.classes()
    }

    fn name(&self) -> &str {
        "SoftVoting"
    }
}
