use crate::utils::{round_to, unique_classes};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Rounding applied to every reported metric
pub const METRIC_DIGITS: i32 = 4;

/// Quality of a set of predictions, every value in [0, 1] and rounded to 4 decimals
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct MetricsRecord {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub auc: f64,
}

impl MetricsRecord {
    pub const KEYS: [&'static str; 5] = ["accuracy", "precision", "recall", "f1", "auc"];

    /// Ordered (name, value) view of the record
    pub fn to_map(&self) -> Vec<(&'static str, f64)> {
        Self::KEYS
            .iter()
            .copied()
            .zip([self.accuracy, self.precision, self.recall, self.f1, self.auc])
            .collect()
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.to_map().into_iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }
}

impl fmt::Display for MetricsRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let line = self
            .to_map()
            .iter()
            .map(|(k, v)| format!("{} {:.4}", k, v))
            .collect::<Vec<_>>()
            .join(" | ");
        write!(f, "{}", line)
    }
}

/// Compute the full record from true labels, hard predictions and per-class probabilities.
///
/// Never fails: metrics that cannot be computed are reported as 0.
pub fn evaluate(y_true: &[u8], y_pred: &[u8], proba: &[Vec<f64>]) -> MetricsRecord {
    let (precision, recall, f1) = precision_recall_f1(y_true, y_pred);
    MetricsRecord {
        accuracy: round_to(accuracy(y_true, y_pred), METRIC_DIGITS),
        precision: round_to(precision, METRIC_DIGITS),
        recall: round_to(recall, METRIC_DIGITS),
        f1: round_to(f1, METRIC_DIGITS),
        auc: round_to(roc_auc(y_true, proba).unwrap_or(0.0), METRIC_DIGITS),
    }
}

pub fn accuracy(y_true: &[u8], y_pred: &[u8]) -> f64 {
    if y_true.is_empty() || y_true.len() != y_pred.len() {
        return 0.0;
    }
    let correct = y_true.iter().zip(y_pred.iter()).filter(|(t, p)| t == p).count();
    correct as f64 / y_true.len() as f64
}

/// Support weighted precision, recall and F1 over the labels present in truth or predictions
pub fn precision_recall_f1(y_true: &[u8], y_pred: &[u8]) -> (f64, f64, f64) {
    if y_true.is_empty() || y_true.len() != y_pred.len() {
        return (0.0, 0.0, 0.0);
    }
    let mut labels: Vec<u8> = y_true.iter().chain(y_pred.iter()).copied().collect();
    labels = unique_classes(&labels);

    let total = y_true.len() as f64;
    let (mut precision, mut recall, mut f1) = (0.0, 0.0, 0.0);
    for label in labels {
        let support = y_true.iter().filter(|t| **t == label).count() as f64;
        if support == 0.0 {
            continue;
        }
        let predicted = y_pred.iter().filter(|p| **p == label).count() as f64;
        let tp = y_true
            .iter()
            .zip(y_pred.iter())
            .filter(|(t, p)| **t == label && **p == label)
            .count() as f64;

        let p = if predicted > 0.0 { tp / predicted } else { 0.0 };
        let r = tp / support;
        let f = if p + r > 0.0 { 2.0 * p * r / (p + r) } else { 0.0 };

        let weight = support / total;
        precision += weight * p;
        recall += weight * r;
        f1 += weight * f;
    }
    (precision, recall, f1)
}

/// Support weighted F-measure
pub fn weighted_f1(y_true: &[u8], y_pred: &[u8]) -> f64 {
    precision_recall_f1(y_true, y_pred).2
}

/// ROC-AUC: binary on the second probability column, weighted one-vs-rest otherwise.
///
/// Probability columns follow the sorted classes of `y_true`. `None` when the
/// score is undefined (single class, column mismatch, non finite probability).
pub fn roc_auc(y_true: &[u8], proba: &[Vec<f64>]) -> Option<f64> {
    if y_true.is_empty() || y_true.len() != proba.len() {
        return None;
    }
    if proba.iter().flatten().any(|p| !p.is_finite()) {
        return None;
    }
    let classes = unique_classes(y_true);

    match classes.len() {
        0 | 1 => None,
        2 => {
            if proba.iter().any(|p| p.len() < 2) {
                return None;
            }
            let positive: Vec<bool> = y_true.iter().map(|t| *t == classes[1]).collect();
            let scores: Vec<f64> = proba.iter().map(|p| p[1]).collect();
            binary_auc(&positive, &scores)
        }
        n_classes => {
            if proba.iter().any(|p| p.len() != n_classes) {
                return None;
            }
            let total = y_true.len() as f64;
            let mut weighted = 0.0;
            for (column, class) in classes.iter().enumerate() {
                let positive: Vec<bool> = y_true.iter().map(|t| t == class).collect();
                let scores: Vec<f64> = proba.iter().map(|p| p[column]).collect();
                let support = positive.iter().filter(|p| **p).count() as f64;
                weighted += support / total * binary_auc(&positive, &scores)?;
            }
            Some(weighted)
        }
    }
}

/// Mann-Whitney formulation of the area under the ROC curve, ties get average ranks
fn binary_auc(positive: &[bool], scores: &[f64]) -> Option<f64> {
    let n_pos = positive.iter().filter(|p| **p).count();
    let n_neg = positive.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|a, b| scores[*a].total_cmp(&scores[*b]));

    let mut ranks = vec![0.0; scores.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        let average_rank = (i + j) as f64 / 2.0 + 1.0;
        for k in i..=j {
            ranks[order[k]] = average_rank;
        }
        i = j + 1;
    }

    let positive_ranks: f64 = positive
        .iter()
        .zip(ranks.iter())
        .filter(|(p, _)| **p)
        .map(|(_, r)| r)
        .sum();
    let n_pos = n_pos as f64;
    Some((positive_ranks - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg as f64))
}
