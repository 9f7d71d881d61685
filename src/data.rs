use crate::error::{EvomalError, Result};
use crate::utils::{mean_and_std, unique_classes};
use log::{info, warn};
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct Data {
    pub X: Vec<Vec<f64>>,       // Dense matrix, one row per sample
    pub y: Vec<u8>,             // Vector for target values
    pub features: Vec<String>,  // Feature names, column order is authoritative
    pub samples: Vec<String>,
    pub feature_len: usize,
    pub sample_len: usize,
    pub classes: Vec<String>,
}

/// Column-wise standardisation parameters
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Scaler {
    pub means: Vec<f64>,
    pub stds: Vec<f64>,
}

impl Data {
    /// Create a new `Data` instance with default values
    pub fn new() -> Data {
        Data {
            X: Vec::new(),
            y: Vec::new(),
            features: Vec::new(),
            samples: Vec::new(),
            feature_len: 0,
            sample_len: 0,
            classes: Vec::new(),
        }
    }

    /// Build a `Data` from an in-memory matrix, checking that rows, labels and feature names line up
    pub fn from_parts(X: Vec<Vec<f64>>, y: Vec<u8>, features: Vec<String>) -> Result<Data> {
        if X.len() != y.len() {
            return Err(EvomalError::ShapeMismatch {
                expected: format!("{} labels", X.len()),
                actual: format!("{} labels", y.len()),
            });
        }
        for (i, row) in X.iter().enumerate() {
            if row.len() != features.len() {
                return Err(EvomalError::ShapeMismatch {
                    expected: format!("{} columns", features.len()),
                    actual: format!("{} columns in row {}", row.len(), i),
                });
            }
            if row.iter().any(|v| !v.is_finite()) {
                return Err(EvomalError::Data(format!("row {} contains a non-finite value", i)));
            }
        }

        let sample_len = X.len();
        Ok(Data {
            feature_len: features.len(),
            sample_len,
            samples: (0..sample_len).map(|i| format!("row_{}", i)).collect(),
            X,
            y,
            features,
            classes: Vec::new(),
        })
    }

    /// Check if another dataset is compatible with the current one
    pub fn check_compatibility(&self, other: &Data) -> bool {
        self.features == other.features
    }

    /// Load a CSV table whose last column is the target.
    ///
    /// Rows with an empty cell are dropped, non numeric cells become 0.
    /// Integer targets are kept as class codes; other targets are coded
    /// following the sorted order of their distinct values.
    pub fn load_csv<P: AsRef<Path>>(path: P) -> Result<Data> {
        let path = path.as_ref();
        info!("Loading file {}...", path.display());
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)?;

        let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
        if headers.len() < 2 {
            return Err(EvomalError::Data(format!(
                "{} needs at least one feature column and a target column",
                path.display()
            )));
        }
        let features = headers[..headers.len() - 1].to_vec();

        let mut X: Vec<Vec<f64>> = Vec::new();
        let mut raw_targets: Vec<String> = Vec::new();
        let mut samples: Vec<String> = Vec::new();
        let mut dropped = 0;
        let mut coerced = 0;

        for (line, record) in reader.records().enumerate() {
            let record = record?;
            if record.len() != headers.len() || record.iter().any(|cell| cell.trim().is_empty()) {
                dropped += 1;
                continue;
            }
            let row: Vec<f64> = record
                .iter()
                .take(features.len())
                .map(|cell| match cell.trim().parse::<f64>() {
                    Ok(v) if v.is_finite() => v,
                    _ => {
                        coerced += 1;
                        0.0
                    }
                })
                .collect();
            X.push(row);
            raw_targets.push(record[headers.len() - 1].trim().to_string());
            samples.push(format!("row_{}", line));
        }

        if dropped > 0 {
            warn!("{} rows with missing values were dropped.", dropped);
        }
        if coerced > 0 {
            warn!("{} non numeric cells were set to 0.", coerced);
        }

        let (y, classes) = encode_targets(&raw_targets)?;

        let sample_len = X.len();
        Ok(Data {
            X,
            y,
            feature_len: features.len(),
            features,
            samples,
            sample_len,
            classes,
        })
    }

    pub fn set_classes(&mut self, classes: Vec<String>) {
        self.classes = classes;
    }

    /// Compute column means and standard deviations
    pub fn fit_scaler(&self) -> Scaler {
        let mut means = Vec::with_capacity(self.feature_len);
        let mut stds = Vec::with_capacity(self.feature_len);
        for j in 0..self.feature_len {
            let column: Vec<f64> = self.X.iter().map(|row| row[j]).collect();
            let (mean, std) = mean_and_std(&column);
            means.push(mean);
            // constant columns are only centered
            stds.push(if std > 0.0 { std } else { 1.0 });
        }
        Scaler { means, stds }
    }

    /// Apply a scaler in place
    pub fn standardize(&mut self, scaler: &Scaler) {
        for row in self.X.iter_mut() {
            for (j, value) in row.iter_mut().enumerate() {
                *value = (*value - scaler.means[j]) / scaler.stds[j];
            }
        }
    }

    /// Stratified hold-out split: returns (train, test) with about `test_ratio` of each class in test
    pub fn train_test_split(&self, test_ratio: f64, rng: &mut ChaCha8Rng) -> (Data, Data) {
        let mut train_idx: Vec<usize> = Vec::new();
        let mut test_idx: Vec<usize> = Vec::new();

        for class in unique_classes(&self.y) {
            let mut indices: Vec<usize> = (0..self.sample_len).filter(|i| self.y[*i] == class).collect();
            indices.shuffle(rng);
            let mut n_test = (indices.len() as f64 * test_ratio).round() as usize;
            if indices.len() > 1 {
                n_test = n_test.clamp(1, indices.len() - 1);
            } else {
                n_test = 0;
            }
            test_idx.extend_from_slice(&indices[..n_test]);
            train_idx.extend_from_slice(&indices[n_test..]);
        }

        train_idx.sort_unstable();
        test_idx.sort_unstable();

        (self.subset(train_idx), self.subset(test_idx))
    }

    /// filter Data for some samples (represented by a Vector of indices)
    pub fn subset(&self, samples: Vec<usize>) -> Data {
        Data {
            X: samples.iter().map(|i| self.X[*i].clone()).collect(),
            y: samples.iter().map(|i| self.y[*i]).collect(),
            features: self.features.clone(),
            samples: samples.iter().map(|i| self.samples[*i].clone()).collect(),
            feature_len: self.feature_len,
            sample_len: samples.len(),
            classes: self.classes.clone(),
        }
    }

    /// Restrict the matrix to some columns, keeping the given order
    pub fn select_features(&self, feature_indices: &[usize]) -> Data {
        Data {
            X: self
                .X
                .iter()
                .map(|row| feature_indices.iter().map(|j| row[*j]).collect())
                .collect(),
            y: self.y.clone(),
            features: feature_indices.iter().map(|j| self.features[*j].clone()).collect(),
            samples: self.samples.clone(),
            feature_len: feature_indices.len(),
            sample_len: self.sample_len,
            classes: self.classes.clone(),
        }
    }

    /// Number of samples per class code
    pub fn class_distribution(&self) -> HashMap<u8, usize> {
        let mut counts = HashMap::new();
        for class in &self.y {
            *counts.entry(*class).or_insert(0) += 1;
        }
        counts
    }

    /// Human readable name of a class code
    pub fn class_name(&self, class: u8) -> String {
        self.classes
            .get(class as usize)
            .cloned()
            .unwrap_or_else(|| format!("class {}", class))
    }
}

/// Turn raw target cells into class codes
fn encode_targets(raw: &[String]) -> Result<(Vec<u8>, Vec<String>)> {
    if let Ok(codes) = raw.iter().map(|v| v.parse::<u8>()).collect::<std::result::Result<Vec<u8>, _>>() {
        return Ok((codes, Vec::new()));
    }

    let mut names: Vec<String> = raw.to_vec();
    names.sort();
    names.dedup();
    if names.len() > u8::MAX as usize {
        return Err(EvomalError::Data(format!("too many target classes ({})", names.len())));
    }
    let codes = raw
        .iter()
        .map(|v| names.iter().position(|n| n == v).unwrap_or(0) as u8)
        .collect();
    Ok((codes, names))
}

impl fmt::Display for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Features: {}   Samples: {}", self.feature_len, self.sample_len)?;

        let features_string = self.features.join("\t");
        let truncated_features = if features_string.len() > 100 {
            format!("{}...", &features_string.chars().take(97).collect::<String>())
        } else {
            features_string
        };
        writeln!(f, "X:                  {}", truncated_features)?;

        // Limit to the first 20 rows
        for (i, row) in self.X.iter().take(20).enumerate() {
            let row_display: String = row
                .iter()
                .map(|v| format!("{:.2}", v))
                .collect::<Vec<_>>()
                .join("\t");

            let truncated_row = if row_display.len() > 80 {
                format!("{}...", &row_display[..77])
            } else {
                row_display
            };

            writeln!(f, "{:<20} {}\t| {}", self.samples[i], truncated_row, self.y[i])?;
        }

        let mut distribution: Vec<(u8, usize)> = self.class_distribution().into_iter().collect();
        distribution.sort();
        let distribution = distribution
            .iter()
            .map(|(class, count)| format!("{}: {}", self.class_name(*class), count))
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(f, "\ny: {}", distribution)?;

        Ok(())
    }
}

impl fmt::Debug for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Reuse the Display formatter
        write!(f, "{}", self)
    }
}

// unit tests
#[cfg(test)]
mod tests {
    use super::*;
    use crate::string_vec;
    use rand::SeedableRng;

    fn create_test_data() -> Data {
        let X = vec![
            vec![0.9, 0.01, 3.0],
            vec![0.0, 0.91, 3.0],
            vec![0.2, 0.0, 3.0],
            vec![0.12, 0.75, 3.0],
            vec![0.01, 0.0, 3.0],
            vec![0.0, 0.9, 3.0],
        ];
        let mut data = Data::from_parts(
            X,
            vec![0, 1, 0, 1, 1, 1],
            string_vec!["SEND_SMS", "READ_SMS", "chmod"],
        )
        .unwrap();
        data.set_classes(string_vec!["benign", "malware"]);
        data
    }

    #[test]
    fn test_from_parts_dimensions() {
        let data = create_test_data();
        assert_eq!(data.feature_len, 3);
        assert_eq!(data.sample_len, 6);
        assert_eq!(data.samples[5], "row_5");
    }

    #[test]
    fn test_from_parts_rejects_misaligned_labels() {
        let result = Data::from_parts(vec![vec![1.0], vec![2.0]], vec![0], string_vec!["f"]);
        assert!(matches!(result, Err(EvomalError::ShapeMismatch { .. })), "labels and rows must be aligned");
    }

    #[test]
    fn test_from_parts_rejects_ragged_rows() {
        let result = Data::from_parts(vec![vec![1.0, 2.0], vec![2.0]], vec![0, 1], string_vec!["f", "g"]);
        assert!(result.is_err(), "every row must have one value per feature");
    }

    #[test]
    fn test_from_parts_rejects_nan() {
        let result = Data::from_parts(vec![vec![f64::NAN]], vec![0], string_vec!["f"]);
        assert!(matches!(result, Err(EvomalError::Data(_))));
    }

    #[test]
    fn test_select_features_keeps_order() {
        let data = create_test_data();
        let restricted = data.select_features(&[0, 2]);
        assert_eq!(restricted.features, vec!["SEND_SMS", "chmod"]);
        assert_eq!(restricted.feature_len, 2);
        assert_eq!(restricted.X[0], vec![0.9, 3.0]);
        assert_eq!(restricted.y, data.y, "labels must be untouched by column selection");
    }

    #[test]
    fn test_subset_indices() {
        let data = create_test_data();
        let subset = data.subset(vec![0, 3]);
        assert_eq!(subset.X, vec![vec![0.9, 0.01, 3.0], vec![0.12, 0.75, 3.0]]);
        assert_eq!(subset.y, vec![0, 1]);
        assert_eq!(subset.samples, vec!["row_0", "row_3"]);
        assert_eq!(subset.sample_len, 2);
        assert_eq!(subset.feature_len, data.feature_len);
    }

    #[test]
    fn test_subset_empty_set() {
        let data = create_test_data();
        let subset = data.subset(vec![]);
        assert!(subset.X.is_empty());
        assert!(subset.y.is_empty());
        assert_eq!(subset.sample_len, 0);
        assert_eq!(subset.feature_len, data.feature_len, "an empty subset should keep its reference to features");
    }

    #[test]
    fn test_standardize_centers_and_scales() {
        let mut data = create_test_data();
        let scaler = data.fit_scaler();
        data.standardize(&scaler);

        for j in 0..2 {
            let column: Vec<f64> = data.X.iter().map(|row| row[j]).collect();
            let (mean, std) = mean_and_std(&column);
            assert!(mean.abs() < 1e-12, "column {} should be centered", j);
            assert!((std - 1.0).abs() < 1e-12, "column {} should have unit variance", j);
        }
        assert!(data.X.iter().all(|row| row[2] == 0.0), "a constant column is only centered");
    }

    #[test]
    fn test_train_test_split_is_stratified() {
        let X: Vec<Vec<f64>> = (0..50).map(|i| vec![i as f64]).collect();
        let y: Vec<u8> = (0..50).map(|i| if i < 40 { 0 } else { 1 }).collect();
        let data = Data::from_parts(X, y, string_vec!["f"]).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        let (train, test) = data.train_test_split(0.2, &mut rng);
        assert_eq!(train.sample_len + test.sample_len, 50, "no sample should be lost");
        assert_eq!(test.class_distribution()[&0], 8);
        assert_eq!(test.class_distribution()[&1], 2);

        let mut all: Vec<String> = train.samples.iter().chain(test.samples.iter()).cloned().collect();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 50, "train and test must be disjoint");
    }

    #[test]
    fn test_train_test_split_is_reproducible() {
        let data = create_test_data();
        let (train1, _) = data.train_test_split(0.5, &mut ChaCha8Rng::seed_from_u64(7));
        let (train2, _) = data.train_test_split(0.5, &mut ChaCha8Rng::seed_from_u64(7));
        assert_eq!(train1.samples, train2.samples, "the same seed must give the same split");
    }

    #[test]
    fn test_load_csv() {
        let data = Data::load_csv("samples/tests/malware_small.csv").unwrap();
        assert_eq!(data.features, vec!["SEND_SMS", "READ_PHONE_STATE", "chmod", "Runtime.load"]);
        assert_eq!(data.feature_len, 4);
        assert_eq!(data.sample_len, 11, "the row with a missing cell should be dropped");
        assert_eq!(data.y.iter().filter(|c| **c == 1).count(), 5);
        assert_eq!(data.X[2][1], 0.0, "a non numeric cell should become 0");
    }

    #[test]
    fn test_encode_string_targets() {
        let (codes, names) = encode_targets(&string_vec!["S", "B", "S", "B"]).unwrap();
        assert_eq!(codes, vec![1, 0, 1, 0]);
        assert_eq!(names, vec!["B", "S"]);
    }

    #[test]
    fn test_data_compatibility() {
        let mut data = create_test_data();
        let other = create_test_data();
        assert!(data.check_compatibility(&other), "two identical data should be compatible");

        data.features[1] = "some other name".to_string();
        assert!(!data.check_compatibility(&other), "two data with different features should not be compatible");
    }
}
