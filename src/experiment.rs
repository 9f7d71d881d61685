use crate::data::Data;
use crate::ensemble::SoftVoting;
use crate::error::Result;
use crate::gbdt::GradientBoosting;
use crate::individual::Individual;
use crate::metrics::MetricsRecord;
use crate::mlp::Mlp;
use crate::param::Param;
use crate::population::Population;
use log::info;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Everything produced by one pipeline call
pub struct PipelineResult {
    /// Experiment ID, i.e., save name and timestamp
    pub id: String,
    /// Timestamp of the run
    pub timestamp: String,
    /// Crate version and git hash used
    pub version: String,
    /// Parameters used
    pub parameters: Param,
    /// Wall clock duration of the run, in seconds
    pub execution_time: f64,

    /// Ensemble metrics on the held-out set
    pub metrics: MetricsRecord,
    /// Metrics of each ensemble member on the held-out set
    pub learner_metrics: Vec<(String, MetricsRecord)>,
    /// Trained soft voting ensemble, expects rows restricted to `selected_indices`
    pub model: SoftVoting<GradientBoosting, Mlp>,

    /// Names of the selected columns, in original column order
    pub selected_features: Vec<String>,
    /// Positions of the selected columns in the original matrix
    pub selected_indices: Vec<usize>,
    /// Winning subset of the search
    pub best: Individual,
    /// Names of all original columns
    pub feature_names: Vec<String>,
    /// Per feature elite count, aligned with `feature_names`
    pub selection_frequency: Vec<u64>,
    /// Boosting split counts, aligned with `selected_features`
    pub importances: Vec<usize>,
    /// Generations actually run by the search
    pub generations: usize,
    /// Sorted population of each generation when `keep_trace` is set
    pub populations: Vec<Population>,

    /// Held-out set restricted to the selected columns
    pub test_data: Data,
}

/// Serialisable summary of a run (model weights are left out)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Report {
    pub id: String,
    pub timestamp: String,
    pub version: String,
    pub execution_time: f64,
    pub generations: usize,
    pub metrics: MetricsRecord,
    pub learner_metrics: Vec<(String, MetricsRecord)>,
    pub selected_features: Vec<String>,
    pub selected_indices: Vec<usize>,
    pub best_fit: f64,
    pub selection_frequency: Vec<(String, u64)>,
    pub importances: Vec<(String, usize)>,
    pub parameters: Param,
}

impl PipelineResult {
    pub fn report(&self) -> Report {
        Report {
            id: self.id.clone(),
            timestamp: self.timestamp.clone(),
            version: self.version.clone(),
            execution_time: self.execution_time,
            generations: self.generations,
            metrics: self.metrics,
            learner_metrics: self.learner_metrics.clone(),
            selected_features: self.selected_features.clone(),
            selected_indices: self.selected_indices.clone(),
            best_fit: self.best.fit,
            selection_frequency: self
                .feature_names
                .iter()
                .cloned()
                .zip(self.selection_frequency.iter().copied())
                .collect(),
            importances: self
                .selected_features
                .iter()
                .cloned()
                .zip(self.importances.iter().copied())
                .collect(),
            parameters: self.parameters.clone(),
        }
    }

    /// Saves the report to JSON
    pub fn save_report<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, &self.report())?;
        info!("Report saved to {}", path.display());
        Ok(())
    }

    /// Restrict full width rows to the selected columns, in the order the model expects
    pub fn restrict(&self, X: &[Vec<f64>]) -> Vec<Vec<f64>> {
        X.iter()
            .map(|row| self.selected_indices.iter().map(|j| row[*j]).collect())
            .collect()
    }

    pub fn display_results(&self) -> String {
        let mut text = String::new();
        text.push_str(&format!("\n=============== Experiment {} ===============\n\n", self.id));
        text.push_str(&format!("Evomal version: v{}\n", self.version));
        text.push_str(&format!("Timestamp: {}\n", self.timestamp));
        text.push_str(&format!(
            "Execution time: {:.2}s ({} generations)\n\n",
            self.execution_time, self.generations
        ));

        text.push_str(&format!(
            "\x1b[1;93mSelected features ({}/{})\x1b[0m: {}\n",
            self.selected_features.len(),
            self.feature_names.len(),
            self.selected_features.join(", ")
        ));
        text.push_str(&format!("Best training fit: {:.4}\n\n", self.best.fit));

        text.push_str("Selection frequency:\n");
        let mut frequency: Vec<(&String, &u64)> = self.feature_names.iter().zip(self.selection_frequency.iter()).collect();
        frequency.sort_by(|a, b| b.1.cmp(a.1));
        for (name, count) in frequency.iter().take(20) {
            text.push_str(&format!("  {:<30} {}\n", name, count));
        }

        text.push_str("\nBoosting split counts:\n");
        for (name, count) in self.selected_features.iter().zip(self.importances.iter()) {
            text.push_str(&format!("  {:<30} {}\n", name, count));
        }

        text.push('\n');
        for (name, metrics) in &self.learner_metrics {
            text.push_str(&format!("{:<18} {}\n", name, metrics));
        }
        text.push_str(&format!("\x1b[1;92m{:<18} {}\x1b[0m\n", "Ensemble", self.metrics));

        text
    }
}
