use thiserror::Error;

/// Failures that abort a pipeline run.
///
/// Degenerate subsets and undefined metrics are handled where they occur
/// (zero fitness, 0.0 AUC) and never show up here.
#[derive(Error, Debug)]
pub enum EvomalError {
    #[error("Empty feature subset: {0}")]
    EmptySubset(String),

    #[error("Single class in training labels (class {0})")]
    SingleClass(u8),

    #[error("Shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    #[error("Model not fitted: {0}")]
    NotFitted(String),

    #[error("Data error: {0}")]
    Data(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EvomalError>;
