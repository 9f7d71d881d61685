use crate::error::{EvomalError, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;

/// Number of candidate features examined at each split of a forest tree
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[allow(non_camel_case_types)]
pub enum MaxFeatures {
    sqrt,
    log2,
    all,
}

impl MaxFeatures {
    /// Resolve the number of candidate features for a matrix of `n_features` columns
    pub fn resolve(&self, n_features: usize) -> usize {
        let n = match self {
            MaxFeatures::sqrt => (n_features as f64).sqrt() as usize,
            MaxFeatures::log2 => (n_features as f64).log2() as usize,
            MaxFeatures::all => n_features,
        };
        n.clamp(1, n_features.max(1))
    }
}

// Field definitions and associated default values

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Param {
    #[serde(default)]
    pub general: General,
    #[serde(default)]
    pub data: Data,
    #[serde(default)]
    pub ga: GA,
    #[serde(default)]
    pub fitness: Fitness,
    #[serde(default)]
    pub boosting: Boosting,
    #[serde(default)]
    pub mlp: Mlp,
    #[serde(default)]
    pub ensemble: Ensemble,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct General {
    #[serde(default = "seed_default")]
    pub seed: u64,
    #[serde(default = "one_default")]
    pub thread_number: usize,
    #[serde(default = "log_base_default")]
    pub log_base: String,
    #[serde(default = "log_suffix_default")]
    pub log_suffix: String,
    #[serde(default = "log_level_default")]
    pub log_level: String,
    #[serde(default = "true_default")]
    pub display_colorful: bool,
    #[serde(default = "true_default")]
    pub keep_trace: bool,
    #[serde(default = "empty_string")]
    pub save_exp: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Data {
    #[serde(default = "empty_string")]
    pub path: String,
    #[serde(default = "holdout_ratio_default")]
    pub holdout_ratio: f64,
    #[serde(default = "true_default")]
    pub scale: bool,
    #[serde(default = "class_names_default")]
    pub classes: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GA {
    #[serde(default = "pop_size_default")]
    pub population_size: usize,
    #[serde(default = "generations_default")]
    pub generations: usize,
    #[serde(default = "elite_number_default")]
    pub elite_number: usize,
    #[serde(default = "zero_default")]
    pub mutation_rate: f64,
    #[serde(default = "true_default")]
    pub rescore_final: bool,
    #[serde(default = "uzero64_default")]
    pub max_duration_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Fitness {
    #[serde(default = "fitness_trees_default")]
    pub n_trees: usize,
    #[serde(default = "uzero_default")]
    pub max_depth: usize,
    #[serde(default = "min_samples_split_default")]
    pub min_samples_split: usize,
    #[serde(default = "max_features_default")]
    pub max_features: MaxFeatures,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Boosting {
    #[serde(default = "n_rounds_default")]
    pub n_rounds: usize,
    #[serde(default = "boosting_learning_rate_default")]
    pub learning_rate: f64,
    #[serde(default = "boosting_max_depth_default")]
    pub max_depth: usize,
    #[serde(default = "min_samples_leaf_default")]
    pub min_samples_leaf: usize,
    #[serde(default = "zero_default")]
    pub lambda_l2: f64,
    #[serde(default = "min_hessian_default")]
    pub min_hessian: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Mlp {
    #[serde(default = "hidden_size_default")]
    pub hidden_size: usize,
    #[serde(default = "epochs_default")]
    pub epochs: usize,
    #[serde(default = "mlp_learning_rate_default")]
    pub learning_rate: f64,
    #[serde(default = "alpha_default")]
    pub alpha: f64,
    #[serde(default = "batch_size_default")]
    pub batch_size: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Ensemble {
    #[serde(default = "weights_default")]
    pub weights: [f64; 2],
    #[serde(default = "half_default")]
    pub threshold: f64,
}

// Default section definitions

impl Default for General {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Data {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for GA {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Fitness {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Boosting {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Mlp {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Ensemble {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Param {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Param {
    pub fn new() -> Self {
        Self::default()
    }
}

pub fn get(param_file: String) -> Result<Param> {
    let param_file_reader = File::open(param_file)?;
    let param_reader = BufReader::new(param_file_reader);

    let mut config: Param = serde_yaml::from_reader(param_reader)?;

    validate(&mut config)?;

    Ok(config)
}

pub fn validate(param: &mut Param) -> Result<()> {
    if param.general.log_base.len() > 0 {
        param.general.display_colorful = false;
    }

    if param.general.thread_number == 0 {
        return Err(EvomalError::Configuration(
            "thread_number must be at least 1".to_string(),
        ));
    }

    if param.data.holdout_ratio <= 0.0 || param.data.holdout_ratio >= 1.0 {
        return Err(EvomalError::Configuration(format!(
            "Invalid holdout_ratio={:.3}. Must be in range (0, 1).",
            param.data.holdout_ratio
        )));
    }

    validate_ga(param)?;
    validate_learners(param)?;
    validate_ensemble(param)?;
    Ok(())
}

/// Hard constraints of the genetic search, shared by `validate` and `ga::ga`
pub fn check_ga(ga: &GA) -> Result<()> {
    if ga.population_size < 2 {
        return Err(EvomalError::Configuration(format!(
            "Invalid population_size={}. At least 2 individuals are needed to recombine.",
            ga.population_size
        )));
    }

    if ga.elite_number < 2 || ga.elite_number > ga.population_size {
        return Err(EvomalError::Configuration(format!(
            "Invalid elite_number={}. Must be in range [2, population_size={}].",
            ga.elite_number, ga.population_size
        )));
    }

    if ga.generations == 0 {
        return Err(EvomalError::Configuration(
            "generations must be at least 1".to_string(),
        ));
    }

    if !(0.0..=1.0).contains(&ga.mutation_rate) {
        return Err(EvomalError::Configuration(format!(
            "Invalid mutation_rate={:.3}. Must be in range [0, 1].",
            ga.mutation_rate
        )));
    }

    Ok(())
}

fn validate_ga(param: &mut Param) -> Result<()> {
    check_ga(&param.ga)?;

    if param.ga.elite_number == param.ga.population_size {
        warn!("elite_number equals population_size: no child will ever be created, the search is frozen after the first generation.");
    }

    if !param.ga.rescore_final {
        warn!("rescore_final is deactivated: the winner is the first elite of the last selection, children of the last generation are never scored.");
    }

    Ok(())
}

fn validate_learners(param: &mut Param) -> Result<()> {
    if param.fitness.n_trees == 0 {
        return Err(EvomalError::Configuration(
            "fitness.n_trees must be at least 1".to_string(),
        ));
    }

    if param.boosting.n_rounds == 0 || param.boosting.learning_rate <= 0.0 {
        return Err(EvomalError::Configuration(format!(
            "Invalid boosting setup (n_rounds={}, learning_rate={:.3}).",
            param.boosting.n_rounds, param.boosting.learning_rate
        )));
    }

    if param.boosting.lambda_l2 < 0.0 {
        return Err(EvomalError::Configuration(format!(
            "Invalid lambda_l2={:.3}. Must be >= 0.",
            param.boosting.lambda_l2
        )));
    }

    if param.mlp.hidden_size == 0 || param.mlp.epochs == 0 || param.mlp.batch_size == 0 {
        return Err(EvomalError::Configuration(format!(
            "Invalid mlp setup (hidden_size={}, epochs={}, batch_size={}).",
            param.mlp.hidden_size, param.mlp.epochs, param.mlp.batch_size
        )));
    }

    if param.mlp.learning_rate <= 0.0 || param.mlp.alpha < 0.0 {
        return Err(EvomalError::Configuration(format!(
            "Invalid mlp optimisation setup (learning_rate={}, alpha={}).",
            param.mlp.learning_rate, param.mlp.alpha
        )));
    }

    Ok(())
}

fn validate_ensemble(param: &mut Param) -> Result<()> {
    let [w1, w2] = param.ensemble.weights;
    if w1 < 0.0 || w2 < 0.0 || ((w1 + w2) - 1.0).abs() > 1e-9 {
        return Err(EvomalError::Configuration(format!(
            "Invalid ensemble weights [{}, {}]. Must be non-negative and sum to 1.",
            w1, w2
        )));
    }

    if param.ensemble.threshold <= 0.0 || param.ensemble.threshold >= 1.0 {
        return Err(EvomalError::Configuration(format!(
            "Invalid ensemble threshold={:.3}. Must be in range (0, 1).",
            param.ensemble.threshold
        )));
    }

    Ok(())
}

// Default value definitions

fn seed_default() -> u64 {
    4815162342
}
fn empty_string() -> String {
    "".to_string()
}
fn log_base_default() -> String {
    "".to_string()
}
fn log_suffix_default() -> String {
    "log".to_string()
}
fn log_level_default() -> String {
    "info".to_string()
}
fn true_default() -> bool {
    true
}
fn zero_default() -> f64 {
    0.0
}
fn uzero_default() -> usize {
    0
}
fn uzero64_default() -> u64 {
    0
}
fn half_default() -> f64 {
    0.5
}
fn one_default() -> usize {
    1
}
fn holdout_ratio_default() -> f64 {
    0.2
}
fn class_names_default() -> Vec<String> {
    vec!["benign".to_string(), "malware".to_string()]
}
fn pop_size_default() -> usize {
    6
}
fn generations_default() -> usize {
    5
}
fn elite_number_default() -> usize {
    2
}
fn fitness_trees_default() -> usize {
    30
}
fn min_samples_split_default() -> usize {
    2
}
fn max_features_default() -> MaxFeatures {
    MaxFeatures::sqrt
}
fn n_rounds_default() -> usize {
    100
}
fn boosting_learning_rate_default() -> f64 {
    0.1
}
fn boosting_max_depth_default() -> usize {
    6
}
fn min_samples_leaf_default() -> usize {
    20
}
fn min_hessian_default() -> f64 {
    1e-3
}
fn hidden_size_default() -> usize {
    16
}
fn epochs_default() -> usize {
    50
}
fn mlp_learning_rate_default() -> f64 {
    0.001
}
fn alpha_default() -> f64 {
    1e-4
}
fn batch_size_default() -> usize {
    200
}
fn weights_default() -> [f64; 2] {
    [0.6, 0.4]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_param_is_valid() {
        let mut param = Param::default();
        assert!(validate(&mut param).is_ok(), "default parameters should pass validation");
        assert_eq!(param.ga.population_size, 6);
        assert_eq!(param.ga.generations, 5);
        assert_eq!(param.ga.elite_number, 2);
        assert_eq!(param.fitness.n_trees, 30);
        assert_eq!(param.mlp.hidden_size, 16);
        assert_eq!(param.mlp.epochs, 50);
        assert_eq!(param.ensemble.weights, [0.6, 0.4]);
    }

    #[test]
    fn test_partial_yaml_falls_back_to_defaults() {
        let yaml = "ga:\n  population_size: 12\nensemble:\n  weights: [0.5, 0.5]\n";
        let param: Param = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(param.ga.population_size, 12, "explicit value should be kept");
        assert_eq!(param.ga.generations, 5, "missing value should take its default");
        assert_eq!(param.ensemble.weights, [0.5, 0.5]);
        assert_eq!(param.general.seed, 4815162342);
    }

    #[test]
    fn test_validate_rejects_non_convex_weights() {
        let mut param = Param::default();
        param.ensemble.weights = [0.7, 0.4];
        assert!(validate(&mut param).is_err(), "weights summing to 1.1 must be rejected");

        param.ensemble.weights = [1.2, -0.2];
        assert!(validate(&mut param).is_err(), "negative weight must be rejected");
    }

    #[test]
    fn test_validate_rejects_bad_elite_number() {
        let mut param = Param::default();
        param.ga.elite_number = 1;
        assert!(validate(&mut param).is_err(), "a single elite cannot be recombined");

        param.ga.elite_number = param.ga.population_size + 1;
        assert!(validate(&mut param).is_err(), "more elites than individuals must be rejected");
    }

    #[test]
    fn test_check_ga_shared_constraints() {
        let mut ga = GA::default();
        assert!(check_ga(&ga).is_ok());
        ga.population_size = 0;
        assert!(check_ga(&ga).is_err(), "an empty population must be rejected");
        ga.population_size = 6;
        ga.mutation_rate = 1.5;
        assert!(check_ga(&ga).is_err(), "a rate above 1 must be rejected");
    }

    #[test]
    fn test_param_yaml_round_trip() {
        let mut param = Param::default();
        param.ga.mutation_rate = 0.05;
        param.fitness.max_features = MaxFeatures::log2;
        let text = serde_yaml::to_string(&param).unwrap();
        let back: Param = serde_yaml::from_str(&text).unwrap();
        assert_eq!(back, param, "every parameter field must survive serialisation");
    }

    #[test]
    fn test_validate_rejects_bad_holdout() {
        let mut param = Param::default();
        param.data.holdout_ratio = 1.0;
        assert!(validate(&mut param).is_err());
    }

    #[test]
    fn test_log_base_disables_colors() {
        let mut param = Param::default();
        param.general.log_base = "run".to_string();
        validate(&mut param).unwrap();
        assert!(!param.general.display_colorful, "file logging should disable ANSI colors");
    }

    #[test]
    fn test_max_features_resolution() {
        assert_eq!(MaxFeatures::sqrt.resolve(25), 5);
        assert_eq!(MaxFeatures::sqrt.resolve(1), 1);
        assert_eq!(MaxFeatures::log2.resolve(16), 4);
        assert_eq!(MaxFeatures::all.resolve(7), 7);
        assert_eq!(MaxFeatures::sqrt.resolve(3), 1, "sqrt(3) truncates to 1");
    }
}
