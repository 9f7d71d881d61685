#![allow(non_snake_case)]

pub mod data;
pub mod ensemble;
pub mod error;
pub mod experiment;
pub mod fitness;
pub mod forest;
pub mod ga;
pub mod gbdt;
pub mod individual;
pub mod metrics;
pub mod mlp;
pub mod model;
pub mod param;
pub mod population;
pub mod tree;
pub mod utils;

use chrono::Local;
use data::Data;
use ensemble::SoftVoting;
use error::{EvomalError, Result};
use experiment::PipelineResult;
use ga::ga;
use gbdt::GradientBoosting;
use metrics::evaluate;
use mlp::Mlp;
use model::Classifier;
use param::Param;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use log::{debug, info};

use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

pub fn version() -> String {
    format!(
        "{}#{}",
        env!("CARGO_PKG_VERSION"),
        option_env!("EVOMAL_GIT_SHA").unwrap_or("unknown")
    )
}

/// Run identifier: report file stem (or "evomal") and timestamp
fn experiment_id(save_exp: &str, timestamp: &str) -> String {
    let stem = Path::new(save_exp)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    if stem.is_empty() {
        format!("evomal_{}", timestamp)
    } else {
        format!("{}_{}", stem, timestamp)
    }
}

/// Load the CSV named in the parameters, scale it, split it and run the pipeline
pub fn run(param: &Param, running: Arc<AtomicBool>) -> Result<PipelineResult> {
    let mut data = Data::load_csv(&param.data.path)?;
    if data.classes.is_empty() {
        data.set_classes(param.data.classes.clone());
    }
    cinfo!(param.general.display_colorful, "\x1b[2;97m{:?}\x1b[0m", data);

    let mut rng = ChaCha8Rng::seed_from_u64(param.general.seed);
    let (mut train, mut test) = data.train_test_split(param.data.holdout_ratio, &mut rng);
    info!(
        "Hold-out split: {} training samples, {} test samples",
        train.sample_len, test.sample_len
    );

    if param.data.scale {
        debug!("Standardising features on the training set...");
        let scaler = train.fit_scaler();
        train.standardize(&scaler);
        test.standardize(&scaler);
    }

    run_on_data(&train, &test, param, running)
}

/// Run feature selection, ensemble training and evaluation on prepared data
///
/// # Arguments
///
/// * `train` - Training matrix, labels and feature identifiers.
/// * `test` - Held-out data sharing the training columns.
/// * `param` - Validated parameters.
/// * `running` - Cancellation flag, checked once per generation.
///
/// # Errors
///
/// Fails on incompatible datasets, an empty winning subset or any training failure.
pub fn run_on_data(train: &Data, test: &Data, param: &Param, running: Arc<AtomicBool>) -> Result<PipelineResult> {
    let start = std::time::Instant::now();
    let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S").to_string();

    if !train.check_compatibility(test) {
        return Err(EvomalError::ShapeMismatch {
            expected: format!("{} training features", train.feature_len),
            actual: format!("{} test features with different names", test.feature_len),
        });
    }

    cinfo!(param.general.display_colorful, "Genetic feature selection\n-----------------------------------------------------");
    let outcome = ga(train, param, running)?;

    let selected_indices = outcome.best.features_index();
    if selected_indices.is_empty() {
        return Err(EvomalError::EmptySubset(
            "the search ended on an individual without any feature".to_string(),
        ));
    }
    cinfo!(param.general.display_colorful, "Best subset: {}", outcome.best.display(train));

    let train_restricted = train.select_features(&selected_indices);
    let test_restricted = test.select_features(&selected_indices);

    cinfo!(param.general.display_colorful, "Training soft voting ensemble\n-----------------------------------------------------");
    let mut model = SoftVoting::new(
        GradientBoosting::from_param(&param.boosting),
        Mlp::from_param(&param.mlp, param.general.seed),
        &param.ensemble,
    )?;
    model.fit(&train_restricted.X, &train_restricted.y)?;

    let proba = model.predict_proba(&test_restricted.X)?;
    let predictions = model.predict(&test_restricted.X)?;
    let metrics = evaluate(&test_restricted.y, &predictions, &proba);

    let (first_proba, second_proba) = model.member_proba(&test_restricted.X)?;
    let learner_metrics = vec![
        (
            model.first.name().to_string(),
            evaluate(&test_restricted.y, &model.first.predict(&test_restricted.X)?, &first_proba),
        ),
        (
            model.second.name().to_string(),
            evaluate(&test_restricted.y, &model.second.predict(&test_restricted.X)?, &second_proba),
        ),
    ];
    let importances = model.first.feature_importance();

    let id = experiment_id(&param.general.save_exp, &timestamp);

    let result = PipelineResult {
        id,
        timestamp,
        version: version(),
        parameters: param.clone(),
        execution_time: start.elapsed().as_secs_f64(),
        metrics,
        learner_metrics,
        model,
        selected_features: outcome.best.feature_names(train),
        selected_indices,
        best: outcome.best,
        feature_names: train.features.clone(),
        selection_frequency: outcome.selection_frequency,
        importances,
        generations: outcome.generations,
        populations: outcome.populations,
        test_data: test_restricted,
    };
    info!("Pipeline completed in {:.2}s", result.execution_time);

    Ok(result)
}
