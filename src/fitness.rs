use crate::data::Data;
use crate::error::Result;
use crate::forest::RandomForest;
use crate::individual::Individual;
use crate::metrics::weighted_f1;
use crate::model::Classifier;
use crate::param::Param;
use log::warn;

/// Seed of the proxy forest of one subset, independent of evaluation order
pub fn forest_seed(run_seed: u64, individual_hash: u64) -> u64 {
    run_seed ^ individual_hash
}

/// Training-set fit of a feature subset.
///
/// A fresh random forest is trained on the selected columns and scored with
/// the weighted F1 of its own predictions on the same rows. An empty subset
/// scores 0 without any training.
pub fn compute_fitness(individual: &Individual, data: &Data, param: &Param) -> Result<f64> {
    if individual.is_empty() {
        return Ok(0.0);
    }
    let restricted = data.select_features(&individual.features_index());
    let mut forest = RandomForest::from_param(&param.fitness, forest_seed(param.general.seed, individual.hash));
    forest.fit(&restricted.X, &restricted.y)?;
    let predictions = forest.predict(&restricted.X)?;
    Ok(weighted_f1(&restricted.y, &predictions))
}

/// `compute_fitness` where any training failure scores 0
pub fn fitness(individual: &Individual, data: &Data, param: &Param) -> f64 {
    match compute_fitness(individual, data, param) {
        Ok(fit) => fit,
        Err(e) => {
            warn!("Subset {} cannot be scored ({}), its fitness is set to 0.", individual, e);
            0.0
        }
    }
}
