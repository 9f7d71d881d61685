use crate::cinfo;
use crate::data::Data;
use crate::error::{EvomalError, Result};
use crate::individual::Individual;
use crate::param::{check_ga, Param};
use crate::population::Population;
use crate::utils::{display_epoch, display_epoch_legend};
use log::{debug, info};
use rand::seq::index::sample;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// What the search hands back to the pipeline
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GaOutcome {
    /// Winning subset
    pub best: Individual,
    /// Per feature count of retained elites selecting it, over all generations
    pub selection_frequency: Vec<u64>,
    /// Scored and sorted population of each generation (empty unless `keep_trace`)
    pub populations: Vec<Population>,
    /// Number of generations actually run
    pub generations: usize,
}

//-----------------------------------------------------------------------------
// Genetic Algorithm core functions
//-----------------------------------------------------------------------------

/// Main function to run the genetic feature selection
///
/// # Arguments
///
/// * `data` - The training dataset, one bit of each individual per column.
/// * `param` - Parameters for the genetic algorithm and the fitness forest.
/// * `running` - Atomic boolean to control the running state of the algorithm.
///
/// # Returns
///
/// The winning individual, the selection frequency vector and the trace of the search.
///
/// # Errors
///
/// Fails on invalid search parameters, if the dataset has no column or if the thread pool cannot be built.
pub fn ga(data: &Data, param: &Param, running: Arc<AtomicBool>) -> Result<GaOutcome> {
    let max_duration = if param.ga.max_duration_secs > 0 {
        Some(Duration::from_secs(param.ga.max_duration_secs))
    } else {
        None
    };
    evolve(data, param, running, max_duration)
}

/// Genetic feature selection with an explicit wall clock cap, checked at the end of each generation
pub fn evolve(
    data: &Data,
    param: &Param,
    running: Arc<AtomicBool>,
    max_duration: Option<Duration>,
) -> Result<GaOutcome> {
    let time = Instant::now();

    check_ga(&param.ga)?;
    if data.feature_len == 0 {
        return Err(EvomalError::EmptySubset("no feature to select from".to_string()));
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(param.general.thread_number)
        .build()
        .map_err(|e| EvomalError::Configuration(format!("cannot build thread pool: {}", e)))?;

    let mut rng = ChaCha8Rng::seed_from_u64(param.general.seed);

    let mut pop = Population::new();
    pop.generate(param.ga.population_size, data.feature_len, &mut rng);
    info!(
        "Population size: {}, features: {}, mean k: {:.2}",
        pop.individuals.len(),
        data.feature_len,
        pop.mean_k()
    );

    cinfo!(param.general.display_colorful, "{}", display_epoch_legend(param));

    let mut selection_frequency = vec![0u64; data.feature_len];
    let mut populations: Vec<Population> = Vec::new();
    let mut last_elites: Population;
    let mut epoch: usize = 0;

    // Evolve!
    loop {
        epoch += 1;

        debug!("Fitting population...");
        pool.install(|| pop.fit(data, param));
        pop = pop.sort();

        cinfo!(param.general.display_colorful, "{}", display_epoch(&pop, epoch));
        if param.general.keep_trace {
            populations.push(pop.clone());
        }

        let elites = pop.select_first(param.ga.elite_number);
        elites.accumulate_frequency(&mut selection_frequency);

        let children = recombine(
            &elites,
            param.ga.population_size - elites.individuals.len(),
            epoch,
            param.ga.mutation_rate,
            &mut rng,
        );
        pop = elites.clone();
        pop.add(children);
        last_elites = elites;

        // Stop criteria
        let mut need_to_break = false;

        if epoch >= param.ga.generations {
            info!("Reach max generation");
            need_to_break = true;
        }

        if let Some(max_duration) = max_duration {
            if time.elapsed() >= max_duration {
                info!("Time limit reached after {} generations", epoch);
                need_to_break = true;
            }
        }

        if !running.load(Ordering::Relaxed) {
            info!("Signal received");
            need_to_break = true;
        }

        if need_to_break {
            break;
        }
    }

    let best = if param.ga.rescore_final {
        debug!("Re-scoring final population...");
        pool.install(|| pop.fit(data, param));
        pop = pop.sort();
        pop.individuals[0].clone()
    } else {
        last_elites.individuals[0].clone()
    };

    info!(
        "Genetic algorithm computed {} generations in {:.2?}",
        epoch,
        time.elapsed()
    );

    Ok(GaOutcome {
        best,
        selection_frequency,
        populations,
        generations: epoch,
    })
}

/// Create children as the union of two distinct elites drawn at random
///
/// # Arguments
///
/// * `elites` - Retained individuals, at least two.
/// * `children_number` - Number of children to create.
/// * `epoch` - Generation the children are born in.
/// * `mutation_rate` - Per bit flip probability applied to each child (0 disables mutation).
/// * `rng` - Random number generator.
pub fn recombine(
    elites: &Population,
    children_number: usize,
    epoch: usize,
    mutation_rate: f64,
    rng: &mut ChaCha8Rng,
) -> Population {
    let mut children = Population::new();
    let n_elites = elites.individuals.len();
    if n_elites < 2 {
        return children;
    }

    for _ in 0..children_number {
        let parents = sample(rng, n_elites, 2);
        let mut child = Individual::union(
            &elites.individuals[parents.index(0)],
            &elites.individuals[parents.index(1)],
            epoch,
        );
        child.mutate(mutation_rate, rng);
        children.individuals.push(child);
    }

    children
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    /// 60 samples, first column informative, other columns noise
    fn create_test_data(feature_len: usize) -> Data {
        let mut rng = ChaCha8Rng::seed_from_u64(21);
        let X: Vec<Vec<f64>> = (0..60)
            .map(|i| {
                (0..feature_len)
                    .map(|j| if j == 0 { (i % 2) as f64 + rng.gen_range(-0.2..0.2) } else { rng.gen_range(0.0..1.0) })
                    .collect()
            })
            .collect();
        let y: Vec<u8> = (0..60).map(|i| (i % 2) as u8).collect();
        let features = (0..feature_len).map(|j| format!("feature_{}", j)).collect();
        Data::from_parts(X, y, features).unwrap()
    }

    fn create_test_params() -> Param {
        let mut param = Param::default();
        param.ga.population_size = 6;
        param.ga.generations = 4;
        param.ga.elite_number = 2;
        param.fitness.n_trees = 10;
        param
    }

    fn running() -> Arc<AtomicBool> {
        Arc::new(AtomicBool::new(true))
    }

    #[test]
    fn test_population_size_is_constant() {
        let data = create_test_data(5);
        let param = create_test_params();
        let outcome = ga(&data, &param, running()).unwrap();
        assert_eq!(outcome.generations, 4);
        assert_eq!(outcome.populations.len(), 4, "one trace entry per generation");
        for pop in &outcome.populations {
            assert_eq!(pop.individuals.len(), 6, "every generation must hold exactly P individuals");
        }
    }

    #[test]
    fn test_selection_frequency_bounds() {
        let data = create_test_data(5);
        let param = create_test_params();
        let outcome = ga(&data, &param, running()).unwrap();

        assert_eq!(outcome.selection_frequency.len(), 5);
        assert!(
            outcome.selection_frequency.iter().all(|f| *f <= 8),
            "a feature cannot be counted more than generations x elites: {:?}",
            outcome.selection_frequency
        );

        // the counter sums the k of the elites of each generation
        let expected: u64 = outcome
            .populations
            .iter()
            .map(|pop| pop.individuals.iter().take(2).map(|i| i.k as u64).sum::<u64>())
            .sum();
        assert_eq!(outcome.selection_frequency.iter().sum::<u64>(), expected);
    }

    #[test]
    fn test_ga_is_reproducible() {
        let data = create_test_data(6);
        let mut param = create_test_params();
        param.general.thread_number = 3;
        let first = ga(&data, &param, running()).unwrap();
        let second = ga(&data, &param, running()).unwrap();
        assert_eq!(first.best.mask, second.best.mask, "a seeded run must always pick the same subset");
        assert_eq!(first.best.fit, second.best.fit);
        assert_eq!(first.selection_frequency, second.selection_frequency);
    }

    #[test]
    fn test_winner_is_not_empty_and_matches_columns() {
        let data = create_test_data(5);
        let outcome = ga(&data, &create_test_params(), running()).unwrap();
        assert_eq!(outcome.best.mask.len(), 5);
        assert!(outcome.best.k >= 1, "a fitted subset should beat the empty one");
        assert!(outcome.best.fit > 0.0);
    }

    #[test]
    fn test_stop_flag_ends_after_one_generation() {
        let data = create_test_data(5);
        let outcome = ga(&data, &create_test_params(), Arc::new(AtomicBool::new(false))).unwrap();
        assert_eq!(outcome.generations, 1, "the flag is checked at the end of each generation");
        assert_eq!(outcome.best.mask.len(), 5, "a stopped run still returns a winner");
    }

    #[test]
    fn test_without_rescoring_first_elite_wins() {
        let data = create_test_data(5);
        let mut param = create_test_params();
        param.ga.rescore_final = false;
        let outcome = ga(&data, &param, running()).unwrap();
        let last = outcome.populations.last().unwrap();
        assert_eq!(outcome.best.mask, last.individuals[0].mask, "the winner is the first elite of the last selection");
        assert_eq!(outcome.best.fit, last.individuals[0].fit);
    }

    #[test]
    fn test_ga_rejects_empty_matrix() {
        let data = Data::from_parts(vec![vec![], vec![]], vec![0, 1], vec![]).unwrap();
        assert!(matches!(ga(&data, &create_test_params(), running()), Err(EvomalError::EmptySubset(_))));
    }

    #[test]
    fn test_recombine_with_two_elites() {
        let mut elites = Population::new();
        elites.individuals.push(Individual::from_mask(vec![true, false, false, false]));
        elites.individuals.push(Individual::from_mask(vec![false, false, true, false]));
        let mut rng = ChaCha8Rng::seed_from_u64(4);

        let children = recombine(&elites, 4, 2, 0.0, &mut rng);
        assert_eq!(children.individuals.len(), 4);
        for child in &children.individuals {
            assert_eq!(child.mask, vec![true, false, true, false], "with two elites every child is their union");
            assert_eq!(child.epoch, 2);
        }
    }

    #[test]
    fn test_recombine_uses_distinct_parents() {
        let mut elites = Population::new();
        for j in 0..4 {
            let mut mask = vec![false; 4];
            mask[j] = true;
            elites.individuals.push(Individual::from_mask(mask));
        }
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let children = recombine(&elites, 20, 1, 0.0, &mut rng);
        assert!(children.individuals.iter().all(|c| c.k == 2), "two distinct one-feature parents give two features");
    }

    #[test]
    fn test_best_fitness_is_monotone() {
        let data = create_test_data(6);
        let outcome = ga(&data, &create_test_params(), running()).unwrap();
        // elites survive unchanged and keep their score
        let best_fit: Vec<f64> = outcome.populations.iter().map(|p| p.individuals[0].fit).collect();
        assert!(best_fit.windows(2).all(|w| w[1] >= w[0]), "elitism keeps the best fitness monotone: {:?}", best_fit);
    }

    #[test]
    fn test_ga_rejects_single_elite() {
        let data = create_test_data(5);
        let mut param = create_test_params();
        param.ga.elite_number = 1;
        assert!(
            matches!(ga(&data, &param, running()), Err(EvomalError::Configuration(_))),
            "one elite cannot be recombined and would shrink the population"
        );
    }

    #[test]
    fn test_ga_rejects_empty_population() {
        let data = create_test_data(5);
        let mut param = create_test_params();
        param.ga.population_size = 0;
        assert!(matches!(ga(&data, &param, running()), Err(EvomalError::Configuration(_))));

        param.ga.population_size = 6;
        param.ga.elite_number = 7;
        assert!(matches!(ga(&data, &param, running()), Err(EvomalError::Configuration(_))));
    }

    #[test]
    fn test_ga_with_full_mutation() {
        let data = create_test_data(5);
        let mut param = create_test_params();
        param.ga.mutation_rate = 1.0;
        let outcome = ga(&data, &param, running()).unwrap();

        for pop in &outcome.populations {
            assert_eq!(pop.individuals.len(), 6, "mutation must not change the population size");
        }

        // children born at generation g are first scored at generation g + 1
        let mut checked = 0;
        for g in 1..outcome.populations.len() {
            let previous = &outcome.populations[g - 1];
            for child in outcome.populations[g].individuals.iter().filter(|i| i.epoch == g) {
                let hashes = child.parents.as_ref().unwrap();
                let find = |hash: u64| previous.individuals.iter().find(|i| i.hash == hash).unwrap();
                let union = Individual::union(find(hashes[0]), find(hashes[1]), g);
                assert_ne!(child.mask, union.mask, "a unit rate must alter the union of the parents");
                let flipped: Vec<bool> = union.mask.iter().map(|b| !b).collect();
                assert_eq!(child.mask, flipped, "a unit rate flips every bit of the union");
                checked += 1;
            }
        }
        assert!(checked > 0, "some children should have been scored");
    }

    #[test]
    fn test_time_cap_stops_after_first_generation() {
        let data = create_test_data(5);
        let mut param = create_test_params();
        param.ga.generations = 50;
        let outcome = evolve(&data, &param, running(), Some(Duration::ZERO)).unwrap();
        assert_eq!(outcome.generations, 1, "the cap is checked at the end of each generation");
        assert_eq!(outcome.populations.len(), 1);
        assert_eq!(outcome.best.mask.len(), 5, "a capped run still returns a winner");
    }

    #[test]
    fn test_time_cap_in_seconds_maps_to_duration() {
        let data = create_test_data(5);
        let mut param = create_test_params();
        param.ga.max_duration_secs = 3600;
        let outcome = ga(&data, &param, running()).unwrap();
        assert_eq!(outcome.generations, 4, "a distant cap leaves the generation limit in charge");
    }
}
