use crate::data::Data;
use crate::fitness::fitness;
use crate::individual::Individual;
use crate::param::Param;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct Population {
    pub individuals: Vec<Individual>,
}

impl Population {
    pub fn new() -> Population {
        Population { individuals: Vec::new() }
    }

    /// populate the population with random bit vectors
    pub fn generate(&mut self, population_size: usize, feature_len: usize, rng: &mut ChaCha8Rng) {
        for _ in 0..population_size {
            self.individuals.push(Individual::random(feature_len, rng));
        }
    }

    /// Score every individual in parallel (runs in the current rayon pool)
    pub fn fit(&mut self, data: &Data, param: &Param) {
        self.individuals
            .par_iter_mut()
            .for_each(|i| {
                i.fit = fitness(i, data, param);
            });
    }

    /// Descending fitness; among equal fitnesses the individual placed later comes first
    pub fn sort(mut self) -> Self {
        self.individuals.sort_by(|i, j| i.fit.total_cmp(&j.fit));
        self.individuals.reverse();
        self
    }

    /// select first elements of a (sorted) population
    pub fn select_first(&self, n: usize) -> Population {
        Population {
            individuals: self.individuals.iter().take(n).cloned().collect(),
        }
    }

    /// add some individuals in the population
    pub fn add(&mut self, population: Population) {
        self.individuals.extend(population.individuals);
    }

    pub fn check_compatibility(&self, data: &Data) -> bool {
        self.individuals.iter().all(|i| i.check_compatibility(data))
    }

    /// Add the bit vector of every individual to a per-feature counter
    pub fn accumulate_frequency(&self, frequency: &mut [u64]) {
        for individual in &self.individuals {
            for (count, bit) in frequency.iter_mut().zip(individual.mask.iter()) {
                if *bit {
                    *count += 1;
                }
            }
        }
    }

    pub fn mean_k(&self) -> f64 {
        if self.individuals.is_empty() {
            return 0.0;
        }
        self.individuals.iter().map(|i| i.k as f64).sum::<f64>() / self.individuals.len() as f64
    }
}

impl Default for Population {
    fn default() -> Self {
        Population::new()
    }
}

impl fmt::Debug for Population {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Population")
            .field("individuals", &self.individuals)
            .finish()
    }
}
