use crate::data::Data;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Candidate feature subset: one bit per column of the feature matrix
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct Individual {
    /// Selection bit of each feature column
    pub mask: Vec<bool>,
    /// Number of selected features
    pub k: usize,

    /// Fit value of the subset (weighted F1 of the proxy forest on the training set)
    pub fit: f64,

    /// Generation that led to the emergence of the subset
    pub epoch: usize,
    /// Hashes of the two elites the subset was recombined from
    pub parents: Option<Vec<u64>>,

    /// Identifier hash of the subset
    pub hash: u64,
}

impl Individual {
    /// Creates a new empty Individual
    ///
    /// # Examples
    ///
    /// ```
    /// # use evomal::individual::Individual;
    /// let individual = Individual::new();
    /// assert_eq!(individual.k, 0);
    /// assert_eq!(individual.fit, 0.0);
    /// ```
    pub fn new() -> Individual {
        Individual {
            mask: Vec::new(),
            k: 0,
            fit: 0.0,
            epoch: 0,
            parents: None,
            hash: 0,
        }
    }

    /// Builds an Individual from an explicit bit vector
    ///
    /// # Examples
    ///
    /// ```
    /// # use evomal::individual::Individual;
    /// let individual = Individual::from_mask(vec![true, false, true]);
    /// assert_eq!(individual.k, 2);
    /// assert_eq!(individual.features_index(), vec![0, 2]);
    /// ```
    pub fn from_mask(mask: Vec<bool>) -> Individual {
        let mut i = Individual::new();
        i.mask = mask;
        i.count_k();
        i.compute_hash();
        i
    }

    /// Generates an Individual whose bits are drawn independently and uniformly
    ///
    /// # Arguments
    ///
    /// * `feature_len` - Number of feature columns, i.e. the length of the bit vector
    /// * `rng` - Seeded random number generator
    ///
    /// # Examples
    ///
    /// ```
    /// # use evomal::individual::Individual;
    /// # use rand_chacha::ChaCha8Rng;
    /// # use rand::SeedableRng;
    /// let mut rng = ChaCha8Rng::seed_from_u64(42);
    /// let individual = Individual::random(10, &mut rng);
    /// assert_eq!(individual.mask.len(), 10);
    /// ```
    pub fn random(feature_len: usize, rng: &mut ChaCha8Rng) -> Individual {
        Individual::from_mask((0..feature_len).map(|_| rng.gen_bool(0.5)).collect())
    }

    /// Child of two elites: a feature is selected if either parent selects it
    ///
    /// # Arguments
    ///
    /// * `parent1`, `parent2` - Parents of identical length
    /// * `epoch` - Generation the child is born in
    ///
    /// # Examples
    ///
    /// ```
    /// # use evomal::individual::Individual;
    /// let a = Individual::from_mask(vec![true, false, false]);
    /// let b = Individual::from_mask(vec![false, false, true]);
    /// let child = Individual::union(&a, &b, 1);
    /// assert_eq!(child.mask, vec![true, false, true]);
    /// assert_eq!(child.parents, Some(vec![a.hash, b.hash]));
    /// ```
    pub fn union(parent1: &Individual, parent2: &Individual, epoch: usize) -> Individual {
        let mut child = Individual::from_mask(
            parent1
                .mask
                .iter()
                .zip(parent2.mask.iter())
                .map(|(a, b)| *a || *b)
                .collect(),
        );
        child.epoch = epoch;
        child.parents = Some(vec![parent1.hash, parent2.hash]);
        child
    }

    /// Flips each bit with probability `rate` and returns the number of flips
    pub fn mutate(&mut self, rate: f64, rng: &mut ChaCha8Rng) -> usize {
        if rate <= 0.0 {
            return 0;
        }
        let mut flips = 0;
        for bit in self.mask.iter_mut() {
            if rng.gen_bool(rate) {
                *bit = !*bit;
                flips += 1;
            }
        }
        if flips > 0 {
            self.count_k();
            self.compute_hash();
        }
        flips
    }

    /// Computes the hash of the Individual from its bit vector
    pub fn compute_hash(&mut self) {
        let mut hasher = DefaultHasher::new();
        self.mask.hash(&mut hasher);
        self.hash = hasher.finish();
    }

    /// Counts the number of selected features and updates k accordingly
    pub fn count_k(&mut self) {
        self.k = self.mask.iter().filter(|b| **b).count();
    }

    pub fn is_empty(&self) -> bool {
        self.k == 0
    }

    /// Indices of the selected columns, in original column order
    pub fn features_index(&self) -> Vec<usize> {
        self.mask
            .iter()
            .enumerate()
            .filter(|(_, b)| **b)
            .map(|(i, _)| i)
            .collect()
    }

    /// Names of the selected columns, in original column order
    pub fn feature_names(&self, data: &Data) -> Vec<String> {
        self.features_index()
            .iter()
            .map(|i| data.features[*i].clone())
            .collect()
    }

    /// Checks that the bit vector matches the columns of a dataset
    pub fn check_compatibility(&self, data: &Data) -> bool {
        self.mask.len() == data.feature_len
    }

    /// Human readable summary naming the selected features
    pub fn display(&self, data: &Data) -> String {
        format!(
            "\x1b[1;93m{} features\x1b[0m [fit {:.4}, epoch {}]: {}",
            self.k,
            self.fit,
            self.epoch,
            self.feature_names(data).join(", ")
        )
    }
}

impl Default for Individual {
    fn default() -> Self {
        Individual::new()
    }
}

impl fmt::Display for Individual {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bits: String = self.mask.iter().map(|b| if *b { '1' } else { '0' }).collect();
        write!(f, "{} [k={}, fit={:.4}]", bits, self.k, self.fit)
    }
}

impl fmt::Debug for Individual {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}
