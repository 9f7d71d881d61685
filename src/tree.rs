use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

//-----------------------------------------------------------------------------
// Binary decision trees shared by the forest and the boosting learners
//-----------------------------------------------------------------------------

/// Tree node stored in a flat arena
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum Node {
    /// Terminal node: class distribution for classification trees, a single raw score for regression trees
    Leaf { value: Vec<f64> },
    /// Samples with `row[feature] <= threshold` go left
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

/// Growth limits of a tree
#[derive(Clone, Debug)]
pub struct TreeParams {
    /// 0 means unlimited
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Number of non constant features to examine before accepting a split
    pub max_features: usize,
}

/// Regularisation of second order (Newton) regression trees
#[derive(Clone, Debug)]
pub struct NewtonParams {
    pub lambda_l2: f64,
    pub min_hessian: f64,
}

impl Tree {
    /// Value of the leaf reached by a row
    pub fn leaf_value(&self, row: &[f64]) -> &[f64] {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return value,
                Node::Split { feature, threshold, left, right } => {
                    idx = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    /// Number of times each feature is used to split
    pub fn split_counts(&self, n_features: usize) -> Vec<usize> {
        let mut counts = vec![0; n_features];
        for node in &self.nodes {
            if let Node::Split { feature, .. } = node {
                counts[*feature] += 1;
            }
        }
        counts
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match &nodes[idx] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        walk(&self.nodes, 0)
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|n| matches!(n, Node::Leaf { .. })).count()
    }

    /// Grow a CART classification tree with Gini impurity
    ///
    /// `y` holds class positions (0..n_classes), `samples` the rows used (duplicates allowed for bootstraps).
    pub fn grow_classifier(
        X: &[Vec<f64>],
        y: &[usize],
        n_classes: usize,
        samples: Vec<usize>,
        params: &TreeParams,
        rng: &mut ChaCha8Rng,
    ) -> Tree {
        let mut tree = Tree { nodes: Vec::new() };
        tree.grow_classifier_node(X, y, n_classes, samples, 0, params, rng);
        tree
    }

    fn grow_classifier_node(
        &mut self,
        X: &[Vec<f64>],
        y: &[usize],
        n_classes: usize,
        samples: Vec<usize>,
        depth: usize,
        params: &TreeParams,
        rng: &mut ChaCha8Rng,
    ) -> usize {
        let idx = self.nodes.len();
        let counts = class_counts(y, n_classes, &samples);
        let n = samples.len() as f64;

        let is_pure = counts.iter().filter(|c| **c > 0.0).count() <= 1;
        let depth_reached = params.max_depth > 0 && depth >= params.max_depth;
        if is_pure || depth_reached || samples.len() < params.min_samples_split.max(2) {
            self.nodes.push(Node::Leaf { value: counts.iter().map(|c| c / n).collect() });
            return idx;
        }

        match best_gini_split(X, y, n_classes, &samples, &counts, params, rng) {
            None => {
                self.nodes.push(Node::Leaf { value: counts.iter().map(|c| c / n).collect() });
                idx
            }
            Some((feature, threshold)) => {
                let (left_samples, right_samples): (Vec<usize>, Vec<usize>) =
                    samples.iter().partition(|i| X[**i][feature] <= threshold);
                self.nodes.push(Node::Split { feature, threshold, left: 0, right: 0 });
                let left = self.grow_classifier_node(X, y, n_classes, left_samples, depth + 1, params, rng);
                let right = self.grow_classifier_node(X, y, n_classes, right_samples, depth + 1, params, rng);
                self.nodes[idx] = Node::Split { feature, threshold, left, right };
                idx
            }
        }
    }

    /// Grow a regression tree on gradients and hessians, leaves hold the Newton step `-G / (H + lambda)`
    pub fn grow_newton(
        X: &[Vec<f64>],
        grad: &[f64],
        hess: &[f64],
        samples: Vec<usize>,
        params: &TreeParams,
        newton: &NewtonParams,
    ) -> Tree {
        let mut tree = Tree { nodes: Vec::new() };
        tree.grow_newton_node(X, grad, hess, samples, 0, params, newton);
        tree
    }

    fn grow_newton_node(
        &mut self,
        X: &[Vec<f64>],
        grad: &[f64],
        hess: &[f64],
        samples: Vec<usize>,
        depth: usize,
        params: &TreeParams,
        newton: &NewtonParams,
    ) -> usize {
        let idx = self.nodes.len();
        let g: f64 = samples.iter().map(|i| grad[*i]).sum();
        let h: f64 = samples.iter().map(|i| hess[*i]).sum();
        let leaf = Node::Leaf { value: vec![-g / (h + newton.lambda_l2).max(f64::MIN_POSITIVE)] };

        let depth_reached = params.max_depth > 0 && depth >= params.max_depth;
        if depth_reached || samples.len() < 2 * params.min_samples_leaf.max(1) {
            self.nodes.push(leaf);
            return idx;
        }

        match best_newton_split(X, grad, hess, &samples, g, h, params, newton) {
            None => {
                self.nodes.push(leaf);
                idx
            }
            Some((feature, threshold)) => {
                let (left_samples, right_samples): (Vec<usize>, Vec<usize>) =
                    samples.iter().partition(|i| X[**i][feature] <= threshold);
                self.nodes.push(Node::Split { feature, threshold, left: 0, right: 0 });
                let left = self.grow_newton_node(X, grad, hess, left_samples, depth + 1, params, newton);
                let right = self.grow_newton_node(X, grad, hess, right_samples, depth + 1, params, newton);
                self.nodes[idx] = Node::Split { feature, threshold, left, right };
                idx
            }
        }
    }
}

fn class_counts(y: &[usize], n_classes: usize, samples: &[usize]) -> Vec<f64> {
    let mut counts = vec![0.0; n_classes];
    for i in samples {
        counts[y[*i]] += 1.0;
    }
    counts
}

fn gini(counts: &[f64], n: f64) -> f64 {
    if n == 0.0 {
        return 0.0;
    }
    1.0 - counts.iter().map(|c| (c / n).powi(2)).sum::<f64>()
}

/// Samples sorted by the value of one feature
fn sorted_by_feature(X: &[Vec<f64>], samples: &[usize], feature: usize) -> Vec<usize> {
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| X[*a][feature].total_cmp(&X[*b][feature]));
    sorted
}

/// Best (feature, threshold) by weighted Gini impurity, visiting features in random order
fn best_gini_split(
    X: &[Vec<f64>],
    y: &[usize],
    n_classes: usize,
    samples: &[usize],
    counts: &[f64],
    params: &TreeParams,
    rng: &mut ChaCha8Rng,
) -> Option<(usize, f64)> {
    let n_features = X[samples[0]].len();
    let n = samples.len() as f64;
    let min_leaf = params.min_samples_leaf.max(1);

    let mut order: Vec<usize> = (0..n_features).collect();
    order.shuffle(rng);

    let mut best: Option<(usize, f64)> = None;
    let mut best_impurity = f64::INFINITY;
    let mut visited = 0;

    for feature in order {
        if visited >= params.max_features && best.is_some() {
            break;
        }
        let sorted = sorted_by_feature(X, samples, feature);
        if X[sorted[0]][feature] == X[sorted[sorted.len() - 1]][feature] {
            continue;
        }
        visited += 1;

        let mut left = vec![0.0; n_classes];
        let mut right = counts.to_vec();
        for pos in 0..sorted.len() - 1 {
            let c = y[sorted[pos]];
            left[c] += 1.0;
            right[c] -= 1.0;

            let current = X[sorted[pos]][feature];
            let next = X[sorted[pos + 1]][feature];
            if current == next {
                continue;
            }
            let n_left = (pos + 1) as f64;
            let n_right = n - n_left;
            if (pos + 1) < min_leaf || sorted.len() - (pos + 1) < min_leaf {
                continue;
            }
            let impurity = (n_left * gini(&left, n_left) + n_right * gini(&right, n_right)) / n;
            if impurity < best_impurity {
                best_impurity = impurity;
                best = Some((feature, current + (next - current) / 2.0));
            }
        }
    }

    best
}

/// Best (feature, threshold) by second order gain, all features examined
fn best_newton_split(
    X: &[Vec<f64>],
    grad: &[f64],
    hess: &[f64],
    samples: &[usize],
    g: f64,
    h: f64,
    params: &TreeParams,
    newton: &NewtonParams,
) -> Option<(usize, f64)> {
    let n_features = X[samples[0]].len();
    let lambda = newton.lambda_l2;
    let min_leaf = params.min_samples_leaf.max(1);
    let parent_score = g * g / (h + lambda).max(f64::MIN_POSITIVE);

    let mut best: Option<(usize, f64)> = None;
    let mut best_gain = 0.0;

    for feature in 0..n_features {
        let sorted = sorted_by_feature(X, samples, feature);
        let mut g_left = 0.0;
        let mut h_left = 0.0;
        for pos in 0..sorted.len() - 1 {
            g_left += grad[sorted[pos]];
            h_left += hess[sorted[pos]];

            let current = X[sorted[pos]][feature];
            let next = X[sorted[pos + 1]][feature];
            if current == next {
                continue;
            }
            if (pos + 1) < min_leaf || sorted.len() - (pos + 1) < min_leaf {
                continue;
            }
            let g_right = g - g_left;
            let h_right = h - h_left;
            if h_left < newton.min_hessian || h_right < newton.min_hessian {
                continue;
            }
            let gain = g_left * g_left / (h_left + lambda) + g_right * g_right / (h_right + lambda) - parent_score;
            if gain > best_gain {
                best_gain = gain;
                best = Some((feature, current + (next - current) / 2.0));
            }
        }
    }

    best
}
