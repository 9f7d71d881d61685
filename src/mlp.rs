use crate::error::Result;
use crate::model::{check_prediction_set, check_training_set, encode_labels, Classifier};
use crate::param::Mlp as MlpParam;
use crate::utils::softmax;
use log::debug;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const ADAM_EPSILON: f64 = 1e-8;
const LOG_EPSILON: f64 = 1e-10;

/// Dense layer, `weights[i][j]` links input `i` to output `j`
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Layer {
    pub weights: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
}

impl Layer {
    fn zeros(n_in: usize, n_out: usize) -> Layer {
        Layer { weights: vec![vec![0.0; n_out]; n_in], bias: vec![0.0; n_out] }
    }

    /// Glorot uniform initialisation
    fn glorot(n_in: usize, n_out: usize, rng: &mut ChaCha8Rng) -> Layer {
        let bound = (6.0 / (n_in + n_out) as f64).sqrt();
        Layer {
            weights: (0..n_in)
                .map(|_| (0..n_out).map(|_| rng.gen_range(-bound..bound)).collect())
                .collect(),
            bias: (0..n_out).map(|_| rng.gen_range(-bound..bound)).collect(),
        }
    }

    fn forward(&self, input: &[f64]) -> Vec<f64> {
        let mut out = self.bias.clone();
        for (x, row) in input.iter().zip(self.weights.iter()) {
            for (o, w) in out.iter_mut().zip(row.iter()) {
                *o += x * w;
            }
        }
        out
    }

    fn squared_norm(&self) -> f64 {
        self.weights.iter().flatten().map(|w| w * w).sum()
    }
}

/// First and second moment estimates of one layer
#[derive(Clone, Debug)]
struct AdamMoments {
    m: Layer,
    v: Layer,
}

impl AdamMoments {
    fn new(layer: &Layer) -> AdamMoments {
        let n_in = layer.weights.len();
        let n_out = layer.bias.len();
        AdamMoments { m: Layer::zeros(n_in, n_out), v: Layer::zeros(n_in, n_out) }
    }

    fn step(&mut self, layer: &mut Layer, grad: &Layer, step_size: f64) {
        let update = |p: &mut f64, m: &mut f64, v: &mut f64, g: f64| {
            *m = BETA1 * *m + (1.0 - BETA1) * g;
            *v = BETA2 * *v + (1.0 - BETA2) * g * g;
            *p -= step_size * *m / (v.sqrt() + ADAM_EPSILON);
        };
        for i in 0..layer.weights.len() {
            for j in 0..layer.bias.len() {
                update(&mut layer.weights[i][j], &mut self.m.weights[i][j], &mut self.v.weights[i][j], grad.weights[i][j]);
            }
        }
        for j in 0..layer.bias.len() {
            update(&mut layer.bias[j], &mut self.m.bias[j], &mut self.v.bias[j], grad.bias[j]);
        }
    }
}

/// One hidden layer perceptron: ReLU hidden units, softmax output, Adam with L2 penalty
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Mlp {
    pub hidden_size: usize,
    pub epochs: usize,
    pub learning_rate: f64,
    pub alpha: f64,
    pub batch_size: usize,
    pub seed: u64,
    pub hidden: Layer,
    pub output: Layer,
    /// Mean penalised cross-entropy of each epoch
    pub loss_curve: Vec<f64>,
    classes: Vec<u8>,
    n_features: usize,
}

impl Mlp {
    pub fn from_param(param: &MlpParam, seed: u64) -> Mlp {
        Mlp {
            hidden_size: param.hidden_size,
            epochs: param.epochs,
            learning_rate: param.learning_rate,
            alpha: param.alpha,
            batch_size: param.batch_size,
            seed,
            hidden: Layer::zeros(0, 0),
            output: Layer::zeros(0, 0),
            loss_curve: Vec::new(),
            classes: Vec::new(),
            n_features: 0,
        }
    }

    /// Hidden activations and output probabilities of one row
    fn forward(&self, row: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let hidden: Vec<f64> = self.hidden.forward(row).into_iter().map(|z| z.max(0.0)).collect();
        let proba = softmax(&self.output.forward(&hidden));
        (hidden, proba)
    }

    /// Penalised gradients of one mini-batch, returns (hidden grad, output grad, batch loss)
    fn backward(&self, X: &[Vec<f64>], labels: &[usize], batch: &[usize]) -> (Layer, Layer, f64) {
        let m = batch.len() as f64;
        let n_classes = self.classes.len();
        let mut g_hidden = Layer::zeros(self.n_features, self.hidden_size);
        let mut g_output = Layer::zeros(self.hidden_size, n_classes);
        let mut loss = 0.0;

        for i in batch {
            let row = &X[*i];
            let (hidden, proba) = self.forward(row);
            loss -= proba[labels[*i]].max(LOG_EPSILON).ln();

            let delta_out: Vec<f64> = (0..n_classes)
                .map(|k| (proba[k] - if k == labels[*i] { 1.0 } else { 0.0 }) / m)
                .collect();
            for (h, a) in hidden.iter().enumerate() {
                for k in 0..n_classes {
                    g_output.weights[h][k] += a * delta_out[k];
                }
            }
            for k in 0..n_classes {
                g_output.bias[k] += delta_out[k];
            }

            for h in 0..self.hidden_size {
                if hidden[h] <= 0.0 {
                    continue;
                }
                let delta: f64 = (0..n_classes).map(|k| self.output.weights[h][k] * delta_out[k]).sum();
                for (j, x) in row.iter().enumerate() {
                    g_hidden.weights[j][h] += x * delta;
                }
                g_hidden.bias[h] += delta;
            }
        }

        // L2 penalty on weights only
        for (grad, layer) in [(&mut g_hidden, &self.hidden), (&mut g_output, &self.output)] {
            for (g_row, w_row) in grad.weights.iter_mut().zip(layer.weights.iter()) {
                for (g, w) in g_row.iter_mut().zip(w_row.iter()) {
                    *g += self.alpha * w / m;
                }
            }
        }
        loss += 0.5 * self.alpha * (self.hidden.squared_norm() + self.output.squared_norm());

        (g_hidden, g_output, loss)
    }
}

impl Classifier for Mlp {
    fn fit(&mut self, X: &[Vec<f64>], y: &[u8]) -> Result<()> {
        self.classes = check_training_set(X, y)?;
        self.n_features = X[0].len();
        let labels = encode_labels(y, &self.classes);
        let n = X.len();
        let batch_size = self.batch_size.clamp(1, n);

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        self.hidden = Layer::glorot(self.n_features, self.hidden_size, &mut rng);
        self.output = Layer::glorot(self.hidden_size, self.classes.len(), &mut rng);
        let mut hidden_moments = AdamMoments::new(&self.hidden);
        let mut output_moments = AdamMoments::new(&self.output);
        self.loss_curve = Vec::with_capacity(self.epochs);

        let mut order: Vec<usize> = (0..n).collect();
        let mut t = 0;
        for epoch in 0..self.epochs {
            order.shuffle(&mut rng);
            let mut epoch_loss = 0.0;
            for batch in order.chunks(batch_size) {
                let (g_hidden, g_output, loss) = self.backward(X, &labels, batch);
                epoch_loss += loss;

                t += 1;
                let step_size = self.learning_rate * (1.0 - BETA2.powi(t)).sqrt() / (1.0 - BETA1.powi(t));
                hidden_moments.step(&mut self.hidden, &g_hidden, step_size);
                output_moments.step(&mut self.output, &g_output, step_size);
            }
            self.loss_curve.push(epoch_loss / n as f64);
            debug!("mlp epoch {}: loss {:.5}", epoch + 1, epoch_loss / n as f64);
        }

        Ok(())
    }

    fn predict_proba(&self, X: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        check_prediction_set(X, self.n_features)?;
        Ok(X.iter().map(|row| self.forward(row).1).collect())
    }

    fn classes(&self) -> &[u8] {
        &self.classes
    }

    fn name(&self) -> &str {
        "Mlp"
    }
}
