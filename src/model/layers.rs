//! Building blocks shared by the recurrent cells: activations, the dense
//! output head, batch normalization and dropout

use ndarray::{Array1, Array2, ArrayD, ArrayViewMutD, Axis};
use ndarray_rand::rand_distr::{Bernoulli, Uniform};
use ndarray_rand::RandomExt;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Gradients in the same order as the matching `params_mut` views
pub type ParamGrads = Vec<ArrayD<f64>>;

#[inline]
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Derivative of the sigmoid written in terms of its output
#[inline]
pub fn sigmoid_grad(s: f64) -> f64 {
    s * (1.0 - s)
}

/// Derivative of tanh written in terms of its output
#[inline]
pub fn tanh_grad(t: f64) -> f64 {
    1.0 - t * t
}

/// Fully connected layer with linear activation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dense {
    /// [input, output]
    weights: Array2<f64>,
    bias: Array1<f64>,
}

impl Dense {
    /// Xavier/Glorot uniform initialization
    pub fn new<R: Rng>(input_size: usize, output_size: usize, rng: &mut R) -> Self {
        let limit = (6.0 / (input_size + output_size) as f64).sqrt();
        Self {
            weights: Array2::random_using(
                (input_size, output_size),
                Uniform::new(-limit, limit),
                rng,
            ),
            bias: Array1::zeros(output_size),
        }
    }

    pub fn input_size(&self) -> usize {
        self.weights.nrows()
    }

    pub fn forward(&self, input: &Array2<f64>) -> Array2<f64> {
        input.dot(&self.weights) + &self.bias
    }

    /// Returns the input gradient and the parameter gradients
    pub fn backward(&self, input: &Array2<f64>, grad_output: &Array2<f64>) -> (Array2<f64>, ParamGrads) {
        let grad_weights = input.t().dot(grad_output);
        let grad_bias = grad_output.sum_axis(Axis(0));
        let grad_input = grad_output.dot(&self.weights.t());
        (
            grad_input,
            vec![grad_weights.into_dyn(), grad_bias.into_dyn()],
        )
    }

    pub fn params_mut(&mut self) -> Vec<ArrayViewMutD<'_, f64>> {
        vec![self.weights.view_mut().into_dyn(), self.bias.view_mut().into_dyn()]
    }
}

/// Batch normalization over the feature axis with running statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchNorm {
    gamma: Array1<f64>,
    beta: Array1<f64>,
    running_mean: Array1<f64>,
    running_var: Array1<f64>,
    momentum: f64,
    epsilon: f64,
}

/// Values kept from a training forward pass
#[derive(Debug, Clone)]
pub struct BatchNormCache {
    normalized: Array2<f64>,
    inv_std: Array1<f64>,
}

impl BatchNorm {
    pub fn new(size: usize) -> Self {
        Self {
            gamma: Array1::ones(size),
            beta: Array1::zeros(size),
            running_mean: Array1::zeros(size),
            running_var: Array1::ones(size),
            momentum: 0.99,
            epsilon: 1e-3,
        }
    }

    /// Normalizes with batch statistics and updates the running averages
    pub fn forward_train(&mut self, input: &Array2<f64>) -> (Array2<f64>, BatchNormCache) {
        let n = input.nrows() as f64;
        let mean = input.sum_axis(Axis(0)) / n;
        let centered = input - &mean;
        let var = centered.mapv(|x| x * x).sum_axis(Axis(0)) / n;
        let inv_std = var.mapv(|v| 1.0 / (v + self.epsilon).sqrt());
        let normalized = &centered * &inv_std;

        let m = self.momentum;
        self.running_mean = &self.running_mean * m + &mean * (1.0 - m);
        self.running_var = &self.running_var * m + &var * (1.0 - m);

        let output = &normalized * &self.gamma + &self.beta;
        (output, BatchNormCache { normalized, inv_std })
    }

    /// Normalizes with the running statistics
    pub fn forward(&self, input: &Array2<f64>) -> Array2<f64> {
        let inv_std = self.running_var.mapv(|v| 1.0 / (v + self.epsilon).sqrt());
        (input - &self.running_mean) * &inv_std * &self.gamma + &self.beta
    }

    pub fn backward(&self, cache: &BatchNormCache, grad_output: &Array2<f64>) -> (Array2<f64>, ParamGrads) {
        let n = grad_output.nrows() as f64;
        let grad_gamma = (grad_output * &cache.normalized).sum_axis(Axis(0));
        let grad_beta = grad_output.sum_axis(Axis(0));

        let grad_norm = grad_output * &self.gamma;
        let sum_grad = grad_norm.sum_axis(Axis(0));
        let sum_grad_norm = (&grad_norm * &cache.normalized).sum_axis(Axis(0));

        let grad_input = (grad_norm * n - &sum_grad - &cache.normalized * &sum_grad_norm)
            * &(&cache.inv_std / n);

        (
            grad_input,
            vec![grad_gamma.into_dyn(), grad_beta.into_dyn()],
        )
    }

    pub fn params_mut(&mut self) -> Vec<ArrayViewMutD<'_, f64>> {
        vec![self.gamma.view_mut().into_dyn(), self.beta.view_mut().into_dyn()]
    }
}

/// Inverted dropout mask: kept units are scaled by `1 / (1 - rate)`
pub fn dropout_mask<R: Rng>(shape: (usize, usize), rate: f64, rng: &mut R) -> Array2<f64> {
    let keep = 1.0 - rate;
    match Bernoulli::new(keep) {
        Ok(dist) => Array2::random_using(shape, dist, rng).mapv(|k| if k { 1.0 / keep } else { 0.0 }),
        Err(_) => Array2::ones(shape),
    }
}
