//! Optimization algorithms
//!
//! The optimizer sees the network as a flat list of parameter tensors and a
//! matching list of gradients.

use ndarray::{ArrayD, ArrayViewMutD, Zip};
use serde::{Deserialize, Serialize};

/// Optimizer trait for parameter updates
pub trait Optimizer {
    /// Applies one update; `grads[k]` belongs to `params[k]`
    fn step(&mut self, params: Vec<ArrayViewMutD<'_, f64>>, grads: &[ArrayD<f64>]);
}

/// Adam optimizer (Adaptive Moment Estimation)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Adam {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    #[serde(skip)]
    t: i32,
    #[serde(skip)]
    m: Vec<ArrayD<f64>>,
    #[serde(skip)]
    v: Vec<ArrayD<f64>>,
}

impl Adam {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
            t: 0,
            m: Vec::new(),
            v: Vec::new(),
        }
    }

    /// Number of updates applied so far
    pub fn iterations(&self) -> i32 {
        self.t
    }
}

impl Optimizer for Adam {
    fn step(&mut self, params: Vec<ArrayViewMutD<'_, f64>>, grads: &[ArrayD<f64>]) {
        // Initialize moments if needed
        if self.m.len() != grads.len() {
            self.m = grads.iter().map(|g| ArrayD::zeros(g.raw_dim())).collect();
            self.v = grads.iter().map(|g| ArrayD::zeros(g.raw_dim())).collect();
            self.t = 0;
        }
        self.t += 1;

        let (beta1, beta2) = (self.beta1, self.beta2);
        let bias1 = 1.0 - beta1.powi(self.t);
        let bias2 = 1.0 - beta2.powi(self.t);
        let lr = self.learning_rate;
        let eps = self.epsilon;

        for (((mut param, grad), m), v) in params
            .into_iter()
            .zip(grads)
            .zip(self.m.iter_mut())
            .zip(self.v.iter_mut())
        {
            Zip::from(&mut param)
                .and(grad)
                .and(m)
                .and(v)
                .for_each(|p, &g, m, v| {
                    *m = beta1 * *m + (1.0 - beta1) * g;
                    *v = beta2 * *v + (1.0 - beta2) * g * g;
                    let m_hat = *m / bias1;
                    let v_hat = *v / bias2;
                    *p -= lr * m_hat / (v_hat.sqrt() + eps);
                });
        }
    }
}

/// Global L2 norm of a gradient list
pub fn global_norm(grads: &[ArrayD<f64>]) -> f64 {
    grads
        .iter()
        .map(|g| g.iter().map(|x| x * x).sum::<f64>())
        .sum::<f64>()
        .sqrt()
}

/// Rescales `grads` so their global norm is at most `max_norm`.
/// Returns the norm before clipping.
pub fn clip_by_global_norm(grads: &mut [ArrayD<f64>], max_norm: f64) -> f64 {
    let norm = global_norm(grads);
    if norm > max_norm && norm > 0.0 {
        let scale = max_norm / norm;
        for g in grads.iter_mut() {
            g.mapv_inplace(|x| x * scale);
        }
    }
    norm
}
