//! Regression losses and their gradients w.r.t. the predictions

use super::config::LossFunction;
use ndarray::{Array1, ArrayView1, Zip};

const HUBER_DELTA: f64 = 1.0;

impl LossFunction {
    /// Mean loss over the batch
    pub fn value(&self, predictions: ArrayView1<'_, f64>, targets: ArrayView1<'_, f64>) -> f64 {
        let n = predictions.len();
        if n == 0 {
            return 0.0;
        }
        let total: f64 = Zip::from(&predictions)
            .and(&targets)
            .fold(0.0, |acc, &p, &t| acc + self.pointwise(p - t));
        total / n as f64
    }

    /// `d mean_loss / d prediction` for every row of the batch
    pub fn gradient(&self, predictions: ArrayView1<'_, f64>, targets: ArrayView1<'_, f64>) -> Array1<f64> {
        let n = predictions.len().max(1) as f64;
        Zip::from(&predictions)
            .and(&targets)
            .map_collect(|&p, &t| self.pointwise_grad(p - t) / n)
    }

    fn pointwise(&self, err: f64) -> f64 {
        match self {
            LossFunction::Mae => err.abs(),
            LossFunction::Mse => err * err,
            LossFunction::Huber => {
                if err.abs() <= HUBER_DELTA {
                    0.5 * err * err
                } else {
                    HUBER_DELTA * (err.abs() - 0.5 * HUBER_DELTA)
                }
            }
        }
    }

    fn pointwise_grad(&self, err: f64) -> f64 {
        match self {
            LossFunction::Mae => {
                if err > 0.0 {
                    1.0
                } else if err < 0.0 {
                    -1.0
                } else {
                    0.0
                }
            }
            LossFunction::Mse => 2.0 * err,
            LossFunction::Huber => err.clamp(-HUBER_DELTA, HUBER_DELTA),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_loss_values() {
        let p = array![1.0, 2.0, 5.0];
        let t = array![1.0, 3.0, 2.0];

        assert_abs_diff_eq!(LossFunction::Mae.value(p.view(), t.view()), 4.0 / 3.0);
        assert_abs_diff_eq!(LossFunction::Mse.value(p.view(), t.view()), 10.0 / 3.0);
        // 0 + 0.5 + (3 - 0.5)
        assert_abs_diff_eq!(LossFunction::Huber.value(p.view(), t.view()), 3.0 / 3.0);
    }

    #[test]
    fn test_gradients_match_finite_difference() {
        let p = array![0.3, -1.7, 2.2];
        let t = array![0.0, 0.4, 0.1];
        let eps = 1e-6;

        for loss in [LossFunction::Mae, LossFunction::Mse, LossFunction::Huber] {
            let grad = loss.gradient(p.view(), t.view());
            for i in 0..p.len() {
                let mut plus = p.clone();
                plus[i] += eps;
                let mut minus = p.clone();
                minus[i] -= eps;
                let numeric = (loss.value(plus.view(), t.view()) - loss.value(minus.view(), t.view())) / (2.0 * eps);
                assert_abs_diff_eq!(grad[i], numeric, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_empty_batch() {
        let empty = Array1::<f64>::zeros(0);
        assert_eq!(LossFunction::Mse.value(empty.view(), empty.view()), 0.0);
    }
}
