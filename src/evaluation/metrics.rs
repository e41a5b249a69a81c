//! Regression metrics in original units

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Mean Squared Error
pub fn mse(y_true: &[f64], y_pred: &[f64]) -> f64 {
    mean(y_true.iter().zip(y_pred).map(|(t, p)| (t - p).powi(2)))
}

/// Root Mean Squared Error
pub fn rmse(y_true: &[f64], y_pred: &[f64]) -> f64 {
    mse(y_true, y_pred).sqrt()
}

/// Mean Absolute Error
pub fn mae(y_true: &[f64], y_pred: &[f64]) -> f64 {
    mean(y_true.iter().zip(y_pred).map(|(t, p)| (t - p).abs()))
}

/// R² score.
///
/// For a constant truth the score is 1 when the prediction is perfect and 0
/// otherwise.
pub fn r2_score(y_true: &[f64], y_pred: &[f64]) -> f64 {
    let mean_true = mean(y_true.iter().copied());

    let ss_res: f64 = y_true
        .iter()
        .zip(y_pred)
        .map(|(t, p)| (t - p).powi(2))
        .sum();

    let ss_tot: f64 = y_true.iter().map(|t| (t - mean_true).powi(2)).sum();

    if ss_tot == 0.0 {
        if ss_res == 0.0 {
            1.0
        } else {
            0.0
        }
    } else {
        1.0 - (ss_res / ss_tot)
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

/// MAE, MSE, RMSE and R² of one prediction series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSet {
    pub mae: f64,
    pub mse: f64,
    pub rmse: f64,
    pub r2: f64,
}

impl MetricSet {
    /// Fails on empty input or a length mismatch
    pub fn compute(y_true: &[f64], y_pred: &[f64]) -> Result<Self> {
        if y_true.len() != y_pred.len() {
            return Err(Error::validation(format!(
                "length mismatch: {} true values, {} predictions",
                y_true.len(),
                y_pred.len()
            )));
        }
        if y_true.is_empty() {
            return Err(Error::validation("cannot compute metrics on empty input"));
        }

        let mse = mse(y_true, y_pred);
        Ok(Self {
            mae: mae(y_true, y_pred),
            mse,
            rmse: mse.sqrt(),
            r2: r2_score(y_true, y_pred),
        })
    }
}

impl fmt::Display for MetricSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MAE={:.4}, MSE={:.4}, RMSE={:.4}, R²={:.4}",
            self.mae, self.mse, self.rmse, self.r2
        )
    }
}
