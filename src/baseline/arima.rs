//! ARIMA(p, d, q) fitted by conditional least squares

use super::ols::ols;
use crate::error::Result;
use crate::evaluation::MetricSet;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Orders of the AR, differencing and MA parts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArimaOrder {
    pub p: usize,
    pub d: usize,
    pub q: usize,
}

impl ArimaOrder {
    /// Order used when no searched candidate fits
    pub const FALLBACK: ArimaOrder = ArimaOrder { p: 1, d: 1, q: 1 };

    pub fn new(p: usize, d: usize, q: usize) -> Self {
        Self { p, d, q }
    }

    /// Minimum series length accepted by [`ArimaModel::fit`]
    pub fn min_observations(&self) -> usize {
        self.p + self.d + self.q + 10
    }
}

impl fmt::Display for ArimaOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ARIMA({},{},{})", self.p, self.d, self.q)
    }
}

/// Why a single candidate could not be fitted
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ArimaError {
    #[error("series too short: {len} values, at least {required} required")]
    TooShort { len: usize, required: usize },

    #[error("singular design matrix")]
    Singular,

    #[error("non-finite estimate: {0}")]
    NonFinite(&'static str),
}

/// Fitted ARIMA model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArimaModel {
    order: ArimaOrder,
    /// φ_1..φ_p
    ar_coeffs: Vec<f64>,
    /// θ_1..θ_q
    ma_coeffs: Vec<f64>,
    /// Only estimated when d == 0
    constant: f64,
    sigma2: f64,
    log_likelihood: f64,
    aic: f64,
    bic: f64,
    history: Vec<f64>,
    differenced: Vec<f64>,
    /// Aligned with `differenced`; the first p entries are zero
    residuals: Vec<f64>,
}

impl ArimaModel {
    /// Fits the model to `series`
    pub fn fit(series: &[f64], order: ArimaOrder) -> std::result::Result<Self, ArimaError> {
        if series.iter().any(|v| !v.is_finite()) {
            return Err(ArimaError::NonFinite("input series"));
        }
        let required = order.min_observations();
        if series.len() < required {
            return Err(ArimaError::TooShort {
                len: series.len(),
                required,
            });
        }

        let ArimaOrder { p, d, q } = order;
        let differenced = difference(series, d);
        let with_constant = d == 0;

        let (constant, ar_coeffs, ma_coeffs) = if q == 0 {
            let (c, ar) = estimate_ar(&differenced, p, with_constant)?;
            (c, ar, Vec::new())
        } else {
            estimate_arma(&differenced, p, q, with_constant)?
        };

        let residuals = arma_residuals(&differenced, &ar_coeffs, &ma_coeffs, constant);
        let effective = &residuals[p..];
        let n = effective.len() as f64;
        let sigma2 = effective.iter().map(|e| e * e).sum::<f64>() / n;
        if !sigma2.is_finite() || sigma2 <= 0.0 {
            return Err(ArimaError::NonFinite("residual variance"));
        }

        let log_likelihood = -0.5 * n * ((2.0 * std::f64::consts::PI * sigma2).ln() + 1.0);
        let k = (p + q + usize::from(with_constant) + 1) as f64;
        let aic = -2.0 * log_likelihood + 2.0 * k;
        let bic = -2.0 * log_likelihood + k * n.ln();
        if !aic.is_finite() {
            return Err(ArimaError::NonFinite("AIC"));
        }

        Ok(Self {
            order,
            ar_coeffs,
            ma_coeffs,
            constant,
            sigma2,
            log_likelihood,
            aic,
            bic,
            history: series.to_vec(),
            differenced,
            residuals,
        })
    }

    pub fn order(&self) -> ArimaOrder {
        self.order
    }

    pub fn ar_coeffs(&self) -> &[f64] {
        &self.ar_coeffs
    }

    pub fn ma_coeffs(&self) -> &[f64] {
        &self.ma_coeffs
    }

    pub fn constant(&self) -> f64 {
        self.constant
    }

    pub fn sigma2(&self) -> f64 {
        self.sigma2
    }

    pub fn log_likelihood(&self) -> f64 {
        self.log_likelihood
    }

    pub fn aic(&self) -> f64 {
        self.aic
    }

    pub fn bic(&self) -> f64 {
        self.bic
    }

    /// Point forecasts `steps` ahead of the fitted series, in original level
    pub fn forecast(&self, steps: usize) -> Vec<f64> {
        let mut w = self.differenced.clone();
        let mut e = self.residuals.clone();
        let mut deltas = Vec::with_capacity(steps);

        for _ in 0..steps {
            let t = w.len();
            let mut pred = self.constant;
            for (i, phi) in self.ar_coeffs.iter().enumerate() {
                pred += phi * w[t - 1 - i];
            }
            for (j, theta) in self.ma_coeffs.iter().enumerate() {
                if t > j {
                    pred += theta * e[t - 1 - j];
                }
            }
            w.push(pred);
            // Future shocks have zero expectation
            e.push(0.0);
            deltas.push(pred);
        }

        integrate(&self.history, self.order.d, &deltas)
    }

    /// Forecasts `actual.len()` steps and scores them against `actual`
    pub fn evaluate(&self, actual: &[f64]) -> Result<MetricSet> {
        let predicted = self.forecast(actual.len());
        MetricSet::compute(actual, &predicted)
    }

    pub fn summary(&self) -> String {
        let mut s = format!("{} Model Summary\n", self.order);
        s.push_str(&"=".repeat(40));
        s.push('\n');

        if !self.ar_coeffs.is_empty() {
            s.push_str("AR Coefficients:\n");
            for (i, &c) in self.ar_coeffs.iter().enumerate() {
                s.push_str(&format!("  φ{} = {:.6}\n", i + 1, c));
            }
        }

        if !self.ma_coeffs.is_empty() {
            s.push_str("MA Coefficients:\n");
            for (i, &c) in self.ma_coeffs.iter().enumerate() {
                s.push_str(&format!("  θ{} = {:.6}\n", i + 1, c));
            }
        }

        if self.order.d == 0 {
            s.push_str(&format!("Constant: {:.6}\n", self.constant));
        }
        s.push_str(&format!("Sigma²: {:.6}\n", self.sigma2));
        s.push_str(&format!("Log-likelihood: {:.2}\n", self.log_likelihood));
        s.push_str(&format!("AIC: {:.2}\n", self.aic));
        s.push_str(&format!("BIC: {:.2}\n", self.bic));

        s
    }
}

/// Differences the series `d` times
pub fn difference(data: &[f64], d: usize) -> Vec<f64> {
    let mut result = data.to_vec();
    for _ in 0..d {
        if result.len() < 2 {
            return vec![];
        }
        result = result.windows(2).map(|w| w[1] - w[0]).collect();
    }
    result
}

/// Undoes `d` levels of differencing for values that follow `history`
fn integrate(history: &[f64], d: usize, deltas: &[f64]) -> Vec<f64> {
    let mut current = deltas.to_vec();
    for level in (0..d).rev() {
        let mut last = difference(history, level).last().copied().unwrap_or(0.0);
        current = current
            .iter()
            .map(|&delta| {
                last += delta;
                last
            })
            .collect();
    }
    current
}

/// OLS of `w_t` on its `p` lags, optionally with a constant
fn estimate_ar(
    w: &[f64],
    p: usize,
    with_constant: bool,
) -> std::result::Result<(f64, Vec<f64>), ArimaError> {
    if p == 0 {
        let constant = if with_constant {
            w.iter().sum::<f64>() / w.len() as f64
        } else {
            0.0
        };
        return Ok((constant, Vec::new()));
    }

    let offset = usize::from(with_constant);
    let cols = p + offset;
    let rows = w.len().saturating_sub(p);
    if rows <= cols {
        return Err(ArimaError::TooShort {
            len: w.len(),
            required: p + cols + 1,
        });
    }

    let mut x_data = Vec::with_capacity(rows * cols);
    for t in p..w.len() {
        if with_constant {
            x_data.push(1.0);
        }
        for i in 1..=p {
            x_data.push(w[t - i]);
        }
    }

    let x = DMatrix::from_row_slice(rows, cols, &x_data);
    let y = DVector::from_column_slice(&w[p..]);
    let fit = ols(&x, &y).ok_or(ArimaError::Singular)?;

    let constant = if with_constant { fit.beta[0] } else { 0.0 };
    let ar = fit.beta.iter().skip(offset).copied().collect();
    Ok((constant, ar))
}

/// Hannan–Rissanen: a long AR supplies residual estimates, then `w_t` is
/// regressed on its own lags and the lagged residuals.
fn estimate_arma(
    w: &[f64],
    p: usize,
    q: usize,
    with_constant: bool,
) -> std::result::Result<(f64, Vec<f64>, Vec<f64>), ArimaError> {
    let n = w.len();
    let long_order = (p + q).max(10).min(n / 4).max(1);
    let (long_c, long_ar) = estimate_ar(w, long_order, true)?;
    let innovations = arma_residuals(w, &long_ar, &[], long_c);

    // Lagged innovations must come from rows the long AR actually covered
    let start = (long_order + q).max(p);
    let offset = usize::from(with_constant);
    let cols = offset + p + q;
    let rows = n.saturating_sub(start);
    if rows <= cols {
        return Err(ArimaError::TooShort {
            len: n,
            required: start + cols + 1,
        });
    }

    let mut x_data = Vec::with_capacity(rows * cols);
    for t in start..n {
        if with_constant {
            x_data.push(1.0);
        }
        for i in 1..=p {
            x_data.push(w[t - i]);
        }
        for j in 1..=q {
            x_data.push(innovations[t - j]);
        }
    }

    let x = DMatrix::from_row_slice(rows, cols, &x_data);
    let y = DVector::from_column_slice(&w[start..]);
    let fit = ols(&x, &y).ok_or(ArimaError::Singular)?;

    let constant = if with_constant { fit.beta[0] } else { 0.0 };
    let ar = fit.beta.iter().skip(offset).take(p).copied().collect();
    let ma = fit.beta.iter().skip(offset + p).copied().collect();
    Ok((constant, ar, ma))
}

/// One-step-ahead residuals, conditional on the first `p` values and on
/// zero pre-sample shocks
fn arma_residuals(w: &[f64], ar: &[f64], ma: &[f64], constant: f64) -> Vec<f64> {
    let mut e = vec![0.0; w.len()];
    for t in ar.len()..w.len() {
        let mut pred = constant;
        for (i, phi) in ar.iter().enumerate() {
            pred += phi * w[t - 1 - i];
        }
        for (j, theta) in ma.iter().enumerate() {
            if t > j {
                pred += theta * e[t - 1 - j];
            }
        }
        e[t] = w[t] - pred;
    }
    e
}
