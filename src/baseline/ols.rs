//! Ordinary least squares via the normal equations

use nalgebra::{DMatrix, DVector};

pub(crate) struct OlsFit {
    pub beta: DVector<f64>,
    pub residuals: DVector<f64>,
    /// Sum of squared residuals
    pub ssr: f64,
    /// (X'X)^(-1), for coefficient standard errors
    pub xtx_inv: DMatrix<f64>,
}

impl OlsFit {
    /// Standard error of coefficient `i`
    pub fn std_error(&self, i: usize) -> f64 {
        let dof = self.residuals.len().saturating_sub(self.beta.len());
        if dof == 0 {
            return f64::NAN;
        }
        let s2 = self.ssr / dof as f64;
        (s2 * self.xtx_inv[(i, i)]).sqrt()
    }

    /// Gaussian log-likelihood at the ML variance `ssr / n`
    pub fn log_likelihood(&self) -> f64 {
        let n = self.residuals.len() as f64;
        -0.5 * n * ((2.0 * std::f64::consts::PI).ln() + (self.ssr / n).ln() + 1.0)
    }
}

/// OLS: β = (X'X)^(-1) X'y. `None` when X'X is singular or the fit is not finite.
pub(crate) fn ols(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<OlsFit> {
    if x.nrows() != y.len() || x.nrows() < x.ncols() || x.ncols() == 0 {
        return None;
    }
    let xtx = x.transpose() * x;
    let xty = x.transpose() * y;

    let xtx_inv = xtx.try_inverse()?;
    let beta = &xtx_inv * xty;
    if beta.iter().any(|b| !b.is_finite()) {
        return None;
    }

    let residuals = y - x * &beta;
    let ssr = residuals.iter().map(|r| r * r).sum();

    Some(OlsFit {
        beta,
        residuals,
        ssr,
        xtx_inv,
    })
}
