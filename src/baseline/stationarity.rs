//! Augmented Dickey-Fuller stationarity test

use super::ols::{ols, OlsFit};
use crate::error::{Error, Result};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use std::fmt;
use tracing::debug;

/// MacKinnon (2010) response surface, constant-only regression, one series
const CRIT_1: [f64; 4] = [-3.43035, -6.5393, -16.786, -79.433];
const CRIT_5: [f64; 4] = [-2.86154, -2.8903, -4.234, -40.040];
const CRIT_10: [f64; 4] = [-2.56677, -1.5384, -2.809, 0.0];

/// MacKinnon (1994) p-value polynomials in the statistic
const TAU_MAX: f64 = 2.74;
const TAU_MIN: f64 = -18.83;
const TAU_STAR: f64 = -1.61;
const TAU_SMALL_P: [f64; 3] = [2.1659, 1.4412, 0.038269];
const TAU_LARGE_P: [f64; 4] = [1.7339, 0.93202, -0.12745, -0.010368];

/// Significance level for the stationarity verdict
pub const SIGNIFICANCE: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CriticalValues {
    pub one_percent: f64,
    pub five_percent: f64,
    pub ten_percent: f64,
}

impl CriticalValues {
    fn for_sample(n_obs: usize) -> Self {
        let surface = |b: &[f64; 4]| {
            let inv = 1.0 / n_obs as f64;
            b[0] + b[1] * inv + b[2] * inv.powi(2) + b[3] * inv.powi(3)
        };
        Self {
            one_percent: surface(&CRIT_1),
            five_percent: surface(&CRIT_5),
            ten_percent: surface(&CRIT_10),
        }
    }
}

/// ADF test outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationarityReport {
    /// t-ratio of the lagged level coefficient
    pub statistic: f64,
    pub p_value: f64,
    pub critical_values: CriticalValues,
    /// `p_value <= 0.05`
    pub is_stationary: bool,
    /// Number of lagged differences in the regression
    pub used_lag: usize,
    /// Observations in the final regression
    pub n_obs: usize,
}

impl fmt::Display for StationarityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ADF Statistic: {:.4}", self.statistic)?;
        writeln!(f, "p-value: {:.4}", self.p_value)?;
        writeln!(
            f,
            "Critical values: 1%={:.4}, 5%={:.4}, 10%={:.4}",
            self.critical_values.one_percent,
            self.critical_values.five_percent,
            self.critical_values.ten_percent
        )?;
        write!(
            f,
            "Lags: {}, observations: {} -> {}",
            self.used_lag,
            self.n_obs,
            if self.is_stationary {
                "stationary"
            } else {
                "non-stationary"
            }
        )
    }
}

/// ADF test with the lag length chosen by AIC up to `12·(n/100)^¼`
pub fn adf_test(series: &[f64]) -> Result<StationarityReport> {
    adf_test_with_lag(series, None)
}

/// ADF test with an explicit upper bound on the lag search
///
/// H0: the series has a unit root. The regression is
/// `Δy_t = α + β·y_{t-1} + Σ γ_i·Δy_{t-i} + ε_t`.
pub fn adf_test_with_lag(series: &[f64], max_lag: Option<usize>) -> Result<StationarityReport> {
    let n = series.len();
    if series.iter().any(|v| !v.is_finite()) {
        return Err(Error::validation("ADF test input contains non-finite values"));
    }

    // At least one lag candidate must leave a usable regression
    let cap = (n / 2).checked_sub(2).filter(|&c| c >= 1).ok_or_else(|| {
        Error::validation(format!("series of {} values is too short for the ADF test", n))
    })?;
    let default_lag = (12.0 * (n as f64 / 100.0).powf(0.25)).ceil() as usize;
    let max_lag = max_lag.unwrap_or(default_lag).min(cap);

    let diff: Vec<f64> = series.windows(2).map(|w| w[1] - w[0]).collect();

    // Every candidate uses the same sample so the AICs are comparable
    let mut best: Option<(usize, f64)> = None;
    for lag in 0..=max_lag {
        let Some(fit) = adf_regression(series, &diff, lag, max_lag) else {
            continue;
        };
        let k = (lag + 2) as f64;
        let aic = -2.0 * fit.log_likelihood() + 2.0 * k;
        if best.map_or(true, |(_, b)| aic < b) {
            best = Some((lag, aic));
        }
    }
    let (used_lag, _) =
        best.ok_or_else(|| Error::validation("ADF regression is singular for every lag"))?;

    let fit = adf_regression(series, &diff, used_lag, used_lag)
        .ok_or_else(|| Error::validation("ADF regression is singular"))?;
    let n_obs = diff.len() - used_lag;
    let statistic = fit.beta[1] / fit.std_error(1);
    if !statistic.is_finite() {
        return Err(Error::validation("ADF statistic is not finite"));
    }

    let p_value = mackinnon_p_value(statistic);
    debug!(
        "ADF: statistic {:.4}, p-value {:.4}, lag {}",
        statistic, p_value, used_lag
    );

    Ok(StationarityReport {
        statistic,
        p_value,
        critical_values: CriticalValues::for_sample(n_obs),
        is_stationary: p_value <= SIGNIFICANCE,
        used_lag,
        n_obs,
    })
}

/// Regression with `lag` lagged differences on rows `start..diff.len()`
fn adf_regression(series: &[f64], diff: &[f64], lag: usize, start: usize) -> Option<OlsFit> {
    let rows = diff.len().checked_sub(start)?;
    let cols = 2 + lag;
    if rows <= cols {
        return None;
    }

    let mut x_data = Vec::with_capacity(rows * cols);
    for t in start..diff.len() {
        x_data.push(1.0);
        x_data.push(series[t]);
        for i in 1..=lag {
            x_data.push(diff[t - i]);
        }
    }

    let x = DMatrix::from_row_slice(rows, cols, &x_data);
    let y = DVector::from_column_slice(&diff[start..]);
    ols(&x, &y)
}

/// Approximate p-value of an ADF statistic (constant, no trend)
pub fn mackinnon_p_value(statistic: f64) -> f64 {
    if statistic > TAU_MAX {
        return 1.0;
    }
    if statistic < TAU_MIN {
        return 0.0;
    }
    let coefs: &[f64] = if statistic <= TAU_STAR {
        &TAU_SMALL_P
    } else {
        &TAU_LARGE_P
    };
    let z = coefs.iter().rev().fold(0.0, |acc, c| acc * statistic + c);

    match Normal::new(0.0, 1.0) {
        Ok(normal) => normal.cdf(z),
        Err(_) => f64::NAN,
    }
}
