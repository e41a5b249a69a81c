//! Per-column scalers fitted on the training partition only

use crate::error::{Error, Result};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which scaler to fit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalerKind {
    /// `(x - min) / (max - min)`
    MinMax,
    /// `(x - mean) / std`
    Standard,
}

impl Default for ScalerKind {
    fn default() -> Self {
        ScalerKind::MinMax
    }
}

impl FromStr for ScalerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "minmax" | "min-max" | "min_max" => Ok(ScalerKind::MinMax),
            "standard" | "zscore" | "z-score" => Ok(ScalerKind::Standard),
            _ => Err(Error::validation(format!("unknown scaler '{}'", s))),
        }
    }
}

impl fmt::Display for ScalerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalerKind::MinMax => write!(f, "minmax"),
            ScalerKind::Standard => write!(f, "standard"),
        }
    }
}

/// Min-max scaler to `[0, 1]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    data_min: Array1<f64>,
    data_max: Array1<f64>,
    /// `max - min`, with zero replaced by 1
    data_range: Array1<f64>,
}

impl MinMaxScaler {
    pub fn fit(data: ArrayView2<'_, f64>) -> Result<Self> {
        ensure_fittable(data)?;
        let data_min = data.fold_axis(Axis(0), f64::INFINITY, |acc, &x| acc.min(x));
        let data_max = data.fold_axis(Axis(0), f64::NEG_INFINITY, |acc, &x| acc.max(x));
        let data_range = (&data_max - &data_min).mapv(non_zero);

        Ok(Self {
            data_min,
            data_max,
            data_range,
        })
    }

    pub fn data_min(&self) -> &Array1<f64> {
        &self.data_min
    }

    pub fn data_max(&self) -> &Array1<f64> {
        &self.data_max
    }

    pub fn data_range(&self) -> &Array1<f64> {
        &self.data_range
    }
}

/// Standardization scaler (population standard deviation)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Array1<f64>,
    /// Standard deviation, with zero replaced by 1
    scale: Array1<f64>,
}

impl StandardScaler {
    pub fn fit(data: ArrayView2<'_, f64>) -> Result<Self> {
        ensure_fittable(data)?;
        let n = data.nrows() as f64;
        let mean = data.sum_axis(Axis(0)) / n;
        let centered = &data - &mean;
        let variance = centered.mapv(|x| x * x).sum_axis(Axis(0)) / n;
        let scale = variance.mapv(|v| non_zero(v.sqrt()));

        Ok(Self { mean, scale })
    }

    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    pub fn scale(&self) -> &Array1<f64> {
        &self.scale
    }
}

/// A fitted scaler. Parameters never change after [`Scaler::fit`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Scaler {
    MinMax(MinMaxScaler),
    Standard(StandardScaler),
}

impl Scaler {
    /// Fits a scaler of the given kind on `data` ([rows, features])
    pub fn fit(kind: ScalerKind, data: ArrayView2<'_, f64>) -> Result<Self> {
        Ok(match kind {
            ScalerKind::MinMax => Scaler::MinMax(MinMaxScaler::fit(data)?),
            ScalerKind::Standard => Scaler::Standard(StandardScaler::fit(data)?),
        })
    }

    pub fn kind(&self) -> ScalerKind {
        match self {
            Scaler::MinMax(_) => ScalerKind::MinMax,
            Scaler::Standard(_) => ScalerKind::Standard,
        }
    }

    /// Number of feature columns the scaler was fitted on
    pub fn n_features(&self) -> usize {
        self.column_params().0.len()
    }

    /// Scales `data` with the stored parameters
    pub fn transform(&self, data: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        self.check_width(data.ncols())?;
        let (offset, scale) = self.column_params();
        Ok((&data - offset) / scale)
    }

    /// Maps scaled data back to original units
    pub fn inverse_transform(&self, data: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        self.check_width(data.ncols())?;
        let (offset, scale) = self.column_params();
        Ok(&data * scale + offset)
    }

    /// Inverts one column analytically:
    /// min-max `scaled * range + min`, standard `scaled * std + mean`.
    pub fn inverse_column(&self, column: usize, values: &[f64]) -> Result<Vec<f64>> {
        let (offset, scale) = self.column_params();
        if column >= offset.len() {
            return Err(Error::validation(format!(
                "column {} out of range for a scaler fitted on {} features",
                column,
                offset.len()
            )));
        }
        let (o, s) = (offset[column], scale[column]);
        Ok(values.iter().map(|&v| v * s + o).collect())
    }

    fn column_params(&self) -> (&Array1<f64>, &Array1<f64>) {
        match self {
            Scaler::MinMax(s) => (&s.data_min, &s.data_range),
            Scaler::Standard(s) => (&s.mean, &s.scale),
        }
    }

    fn check_width(&self, n_cols: usize) -> Result<()> {
        if n_cols != self.n_features() {
            return Err(Error::validation(format!(
                "scaler fitted on {} features, got {}",
                self.n_features(),
                n_cols
            )));
        }
        Ok(())
    }
}

fn ensure_fittable(data: ArrayView2<'_, f64>) -> Result<()> {
    if data.nrows() == 0 || data.ncols() == 0 {
        return Err(Error::validation("cannot fit a scaler on empty data"));
    }
    Ok(())
}

fn non_zero(x: f64) -> f64 {
    if x == 0.0 {
        1.0
    } else {
        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_minmax_range() {
        let data = array![[1.0, 10.0], [2.0, 20.0], [3.0, 30.0]];
        let scaler = Scaler::fit(ScalerKind::MinMax, data.view()).unwrap();
        let scaled = scaler.transform(data.view()).unwrap();

        assert_relative_eq!(scaled[[0, 0]], 0.0);
        assert_relative_eq!(scaled[[1, 1]], 0.5);
        assert_relative_eq!(scaled[[2, 1]], 1.0);
    }

    #[test]
    fn test_standard_zero_mean_unit_variance() {
        let data = array![[1.0], [2.0], [3.0], [4.0]];
        let scaler = Scaler::fit(ScalerKind::Standard, data.view()).unwrap();
        let scaled = scaler.transform(data.view()).unwrap();

        assert_relative_eq!(scaled.sum(), 0.0, epsilon = 1e-12);
        let var = scaled.mapv(|x| x * x).sum() / 4.0;
        assert_relative_eq!(var, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_round_trip() {
        let data = array![[100.5, 2.0e6], [101.25, 1.5e6], [99.0, 3.1e6], [102.0, 2.2e6]];
        for kind in [ScalerKind::MinMax, ScalerKind::Standard] {
            let scaler = Scaler::fit(kind, data.view()).unwrap();
            let scaled = scaler.transform(data.view()).unwrap();
            let restored = scaler.inverse_transform(scaled.view()).unwrap();

            for (a, b) in data.iter().zip(restored.iter()) {
                assert_relative_eq!(a, b, max_relative = 1e-9);
            }
        }
    }

    #[test]
    fn test_transform_does_not_refit() {
        let train = array![[1.0], [2.0], [3.0]];
        let test = array![[10.0], [20.0]];
        let scaler = Scaler::fit(ScalerKind::MinMax, train.view()).unwrap();
        let before = scaler.clone();

        let first = scaler.transform(test.view()).unwrap();
        let second = scaler.transform(test.view()).unwrap();

        assert_eq!(scaler, before);
        assert_eq!(first, second);
        // Test values outside the train range stay outside [0, 1]
        assert_relative_eq!(first[[0, 0]], 4.5);
    }

    #[test]
    fn test_inverse_column_matches_matrix_inverse() {
        let data = array![[1.0, 5.0], [3.0, 7.0], [2.0, 9.0]];
        for kind in [ScalerKind::MinMax, ScalerKind::Standard] {
            let scaler = Scaler::fit(kind, data.view()).unwrap();
            let scaled = scaler.transform(data.view()).unwrap();
            let column: Vec<f64> = scaled.column(1).to_vec();

            let inverted = scaler.inverse_column(1, &column).unwrap();
            assert_relative_eq!(inverted[0], 5.0, epsilon = 1e-12);
            assert_relative_eq!(inverted[2], 9.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_constant_column() {
        let data = array![[5.0], [5.0], [5.0]];
        let scaler = Scaler::fit(ScalerKind::MinMax, data.view()).unwrap();
        let scaled = scaler.transform(data.view()).unwrap();
        assert!(scaled.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_width_mismatch() {
        let scaler = Scaler::fit(ScalerKind::MinMax, array![[1.0, 2.0]].view()).unwrap();
        assert!(scaler.transform(array![[1.0]].view()).is_err());
    }
}
