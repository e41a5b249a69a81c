//! Leak-free train/test window construction

use super::scaler::{Scaler, ScalerKind};
use crate::data::TimeSeriesTable;
use crate::error::{Error, Result};
use ndarray::{concatenate, s, Array1, Array2, Array3, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Scaled windows plus everything needed to undo the scaling later
#[derive(Debug, Clone)]
pub struct ScaledDataset {
    /// [windows, time_step, features]
    pub x_train: Array3<f64>,
    pub y_train: Array1<f64>,
    /// [windows, time_step, features]
    pub x_test: Array3<f64>,
    pub y_test: Array1<f64>,
    /// Fitted on the train rows only
    pub scaler: Scaler,
    /// Train rows followed by test rows, all scaled
    pub scaled_data: Array2<f64>,
    /// Position of the target inside the feature list
    pub target_index: usize,
    /// First test row (`floor(N * train_ratio)`)
    pub split_index: usize,
}

impl ScaledDataset {
    pub fn num_features(&self) -> usize {
        self.scaled_data.ncols()
    }

    pub fn time_step(&self) -> usize {
        self.x_train.shape()[1]
    }
}

/// Builds [`ScaledDataset`]s from a raw feature table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPreparer {
    /// Ordered feature columns
    pub features: Vec<String>,
    /// Target column, one of `features`
    pub target: String,
    /// Window length
    pub time_step: usize,
    pub scaler_kind: ScalerKind,
    /// Fraction of rows (from the start) used for training
    pub train_ratio: f64,
}

impl DataPreparer {
    pub fn new(features: Vec<String>, target: impl Into<String>, time_step: usize) -> Self {
        Self {
            features,
            target: target.into(),
            time_step,
            scaler_kind: ScalerKind::MinMax,
            train_ratio: 0.8,
        }
    }

    pub fn with_scaler(mut self, kind: ScalerKind) -> Self {
        self.scaler_kind = kind;
        self
    }

    pub fn with_train_ratio(mut self, ratio: f64) -> Self {
        self.train_ratio = ratio;
        self
    }

    /// Index of the target inside `features`
    pub fn target_index(&self) -> Result<usize> {
        self.features
            .iter()
            .position(|f| *f == self.target)
            .ok_or_else(|| {
                Error::validation(format!(
                    "target column '{}' must be one of the features {:?}",
                    self.target, self.features
                ))
            })
    }

    /// Splits chronologically, fits the scaler on the train rows and windows both slices
    pub fn prepare(&self, table: &TimeSeriesTable) -> Result<ScaledDataset> {
        let target_index = self.target_index()?;
        if self.time_step == 0 {
            return Err(Error::validation("time_step must be positive"));
        }
        if !(self.train_ratio > 0.0 && self.train_ratio < 1.0) {
            return Err(Error::validation(format!(
                "train_ratio must be in (0, 1), got {}",
                self.train_ratio
            )));
        }

        let raw = table.select(&self.features)?;
        let n_rows = raw.nrows();

        // Split before scaling: the scaler never sees test rows
        let split_index = (n_rows as f64 * self.train_ratio).floor() as usize;
        if split_index == 0 {
            return Err(Error::validation(format!(
                "train slice is empty ({} rows, train_ratio {})",
                n_rows, self.train_ratio
            )));
        }

        let train_raw = raw.slice(s![..split_index, ..]);
        let test_raw = raw.slice(s![split_index.., ..]);

        let scaler = Scaler::fit(self.scaler_kind, train_raw)?;
        let train_scaled = scaler.transform(train_raw)?;
        let test_scaled = scaler.transform(test_raw)?;

        let scaled_data = concatenate(Axis(0), &[train_scaled.view(), test_scaled.view()])
            .map_err(|e| Error::validation(e.to_string()))?;

        let (x_train, y_train) = create_windows(train_scaled.view(), self.time_step, target_index);

        // Test windows look back over the tail of the train slice
        let carry_start = split_index.saturating_sub(self.time_step);
        let test_source = scaled_data.slice(s![carry_start.., ..]);
        let (x_test, y_test) = if test_raw.nrows() == 0 {
            empty_windows(self.time_step, self.features.len())
        } else {
            create_windows(test_source, self.time_step, target_index)
        };

        info!(
            "Prepared dataset: {} rows, split at {}, train windows {:?}, test windows {:?}",
            n_rows,
            split_index,
            x_train.shape(),
            x_test.shape()
        );
        debug!("Scaler: {:?}", scaler.kind());

        Ok(ScaledDataset {
            x_train,
            y_train,
            x_test,
            y_test,
            scaler,
            scaled_data,
            target_index,
            split_index,
        })
    }
}

/// Slides a `time_step` window over `data`.
///
/// Produces `max(M - time_step, 0)` windows: window `i` is rows `[i, i + time_step)`
/// and its target is `data[i + time_step][target_index]`.
pub fn create_windows(
    data: ArrayView2<'_, f64>,
    time_step: usize,
    target_index: usize,
) -> (Array3<f64>, Array1<f64>) {
    let n_rows = data.nrows();
    let n_features = data.ncols();
    let n_windows = n_rows.saturating_sub(time_step);

    let mut x = Array3::zeros((n_windows, time_step, n_features));
    let mut y = Array1::zeros(n_windows);

    for i in 0..n_windows {
        x.slice_mut(s![i, .., ..])
            .assign(&data.slice(s![i..i + time_step, ..]));
        y[i] = data[[i + time_step, target_index]];
    }

    (x, y)
}

fn empty_windows(time_step: usize, n_features: usize) -> (Array3<f64>, Array1<f64>) {
    (Array3::zeros((0, time_step, n_features)), Array1::zeros(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::business_days;
    use chrono::NaiveDate;
    use ndarray::array;

    fn ramp_table(n: usize) -> TimeSeriesTable {
        let dates = business_days(NaiveDate::from_ymd_opt(2023, 1, 2).unwrap(), n);
        TimeSeriesTable::from_columns(
            dates,
            vec![
                ("Close".to_string(), (0..n).map(|i| 100.0 + i as f64).collect()),
                ("Volume".to_string(), (0..n).map(|i| 1000.0 - i as f64).collect()),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_create_windows_contents() {
        let data = array![[0.0, 10.0], [1.0, 11.0], [2.0, 12.0], [3.0, 13.0], [4.0, 14.0]];
        let (x, y) = create_windows(data.view(), 3, 1);

        assert_eq!(x.shape(), &[2, 3, 2]);
        assert_eq!(y.to_vec(), vec![13.0, 14.0]);
        for i in 0..2 {
            assert_eq!(x.slice(s![i, .., ..]), data.slice(s![i..i + 3, ..]));
        }
    }

    #[test]
    fn test_create_windows_short_input() {
        let data = array![[0.0], [1.0]];
        let (x, y) = create_windows(data.view(), 5, 0);
        assert_eq!(x.shape(), &[0, 5, 1]);
        assert_eq!(y.len(), 0);
    }

    #[test]
    fn test_prepare_shapes_and_split() {
        let table = ramp_table(100);
        let preparer = DataPreparer::new(vec!["Close".into(), "Volume".into()], "Close", 10);
        let ds = preparer.prepare(&table).unwrap();

        assert_eq!(ds.split_index, 80);
        assert_eq!(ds.x_train.shape(), &[70, 10, 2]);
        assert_eq!(ds.y_train.len(), 70);
        // Every test row is the target of one window
        assert_eq!(ds.x_test.shape(), &[20, 10, 2]);
        assert_eq!(ds.scaled_data.shape(), &[100, 2]);
        assert_eq!(ds.target_index, 0);
    }

    #[test]
    fn test_scaler_fitted_on_train_rows_only() {
        let table = ramp_table(100);
        let preparer = DataPreparer::new(vec!["Close".into()], "Close", 5);
        let ds = preparer.prepare(&table).unwrap();

        match &ds.scaler {
            Scaler::MinMax(s) => {
                assert_eq!(s.data_min()[0], 100.0);
                assert_eq!(s.data_max()[0], 179.0);
            }
            other => panic!("unexpected scaler {:?}", other),
        }
        // Test rows lie above the train range
        assert!(ds.y_test.iter().all(|&v| v > 1.0));
    }

    #[test]
    fn test_first_test_window_looks_back_over_split() {
        let table = ramp_table(50);
        let preparer = DataPreparer::new(vec!["Close".into()], "Close", 5);
        let ds = preparer.prepare(&table).unwrap();

        let split = ds.split_index;
        assert_eq!(
            ds.x_test.slice(s![0, .., 0]),
            ds.scaled_data.slice(s![split - 5..split, 0])
        );
        assert_eq!(ds.y_test[0], ds.scaled_data[[split, 0]]);
    }

    #[test]
    fn test_target_must_be_a_feature() {
        let table = ramp_table(30);
        let preparer = DataPreparer::new(vec!["Volume".into()], "Close", 5);
        assert!(matches!(preparer.prepare(&table), Err(Error::Validation(_))));
    }

    #[test]
    fn test_invalid_ratio() {
        let table = ramp_table(30);
        let preparer =
            DataPreparer::new(vec!["Close".into()], "Close", 5).with_train_ratio(1.0);
        assert!(preparer.prepare(&table).is_err());
    }
}
