//! # Autoregressive forecasting
//!
//! Rolls a trained regressor forward `n_future` steps. Each prediction is fed
//! back into the window as the target value of a new row whose other features
//! are frozen at their last observed (scaled) values.

use crate::data::next_trading_days;
use crate::error::{Error, Result};
use crate::model::{TrainedModel, WindowRegressor};
use crate::preprocessing::Scaler;
use chrono::NaiveDate;
use ndarray::{Array1, Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, info};

/// One forecast step in original units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    /// 1-based step ahead
    pub step: usize,
    pub value: f64,
}

/// A forecast step labelled with its trading day
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DatedForecast {
    pub date: NaiveDate,
    pub value: f64,
}

/// Ordered forecast, exactly as long as the requested horizon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    points: Vec<ForecastPoint>,
}

impl ForecastResult {
    pub fn points(&self) -> &[ForecastPoint] {
        &self.points
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Labels step `k` with the `k`-th weekday after `last_date`
    pub fn with_dates(&self, last_date: NaiveDate) -> Vec<DatedForecast> {
        next_trading_days(last_date, self.points.len())
            .into_iter()
            .zip(&self.points)
            .map(|(date, p)| DatedForecast {
                date,
                value: p.value,
            })
            .collect()
    }
}

/// Multi-step forecaster over any [`WindowRegressor`]
pub struct Forecaster<'a, M: WindowRegressor + ?Sized> {
    model: &'a M,
    scaler: &'a Scaler,
    target_index: usize,
}

impl<'a> Forecaster<'a, TrainedModel> {
    /// Forecaster using the bundle's own scaler and target column
    pub fn from_trained(model: &'a TrainedModel) -> Result<Self> {
        Ok(Self::new(model, model.scaler(), model.target_index()?))
    }
}

impl<'a, M: WindowRegressor + ?Sized> Forecaster<'a, M> {
    pub fn new(model: &'a M, scaler: &'a Scaler, target_index: usize) -> Self {
        Self {
            model,
            scaler,
            target_index,
        }
    }

    /// Forecasts `n_future` values following the end of `scaled_series`
    /// (`[rows, features]`, already scaled).
    pub fn forecast(&self, scaled_series: ArrayView2<'_, f64>, n_future: usize) -> Result<ForecastResult> {
        let time_step = self.model.time_step();
        let n_features = self.model.num_features();
        self.check(scaled_series, n_future, time_step, n_features)?;

        let tail_start = scaled_series.nrows() - time_step;
        let mut window: VecDeque<Array1<f64>> = scaled_series
            .outer_iter()
            .skip(tail_start)
            .map(|row| row.to_owned())
            .collect();
        let frozen = scaled_series.row(scaled_series.nrows() - 1).to_owned();

        let mut predictions = Vec::with_capacity(n_future);
        for step in 0..n_future {
            let input = Array2::from_shape_fn((time_step, n_features), |(i, j)| window[i][j]);
            let next = self.model.predict_window(input.view())?;
            debug!("Forecast step {}: scaled {:.6}", step + 1, next);
            predictions.push(next);

            let mut row = frozen.clone();
            row[self.target_index] = next;
            window.pop_front();
            window.push_back(row);
        }

        // Inverse through a full-width matrix so the target column's parameters apply
        let mut dummy = Array2::zeros((n_future, n_features));
        for (i, &p) in predictions.iter().enumerate() {
            dummy[[i, self.target_index]] = p;
        }
        let restored = self.scaler.inverse_transform(dummy.view())?;

        let points = restored
            .column(self.target_index)
            .iter()
            .enumerate()
            .map(|(i, &value)| ForecastPoint { step: i + 1, value })
            .collect();
        info!("Forecast {} steps ahead", n_future);

        Ok(ForecastResult { points })
    }

    fn check(
        &self,
        scaled_series: ArrayView2<'_, f64>,
        n_future: usize,
        time_step: usize,
        n_features: usize,
    ) -> Result<()> {
        if n_future == 0 {
            return Err(Error::forecast("n_future must be at least 1"));
        }
        if scaled_series.nrows() < time_step {
            return Err(Error::forecast(format!(
                "series has {} rows, the model needs {}",
                scaled_series.nrows(),
                time_step
            )));
        }
        if scaled_series.ncols() != n_features {
            return Err(Error::forecast(format!(
                "series has {} features, the model expects {}",
                scaled_series.ncols(),
                n_features
            )));
        }
        if self.scaler.n_features() != n_features {
            return Err(Error::forecast(format!(
                "scaler fitted on {} features, the model expects {}",
                self.scaler.n_features(),
                n_features
            )));
        }
        if self.target_index >= n_features {
            return Err(Error::forecast(format!(
                "target index {} out of range for {} features",
                self.target_index, n_features
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocessing::ScalerKind;
    use approx::assert_relative_eq;
    use ndarray::array;
    use std::cell::RefCell;

    /// Predicts the last target value plus a fixed step and records its inputs
    struct Drift {
        time_step: usize,
        num_features: usize,
        target: usize,
        seen: RefCell<Vec<Array2<f64>>>,
    }

    impl Drift {
        fn new(time_step: usize, num_features: usize) -> Self {
            Self {
                time_step,
                num_features,
                target: 0,
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl WindowRegressor for Drift {
        fn time_step(&self) -> usize {
            self.time_step
        }

        fn num_features(&self) -> usize {
            self.num_features
        }

        fn predict_window(&self, window: ArrayView2<'_, f64>) -> Result<f64> {
            self.seen.borrow_mut().push(window.to_owned());
            Ok(window[[self.time_step - 1, self.target]] + 0.1)
        }
    }

    fn scaler() -> Scaler {
        let raw = array![[0.0, 10.0], [10.0, 20.0]];
        Scaler::fit(ScalerKind::MinMax, raw.view()).unwrap()
    }

    fn series() -> Array2<f64> {
        array![[0.1, 0.5], [0.2, 0.6], [0.3, 0.7], [0.4, 0.8]]
    }

    #[test]
    fn test_forecast_length() {
        let model = Drift::new(3, 2);
        let scaler = scaler();
        let forecaster = Forecaster::new(&model, &scaler, 0);
        for n in 1..=6 {
            assert_eq!(forecaster.forecast(series().view(), n).unwrap().len(), n);
        }
    }

    #[test]
    fn test_window_slides_with_frozen_features() {
        let model = Drift::new(3, 2);
        let scaler = scaler();
        let result = Forecaster::new(&model, &scaler, 0)
            .forecast(series().view(), 3)
            .unwrap();

        let seen = model.seen.borrow();
        assert_eq!(seen[0], array![[0.2, 0.6], [0.3, 0.7], [0.4, 0.8]]);
        // Second window: oldest row evicted, new row = frozen last row with target replaced
        assert_eq!(seen[1].row(0), array![0.3, 0.7]);
        assert_relative_eq!(seen[1][[2, 0]], 0.5, epsilon = 1e-12);
        assert_eq!(seen[1][[2, 1]], 0.8);
        assert_eq!(seen[2][[2, 1]], 0.8);

        // Scaled 0.5, 0.6, 0.7 mapped back through min 0, range 10
        let values = result.values();
        assert_relative_eq!(values[0], 5.0, epsilon = 1e-9);
        assert_relative_eq!(values[2], 7.0, epsilon = 1e-9);
        assert_eq!(result.points()[2].step, 3);
    }

    #[test]
    fn test_forecast_is_deterministic() {
        let model = Drift::new(2, 2);
        let scaler = scaler();
        let forecaster = Forecaster::new(&model, &scaler, 0);
        let a = forecaster.forecast(series().view(), 4).unwrap();
        let b = forecaster.forecast(series().view(), 4).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_forecast_errors() {
        let model = Drift::new(3, 2);
        let scaler = scaler();

        let forecaster = Forecaster::new(&model, &scaler, 0);
        assert!(matches!(
            forecaster.forecast(series().view(), 0),
            Err(Error::Forecast(_))
        ));
        assert!(forecaster
            .forecast(array![[0.1, 0.2], [0.3, 0.4]].view(), 2)
            .is_err());
        assert!(forecaster
            .forecast(array![[0.1], [0.2], [0.3]].view(), 2)
            .is_err());

        let out_of_range = Forecaster::new(&model, &scaler, 5);
        assert!(out_of_range.forecast(series().view(), 1).is_err());
    }

    #[test]
    fn test_with_dates_skips_weekends() {
        let model = Drift::new(3, 2);
        let scaler = scaler();
        let result = Forecaster::new(&model, &scaler, 0)
            .forecast(series().view(), 3)
            .unwrap();

        // Friday
        let last = NaiveDate::from_ymd_opt(2024, 5, 3).unwrap();
        let dated = result.with_dates(last);
        assert_eq!(dated.len(), 3);
        assert_eq!(dated[0].date, NaiveDate::from_ymd_opt(2024, 5, 6).unwrap());
        assert_eq!(dated[2].date, NaiveDate::from_ymd_opt(2024, 5, 8).unwrap());
    }
}
