//! The trained model bundle

use super::config::ModelConfig;
use super::network::{SequenceRegressor, WindowRegressor};
use super::training::{EpochObserver, TrainingHistory};
use crate::error::{Error, Result};
use crate::evaluation::MetricSet;
use crate::preprocessing::{ScaledDataset, Scaler};
use ndarray::{Array1, Array3, ArrayView2};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Network, fitted scaler and configuration, serialized as one unit.
///
/// Only `&self` methods are exposed: the bundle never changes after training.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedModel {
    network: SequenceRegressor,
    scaler: Scaler,
    config: ModelConfig,
}

/// Test-set metrics plus the inverted series they were computed on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub metrics: MetricSet,
    pub y_true: Vec<f64>,
    pub y_pred: Vec<f64>,
}

impl TrainedModel {
    /// Builds a network for `dataset`, trains it and bundles the result
    pub fn train(
        dataset: &ScaledDataset,
        config: &ModelConfig,
        observers: &mut [&mut dyn EpochObserver],
    ) -> Result<(Self, TrainingHistory)> {
        if dataset.time_step() != config.time_step {
            return Err(Error::validation(format!(
                "dataset windows have {} steps but time_step is {}",
                dataset.time_step(),
                config.time_step
            )));
        }
        if dataset.target_index != config.target_index()? {
            return Err(Error::validation(
                "dataset target does not match the configured target column",
            ));
        }

        let mut network = SequenceRegressor::build(config, dataset.num_features())?;
        let history = network.fit(&dataset.x_train, &dataset.y_train, config, observers)?;

        let model = Self {
            network,
            scaler: dataset.scaler.clone(),
            config: config.clone(),
        };
        Ok((model, history))
    }

    pub fn network(&self) -> &SequenceRegressor {
        &self.network
    }

    pub fn scaler(&self) -> &Scaler {
        &self.scaler
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn target_index(&self) -> Result<usize> {
        self.config.target_index()
    }

    /// Predictions in scaled units
    pub fn predict_scaled(&self, x: &Array3<f64>) -> Result<Array1<f64>> {
        self.network.predict(&x.view())
    }

    /// Predictions in original units of the target column
    pub fn predict(&self, x: &Array3<f64>) -> Result<Vec<f64>> {
        let scaled = self.predict_scaled(x)?;
        self.scaler
            .inverse_column(self.target_index()?, &scaled.to_vec())
    }

    /// Predicts `x_test`, inverts both series to original units and scores them
    pub fn evaluate(&self, x_test: &Array3<f64>, y_test: &Array1<f64>) -> Result<Evaluation> {
        if x_test.shape()[0] != y_test.len() {
            return Err(Error::validation(format!(
                "{} test windows but {} targets",
                x_test.shape()[0],
                y_test.len()
            )));
        }
        let y_pred = self.predict(x_test)?;
        let y_true = self
            .scaler
            .inverse_column(self.target_index()?, &y_test.to_vec())?;

        let metrics = MetricSet::compute(&y_true, &y_pred)?;
        info!("Test metrics: {}", metrics);

        Ok(Evaluation {
            metrics,
            y_true,
            y_pred,
        })
    }
}

impl WindowRegressor for TrainedModel {
    fn time_step(&self) -> usize {
        self.network.time_step()
    }

    fn num_features(&self) -> usize {
        self.network.num_features()
    }

    fn predict_window(&self, window: ArrayView2<'_, f64>) -> Result<f64> {
        self.network.predict_window(window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{business_days, TimeSeriesTable};
    use crate::model::config::LossFunction;
    use crate::preprocessing::DataPreparer;
    use chrono::NaiveDate;

    fn dataset() -> ScaledDataset {
        let n = 80;
        let dates = business_days(NaiveDate::from_ymd_opt(2022, 3, 1).unwrap(), n);
        let close: Vec<f64> = (0..n).map(|i| 100.0 + 10.0 * (i as f64 * 0.25).sin()).collect();
        let volume: Vec<f64> = (0..n).map(|i| 1.0e6 + 1.0e4 * (i % 7) as f64).collect();
        let table = TimeSeriesTable::from_columns(
            dates,
            vec![("Close".to_string(), close), ("Volume".to_string(), volume)],
        )
        .unwrap();
        DataPreparer::new(vec!["Close".into(), "Volume".into()], "Close", 6)
            .prepare(&table)
            .unwrap()
    }

    fn config() -> ModelConfig {
        ModelConfig::new(vec!["Close".into(), "Volume".into()], "Close")
            .with_neurons(32)
            .with_layers(2)
            .with_time_step(6)
            .with_epochs(3)
            .with_batch_size(8)
            .with_loss(LossFunction::Mae)
    }

    #[test]
    fn test_train_and_evaluate() {
        let ds = dataset();
        let (model, history) = TrainedModel::train(&ds, &config(), &mut []).unwrap();
        assert!(history.epochs_run() >= 1);

        let evaluation = model.evaluate(&ds.x_test, &ds.y_test).unwrap();
        assert_eq!(evaluation.y_true.len(), ds.y_test.len());
        assert_eq!(evaluation.y_pred.len(), ds.y_test.len());
        // Inverted truth is back in price units
        assert!(evaluation.y_true.iter().all(|v| (85.0..115.0).contains(v)));
        assert!(evaluation.metrics.mae.is_finite());
    }

    #[test]
    fn test_time_step_mismatch() {
        let ds = dataset();
        let cfg = config().with_time_step(7);
        assert!(TrainedModel::train(&ds, &cfg, &mut []).is_err());
    }

    #[test]
    fn test_bundle_serializes() {
        let ds = dataset();
        let (model, _) = TrainedModel::train(&ds, &config().with_epochs(1), &mut []).unwrap();

        let json = serde_json::to_string(&model).unwrap();
        let restored: TrainedModel = serde_json::from_str(&json).unwrap();
        let before = model.predict_scaled(&ds.x_test).unwrap();
        let after = restored.predict_scaled(&ds.x_test).unwrap();
        for (a, b) in before.iter().zip(after.iter()) {
            assert!((a - b).abs() < 1e-9);
        }
    }
}
