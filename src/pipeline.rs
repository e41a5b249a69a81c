//! End-to-end runs of the sequence model and the ARIMA baseline

use crate::baseline::{adf_test, fit_baseline, ArimaModel, ArimaOrder, StationarityReport};
use crate::config::PipelineConfig;
use crate::data::TimeSeriesTable;
use crate::error::{Error, Result};
use crate::evaluation::{compare, ComparisonReport, MetricSet};
use crate::forecast::{DatedForecast, ForecastResult, Forecaster};
use crate::model::{EpochObserver, Evaluation, TrainedModel, TrainingHistory};
use tracing::{info, warn};

/// Output of [`run_sequence`]
#[derive(Debug, Clone)]
pub struct SequenceRun {
    pub model: TrainedModel,
    pub history: TrainingHistory,
    /// `None` when the test slice produced no windows
    pub evaluation: Option<Evaluation>,
    pub forecast: ForecastResult,
    /// Forecast labelled with the trading days after the last table row
    pub dated: Vec<DatedForecast>,
    pub split_index: usize,
}

/// Output of [`run_baseline`]
#[derive(Debug, Clone)]
pub struct BaselineRun {
    /// `None` when the train slice is too short for the ADF regression
    pub stationarity: Option<StationarityReport>,
    pub model: Option<ArimaModel>,
    pub order: Option<ArimaOrder>,
    /// Forecast over the test slice, empty without a model
    pub forecast: Vec<f64>,
    pub actual: Vec<f64>,
    pub metrics: Option<MetricSet>,
    pub split_index: usize,
}

/// Both flows plus their comparison
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub sequence: SequenceRun,
    pub baseline: Option<BaselineRun>,
    pub comparison: Option<ComparisonReport>,
}

/// Rows with a gap in `columns`, typically indicator warm-up, are dropped
fn complete_rows(table: &TimeSeriesTable, columns: &[String]) -> TimeSeriesTable {
    let cleaned = table.drop_missing_in(columns);
    let dropped = table.len() - cleaned.len();
    if dropped > 0 {
        info!("Dropped {} rows with missing values", dropped);
    }
    cleaned
}

/// Prepares the table, trains the configured network, evaluates it on the
/// test windows and forecasts `config.forecast.horizon` steps.
pub fn run_sequence(
    table: &TimeSeriesTable,
    config: &PipelineConfig,
    observers: &mut [&mut dyn EpochObserver],
) -> Result<SequenceRun> {
    config.validate()?;
    let table = complete_rows(table, &config.model.features_to_use);
    let dataset = config.preparer().prepare(&table)?;

    let (model, history) = TrainedModel::train(&dataset, &config.model, observers)?;
    info!(
        "Trained {} for {} epochs (best epoch {})",
        config.model.model_type,
        history.epochs_run(),
        history.best_epoch
    );

    let evaluation = if dataset.y_test.is_empty() {
        warn!("No test windows, skipping evaluation");
        None
    } else {
        let evaluation = model.evaluate(&dataset.x_test, &dataset.y_test)?;
        info!("Test metrics: {}", evaluation.metrics);
        Some(evaluation)
    };

    let forecast = Forecaster::from_trained(&model)?
        .forecast(dataset.scaled_data.view(), config.forecast.horizon)?;
    let dated = table
        .last_date()
        .map(|last| forecast.with_dates(last))
        .unwrap_or_default();

    Ok(SequenceRun {
        model,
        history,
        evaluation,
        forecast,
        dated,
        split_index: dataset.split_index,
    })
}

/// Splits the raw target column chronologically, checks stationarity, fits
/// the baseline on the train part and forecasts the test part.
pub fn run_baseline(table: &TimeSeriesTable, config: &PipelineConfig) -> Result<BaselineRun> {
    let target = &config.model.target_column;
    let table = complete_rows(table, std::slice::from_ref(target));
    let series: Vec<f64> = table
        .column(target)
        .ok_or_else(|| Error::validation(format!("target column '{}' not found", target)))?
        .to_vec();

    let split_index = (series.len() as f64 * config.data.train_ratio).floor() as usize;
    if split_index == 0 {
        return Err(Error::validation("baseline train slice is empty"));
    }
    let (train, test) = series.split_at(split_index);

    let stationarity = match adf_test(train) {
        Ok(report) => {
            info!(
                "ADF statistic {:.4}, p-value {:.4}: {}",
                report.statistic,
                report.p_value,
                if report.is_stationary {
                    "stationary"
                } else {
                    "non-stationary"
                }
            );
            Some(report)
        }
        Err(err) => {
            warn!("Stationarity check skipped: {}", err);
            None
        }
    };

    let (model, order) = fit_baseline(train, config.baseline.order).into_parts();
    let (forecast, metrics) = match &model {
        Some(model) => {
            let forecast = model.forecast(test.len());
            let metrics = if test.is_empty() {
                None
            } else {
                Some(MetricSet::compute(test, &forecast)?)
            };
            (forecast, metrics)
        }
        None => {
            warn!("No baseline model could be fitted");
            (Vec::new(), None)
        }
    };
    if let Some(m) = &metrics {
        info!("Baseline metrics: {}", m);
    }

    Ok(BaselineRun {
        stationarity,
        model,
        order,
        forecast,
        actual: test.to_vec(),
        metrics,
        split_index,
    })
}

/// Compares both runs on their test metrics; the sequence model is side A
pub fn compare_runs(sequence: &SequenceRun, baseline: &BaselineRun) -> Option<ComparisonReport> {
    let a = sequence.evaluation.as_ref()?.metrics;
    let b = baseline.metrics?;
    let label_b = baseline
        .order
        .map(|o| o.to_string())
        .unwrap_or_else(|| "ARIMA".to_string());
    Some(compare(&sequence.model.config().model_type, &a, &label_b, &b))
}

/// Runs the sequence flow and, when enabled, the baseline and the comparison
pub fn run(
    table: &TimeSeriesTable,
    config: &PipelineConfig,
    observers: &mut [&mut dyn EpochObserver],
) -> Result<PipelineReport> {
    let sequence = run_sequence(table, config, observers)?;
    let baseline = if config.baseline.enabled {
        Some(run_baseline(table, config)?)
    } else {
        None
    };
    let comparison = baseline
        .as_ref()
        .and_then(|b| compare_runs(&sequence, b));

    Ok(PipelineReport {
        sequence,
        baseline,
        comparison,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelConfig;
    use chrono::NaiveDate;

    fn table(n: usize) -> TimeSeriesTable {
        let dates = crate::data::business_days(NaiveDate::from_ymd_opt(2023, 1, 2).unwrap(), n);
        let close: Vec<f64> = (0..n)
            .map(|i| 100.0 + 10.0 * (i as f64 * 0.2).sin() + 0.05 * i as f64)
            .collect();
        let volume: Vec<f64> = (0..n).map(|i| 1000.0 + 50.0 * (i as f64 * 0.3).cos()).collect();
        TimeSeriesTable::from_columns(
            dates,
            vec![("Close".to_string(), close), ("Volume".to_string(), volume)],
        )
        .unwrap()
    }

    fn config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.model = ModelConfig::new(vec!["Close".into(), "Volume".into()], "Close")
            .with_neurons(32)
            .with_layers(1)
            .with_time_step(5)
            .with_epochs(3)
            .with_batch_size(16);
        config.forecast.horizon = 4;
        config.baseline.order = Some(ArimaOrder::new(1, 1, 0));
        config
    }

    #[test]
    fn test_run_sequence() {
        let table = table(80);
        let run = run_sequence(&table, &config(), &mut []).unwrap();

        assert_eq!(run.split_index, 64);
        assert_eq!(run.forecast.len(), 4);
        assert_eq!(run.dated.len(), 4);
        assert!(run.dated[0].date > table.last_date().unwrap());
        // Every test row is scored exactly once
        assert_eq!(run.evaluation.unwrap().y_true.len(), 16);
    }

    #[test]
    fn test_run_baseline() {
        let table = table(120);
        let run = run_baseline(&table, &config()).unwrap();

        assert_eq!(run.split_index, 96);
        assert_eq!(run.order, Some(ArimaOrder::new(1, 1, 0)));
        assert_eq!(run.forecast.len(), 24);
        assert_eq!(run.actual.len(), 24);
        assert!(run.metrics.unwrap().rmse.is_finite());

        // Stationarity is judged on the train part only
        let close = table.column("Close").unwrap().to_vec();
        let expected = adf_test(&close[..96]).unwrap();
        assert_eq!(run.stationarity.unwrap().statistic, expected.statistic);
    }

    #[test]
    fn test_run_baseline_missing_target() {
        let mut config = config();
        config.model.target_column = "Open".into();
        assert!(matches!(
            run_baseline(&table(40), &config),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_run_compares_both_flows() {
        let report = run(&table(100), &config(), &mut []).unwrap();
        let comparison = report.comparison.unwrap();

        assert_eq!(comparison.label_a, "LSTM");
        assert_eq!(comparison.label_b, "ARIMA(1,1,0)");
        assert_eq!(comparison.rows.len(), 4);
    }
}
