//! End-to-end tests for the sequence and baseline flows

use chrono::NaiveDate;
use index_forecast::config::PipelineConfig;
use index_forecast::data::{business_days, load_table, next_trading_days, TimeSeriesTable};
use index_forecast::model::EpochMetrics;
use index_forecast::pipeline::{compare_runs, run, run_baseline, run_sequence};
use index_forecast::prelude::*;
use std::io::Write;
use tempfile::NamedTempFile;

fn sine_table(n: usize) -> TimeSeriesTable {
    let dates = business_days(NaiveDate::from_ymd_opt(2022, 1, 3).unwrap(), n);
    // Deterministic jitter keeps the series from being an exact AR(2)
    let close: Vec<f64> = (0..n)
        .map(|i| 50.0 + 5.0 * (i as f64 * 0.15).sin() + ((i * 7919) % 13) as f64 / 26.0)
        .collect();
    let volume: Vec<f64> = (0..n)
        .map(|i| 2000.0 + 100.0 * (i as f64 * 0.05).cos())
        .collect();
    TimeSeriesTable::from_columns(
        dates,
        vec![("Close".to_string(), close), ("Volume".to_string(), volume)],
    )
    .unwrap()
}

fn small_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.model = ModelConfig::new(vec!["Close".into(), "Volume".into()], "Close")
        .with_neurons(32)
        .with_layers(1)
        .with_time_step(10)
        .with_epochs(2)
        .with_batch_size(32);
    config.forecast.horizon = 5;
    config
}

/// Sine wave: 200 rows, time_step 10, train_ratio 0.8
#[test]
fn test_sine_wave_end_to_end() {
    let table = sine_table(200);
    let config = small_config();

    let dataset = config.preparer().prepare(&table).unwrap();
    assert_eq!(dataset.split_index, 160);
    assert_eq!(dataset.x_train.shape(), &[150, 10, 2]);
    assert_eq!(dataset.x_test.shape(), &[40, 10, 2]);
    assert_eq!(dataset.x_train.shape()[0] + dataset.x_test.shape()[0], 190);

    let run = run_sequence(&table, &config, &mut []).unwrap();
    assert_eq!(run.forecast.len(), 5);
    assert!(run.forecast.values().iter().all(|v| v.is_finite()));
    assert_eq!(run.evaluation.as_ref().unwrap().y_true.len(), 40);

    // 2022-01-03 plus 199 weekdays ends on a Friday
    let last = table.last_date().unwrap();
    assert_eq!(last, NaiveDate::from_ymd_opt(2022, 10, 7).unwrap());
    assert_eq!(run.dated[0].date, NaiveDate::from_ymd_opt(2022, 10, 10).unwrap());
}

#[test]
fn test_gru_pipeline_with_observer() {
    let table = sine_table(120);
    let mut config = small_config();
    config.model = config.model.with_model_type(ModelKind::Gru).with_epochs(3);

    let mut seen = Vec::new();
    let mut record = |m: &EpochMetrics| seen.push(m.epoch);
    let run = run_sequence(&table, &config, &mut [&mut record]).unwrap();

    assert_eq!(run.model.network().kind(), ModelKind::Gru);
    assert_eq!(seen.len(), run.history.epochs_run());
}

#[test]
fn test_unknown_model_type_is_rejected() {
    let table = sine_table(100);
    let mut config = small_config();
    config.model.model_type = "Transformer".into();

    let err = run_sequence(&table, &config, &mut []).unwrap_err();
    assert!(matches!(err, Error::ModelBuild(_)));
}

#[test]
fn test_baseline_and_comparison() {
    let table = sine_table(150);
    let mut config = small_config();
    config.baseline.order = Some(ArimaOrder::new(2, 0, 0));

    let sequence = run_sequence(&table, &config, &mut []).unwrap();
    let baseline = run_baseline(&table, &config).unwrap();
    assert_eq!(baseline.forecast.len(), 30);

    let report = compare_runs(&sequence, &baseline).unwrap();
    assert_eq!(report.label_a, "LSTM");
    assert_eq!(report.label_b, "ARIMA(2,0,0)");
    let (a, b) = report.tally();
    assert_eq!(a + b, 4);
}

#[test]
fn test_run_from_csv_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "Date,Close,Volume").unwrap();
    let table = sine_table(90);
    let close = table.column("Close").unwrap();
    let volume = table.column("Volume").unwrap();
    // Written newest first: loading sorts by date
    for i in (0..table.len()).rev() {
        writeln!(file, "{},{},{}", table.dates()[i], close[i], volume[i]).unwrap();
    }
    file.flush().unwrap();

    let loaded = load_table(file.path()).unwrap();
    assert_eq!(loaded.len(), 90);
    assert_eq!(loaded.dates()[0], table.dates()[0]);

    let mut config = small_config();
    config.model.time_step = 5;
    config.baseline.order = Some(ArimaOrder::new(1, 1, 0));
    let report = run(&loaded, &config, &mut []).unwrap();

    assert_eq!(report.sequence.forecast.len(), 5);
    assert!(report.baseline.unwrap().metrics.is_some());
    assert!(report.comparison.is_some());
}

#[test]
fn test_indicator_warm_up_rows_are_dropped() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "Date,Close,Volume,RSI,MACD").unwrap();
    let table = sine_table(150);
    let close = table.column("Close").unwrap();
    let volume = table.column("Volume").unwrap();
    for i in 0..table.len() {
        // RSI needs 14 rows of history, MACD 25
        let rsi = if i < 14 {
            String::new()
        } else {
            (50.0 + 20.0 * (i as f64 * 0.1).sin()).to_string()
        };
        let macd = if i < 25 {
            String::new()
        } else {
            (0.5 * (i as f64 * 0.07).cos()).to_string()
        };
        writeln!(file, "{},{},{},{},{}", table.dates()[i], close[i], volume[i], rsi, macd).unwrap();
    }
    file.flush().unwrap();

    let loaded = load_table(file.path()).unwrap();
    assert!(loaded.column("MACD").unwrap()[0].is_nan());

    let mut config = PipelineConfig::default();
    // Default features include both indicators
    config.model = config
        .model
        .clone()
        .with_neurons(32)
        .with_layers(1)
        .with_time_step(10)
        .with_epochs(2);
    config.forecast.horizon = 3;
    config.baseline.order = Some(ArimaOrder::new(1, 1, 0));
    assert_eq!(
        config.model.features_to_use,
        vec!["Close", "Volume", "RSI", "MACD"]
    );

    let report = run(&loaded, &config, &mut []).unwrap();
    // 125 complete rows remain for the network, the target has no gaps
    assert_eq!(report.sequence.split_index, 100);
    assert_eq!(report.sequence.forecast.len(), 3);
    assert_eq!(report.sequence.dated[0].date, next_trading_days(table.last_date().unwrap(), 1)[0]);
    let baseline = report.baseline.unwrap();
    assert_eq!(baseline.split_index, 120);
    assert!(baseline.metrics.is_some());

    // Preparing the raw table directly still fails fast on the gaps
    assert!(matches!(
        config.preparer().prepare(&loaded),
        Err(Error::Validation(_))
    ));
}

#[test]
fn test_single_feature_sine() {
    let table = sine_table(200);
    let mut config = small_config();
    config.model.features_to_use = vec!["Close".into()];

    let dataset = config.preparer().prepare(&table).unwrap();
    assert_eq!(dataset.split_index, 160);
    assert_eq!(dataset.x_train.shape(), &[150, 10, 1]);
    assert_eq!(dataset.x_test.shape(), &[40, 10, 1]);

    let run = run_sequence(&table, &config, &mut []).unwrap();
    assert_eq!(run.split_index, 160);
    assert_eq!(run.forecast.len(), 5);
    assert!(run.forecast.values().iter().all(|v| v.is_finite()));
}
