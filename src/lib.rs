//! # Index Forecast
//!
//! Forecasting a daily stock-index close with stacked LSTM/GRU regressors,
//! benchmarked against an ARIMA baseline.
//!
//! ## Modules
//!
//! - `data` - Date-indexed feature table, CSV I/O, trading-day calendar
//! - `preprocessing` - Leak-free split, scaling and windowing
//! - `model` - LSTM/GRU networks, training, the trained model bundle
//! - `forecast` - Autoregressive multi-step forecasting
//! - `baseline` - ADF test and ARIMA order search/fit/forecast
//! - `evaluation` - Regression metrics and model comparison
//! - `pipeline` - Both flows end to end
//! - `config` - TOML configuration
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use index_forecast::config::PipelineConfig;
//! use index_forecast::data::load_table;
//! use index_forecast::pipeline;
//!
//! fn main() -> index_forecast::Result<()> {
//!     let config = PipelineConfig::load_or_default("configs/default.toml");
//!     let table = load_table(&config.data.path)?;
//!
//!     let report = pipeline::run(&table, &config, &mut [])?;
//!     for point in &report.sequence.dated {
//!         println!("{}: {:.2}", point.date, point.value);
//!     }
//!     if let Some(comparison) = report.comparison {
//!         println!("{}", comparison);
//!     }
//!     Ok(())
//! }
//! ```

pub mod baseline;
pub mod config;
pub mod data;
pub mod error;
pub mod evaluation;
pub mod forecast;
pub mod model;
pub mod pipeline;
pub mod preprocessing;

pub use error::{Error, Result};

/// Commonly used types
pub mod prelude {
    pub use crate::baseline::{adf_test, fit_baseline, ArimaModel, ArimaOrder, BaselineFit};
    pub use crate::config::PipelineConfig;
    pub use crate::data::{load_table, TimeSeriesTable};
    pub use crate::evaluation::{compare, ComparisonReport, MetricSet};
    pub use crate::forecast::{ForecastResult, Forecaster};
    pub use crate::model::{ModelConfig, ModelKind, TrainedModel, WindowRegressor};
    pub use crate::preprocessing::{DataPreparer, ScalerKind};
    pub use crate::{Error, Result};
}
