//! Pipeline configuration
//!
//! One TOML file drives both flows: data preparation, the recurrent model,
//! the forecast horizon and the ARIMA baseline.

use crate::baseline::ArimaOrder;
use crate::error::{Error, Result};
use crate::model::ModelConfig;
use crate::preprocessing::{DataPreparer, ScalerKind};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// Data configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// CSV with a `Date` column and one column per feature
    pub path: String,
    pub scaler: ScalerKind,
    /// Fraction of rows used for training, shared by both flows
    pub train_ratio: f64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            path: "data/index.csv".to_string(),
            scaler: ScalerKind::MinMax,
            train_ratio: 0.8,
        }
    }
}

/// Forecast configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Trading days to forecast past the last row
    pub horizon: usize,
    /// Optional CSV destination for the dated forecast
    pub output: Option<String>,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            horizon: 20,
            output: None,
        }
    }
}

/// ARIMA baseline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineConfig {
    pub enabled: bool,
    /// Fixed order; searched by AIC when absent
    pub order: Option<ArimaOrder>,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            order: None,
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PipelineConfig {
    pub data: DataConfig,
    pub model: ModelConfig,
    pub forecast: ForecastConfig,
    pub baseline: BaselineConfig,
}

impl PipelineConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from file or use default
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path.as_ref()) {
            Ok(config) => config,
            Err(err) => {
                warn!(
                    "Using default configuration, {} not loaded: {}",
                    path.as_ref().display(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Create default configuration file
    pub fn create_default<P: AsRef<Path>>(path: P) -> Result<()> {
        PipelineConfig::default().save(path)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.data.train_ratio > 0.0 && self.data.train_ratio < 1.0) {
            return Err(Error::validation(format!(
                "train_ratio must be in (0, 1), got {}",
                self.data.train_ratio
            )));
        }
        if self.forecast.horizon == 0 {
            return Err(Error::Config("forecast horizon must be at least 1".into()));
        }
        self.model.validate()
    }

    /// Preparer for the model's features, target and window length
    pub fn preparer(&self) -> DataPreparer {
        DataPreparer::new(
            self.model.features_to_use.clone(),
            self.model.target_column.clone(),
            self.model.time_step,
        )
        .with_scaler(self.data.scaler)
        .with_train_ratio(self.data.train_ratio)
    }
}
