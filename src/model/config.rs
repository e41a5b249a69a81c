//! Configuration of the recurrent regressor

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Recurrent cell variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelKind {
    /// Long Short-Term Memory (input, forget, output gates)
    #[serde(rename = "LSTM")]
    Lstm,
    /// Gated Recurrent Unit (update, reset gates)
    #[serde(rename = "GRU")]
    Gru,
}

impl FromStr for ModelKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "LSTM" => Ok(ModelKind::Lstm),
            "GRU" => Ok(ModelKind::Gru),
            _ => Err(Error::ModelBuild(format!(
                "model type must be either 'LSTM' or 'GRU', got '{}'",
                s
            ))),
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelKind::Lstm => write!(f, "LSTM"),
            ModelKind::Gru => write!(f, "GRU"),
        }
    }
}

/// Training objective
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LossFunction {
    Mae,
    Mse,
    /// Huber loss with delta = 1
    Huber,
}

impl FromStr for LossFunction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "mae" | "mean_absolute_error" => Ok(LossFunction::Mae),
            "mse" | "mean_squared_error" => Ok(LossFunction::Mse),
            "huber" => Ok(LossFunction::Huber),
            _ => Err(Error::ModelBuild(format!("unsupported loss function '{}'", s))),
        }
    }
}

impl fmt::Display for LossFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LossFunction::Mae => write!(f, "mae"),
            LossFunction::Mse => write!(f, "mse"),
            LossFunction::Huber => write!(f, "huber"),
        }
    }
}

/// Architecture and training hyperparameters.
///
/// `model_type` and `loss` are kept as names so that an unsupported value
/// surfaces as [`Error::ModelBuild`] when the network is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// "LSTM" or "GRU"
    pub model_type: String,
    /// Units per recurrent layer
    pub num_neurons: usize,
    pub dropout_rate: f64,
    pub num_hidden_layers: usize,
    /// Batch normalization after each recurrent layer
    pub use_batch_norm: bool,
    /// "mae", "mse" or "huber"
    pub loss: String,
    pub learning_rate: f64,
    pub epochs: usize,
    pub batch_size: usize,
    /// Window length
    pub time_step: usize,
    /// Chronological tail of the training windows held out for validation
    pub validation_split: f64,
    pub features_to_use: Vec<String>,
    pub target_column: String,
    /// Early stopping patience, in epochs
    pub patience: usize,
    /// Minimum validation-loss decrease that counts as an improvement
    pub min_delta: f64,
    /// Global gradient-norm clipping
    pub gradient_clip: Option<f64>,
    /// Shuffle mini-batches inside the training part
    pub shuffle: bool,
    /// Seed for weight initialization, shuffling and dropout
    pub seed: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_type: "LSTM".to_string(),
            num_neurons: 64,
            dropout_rate: 0.35,
            num_hidden_layers: 2,
            use_batch_norm: false,
            loss: "mae".to_string(),
            learning_rate: 0.001,
            epochs: 50,
            batch_size: 32,
            time_step: 50,
            validation_split: 0.1,
            features_to_use: vec![
                "Close".to_string(),
                "Volume".to_string(),
                "RSI".to_string(),
                "MACD".to_string(),
            ],
            target_column: "Close".to_string(),
            patience: 10,
            min_delta: 0.001,
            gradient_clip: Some(1.0),
            shuffle: true,
            seed: 42,
        }
    }
}

impl ModelConfig {
    pub fn new(features_to_use: Vec<String>, target_column: impl Into<String>) -> Self {
        Self {
            features_to_use,
            target_column: target_column.into(),
            ..Default::default()
        }
    }

    pub fn with_model_type(mut self, kind: ModelKind) -> Self {
        self.model_type = kind.to_string();
        self
    }

    pub fn with_neurons(mut self, num_neurons: usize) -> Self {
        self.num_neurons = num_neurons;
        self
    }

    pub fn with_layers(mut self, num_hidden_layers: usize) -> Self {
        self.num_hidden_layers = num_hidden_layers;
        self
    }

    pub fn with_dropout(mut self, dropout_rate: f64) -> Self {
        self.dropout_rate = dropout_rate;
        self
    }

    pub fn with_batch_norm(mut self, enabled: bool) -> Self {
        self.use_batch_norm = enabled;
        self
    }

    pub fn with_loss(mut self, loss: LossFunction) -> Self {
        self.loss = loss.to_string();
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_time_step(mut self, time_step: usize) -> Self {
        self.time_step = time_step;
        self
    }

    pub fn with_validation_split(mut self, split: f64) -> Self {
        self.validation_split = split;
        self
    }

    pub fn with_early_stopping(mut self, patience: usize, min_delta: f64) -> Self {
        self.patience = patience;
        self.min_delta = min_delta;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Parsed cell variant
    pub fn kind(&self) -> Result<ModelKind> {
        self.model_type.parse()
    }

    /// Parsed loss function
    pub fn loss_function(&self) -> Result<LossFunction> {
        self.loss.parse()
    }

    /// Position of `target_column` in `features_to_use`
    pub fn target_index(&self) -> Result<usize> {
        self.features_to_use
            .iter()
            .position(|f| *f == self.target_column)
            .ok_or_else(|| {
                Error::validation(format!(
                    "target column '{}' must be one of the features {:?}",
                    self.target_column, self.features_to_use
                ))
            })
    }

    pub fn num_features(&self) -> usize {
        self.features_to_use.len()
    }

    /// Checks every hyperparameter range
    pub fn validate(&self) -> Result<()> {
        if !(32..=256).contains(&self.num_neurons) {
            return Err(Error::validation(format!(
                "num_neurons must be in [32, 256], got {}",
                self.num_neurons
            )));
        }
        if !(self.dropout_rate > 0.0 && self.dropout_rate < 1.0) {
            return Err(Error::validation(format!(
                "dropout_rate must be in (0, 1), got {}",
                self.dropout_rate
            )));
        }
        if self.num_hidden_layers == 0 {
            return Err(Error::validation("num_hidden_layers must be at least 1"));
        }
        if self.epochs == 0 {
            return Err(Error::validation("epochs must be positive"));
        }
        if self.batch_size == 0 {
            return Err(Error::validation("batch_size must be positive"));
        }
        if self.time_step == 0 {
            return Err(Error::validation("time_step must be positive"));
        }
        if !(0.0..1.0).contains(&self.validation_split) {
            return Err(Error::validation(format!(
                "validation_split must be in [0, 1), got {}",
                self.validation_split
            )));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(Error::validation(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if self.min_delta < 0.0 {
            return Err(Error::validation("min_delta must not be negative"));
        }
        if let Some(clip) = self.gradient_clip {
            if clip <= 0.0 {
                return Err(Error::validation("gradient_clip must be positive"));
            }
        }
        if self.features_to_use.is_empty() {
            return Err(Error::validation("features_to_use must not be empty"));
        }
        for (i, feature) in self.features_to_use.iter().enumerate() {
            if self.features_to_use[..i].contains(feature) {
                return Err(Error::validation(format!("duplicate feature '{}'", feature)));
            }
        }
        self.target_index()?;
        Ok(())
    }

    /// One-line summary for logs
    pub fn summary(&self) -> String {
        format!(
            "{} | layers: {} | neurons: {} | dropout: {} | loss: {} | batch norm: {}",
            self.model_type,
            self.num_hidden_layers,
            self.num_neurons,
            self.dropout_rate,
            self.loss,
            self.use_batch_norm
        )
    }
}
