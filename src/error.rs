//! Error types for the forecasting pipeline

use thiserror::Error;

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    /// Bad feature/target configuration or unusable input data
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unsupported architecture or loss function
    #[error("Model build error: {0}")]
    ModelBuild(String),

    /// Numerical divergence during training
    #[error("Training failed at epoch {epoch}: {reason}")]
    TrainingFailure { epoch: usize, reason: String },

    /// Shape or feature-count mismatch between model and window
    #[error("Forecast error: {0}")]
    Forecast(String),

    /// Configuration file could not be parsed or written
    #[error("Configuration error: {0}")]
    Config(String),

    /// CSV read/write error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub(crate) fn forecast(msg: impl Into<String>) -> Self {
        Error::Forecast(msg.into())
    }

    /// Errors the caller may fix by re-invoking with different hyperparameters
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::TrainingFailure { .. })
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::Config(err.to_string())
    }
}
