//! # Sequence models
//!
//! Stacked LSTM / GRU regressors that map a window of scaled feature vectors
//! to the next scaled target value.
//!
//! ## Cells
//!
//! - **LSTM**: input, forget and output gates plus a cell state; forget gate
//!   bias initialized to 1.
//! - **GRU**: update and reset gates, no separate cell state.
//!
//! ## Training
//!
//! Backpropagation through time with Adam, mini-batches, dropout after
//! every recurrent layer, optional batch normalization, early stopping on
//! the chronological validation tail with best-weight restoration.

pub mod config;
mod gru;
mod layers;
mod loss;
mod lstm;
mod network;
mod optimizer;
mod trained;
mod training;

pub use config::{LossFunction, ModelConfig, ModelKind};
pub use gru::GruLayer;
pub use lstm::LstmLayer;
pub use network::{SequenceRegressor, WindowRegressor};
pub use optimizer::{Adam, Optimizer};
pub use trained::{Evaluation, TrainedModel};
pub use training::{
    EarlyStopping, EpochMetrics, EpochObserver, ProgressObserver, StopDecision, TrainingHistory,
};
