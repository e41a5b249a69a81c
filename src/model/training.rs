//! Training loop with early stopping
//!
//! Mini-batch Adam over the chronological head of the training windows.
//! The tail (`validation_split`) is monitored for early stopping and the
//! weights of the best epoch are restored at the end.

use super::config::ModelConfig;
use super::network::SequenceRegressor;
use super::optimizer::{clip_by_global_norm, Adam, Optimizer};
use crate::error::{Error, Result};
use indicatif::{ProgressBar, ProgressStyle};
use ndarray::{s, Array1, Array3, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

/// Losses reported after each epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// 1-based epoch number
    pub epoch: usize,
    pub loss: f64,
    /// `None` when no validation windows were held out
    pub val_loss: Option<f64>,
}

impl EpochMetrics {
    /// Quantity watched by early stopping
    pub fn monitored(&self) -> f64 {
        self.val_loss.unwrap_or(self.loss)
    }
}

impl fmt::Display for EpochMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.val_loss {
            Some(val) => write!(f, "Epoch {}: loss={:.6}, val_loss={:.6}", self.epoch, self.loss, val),
            None => write!(f, "Epoch {}: loss={:.6}", self.epoch, self.loss),
        }
    }
}

/// Receives a notification at the end of every epoch
pub trait EpochObserver {
    fn on_epoch_end(&mut self, metrics: &EpochMetrics);

    fn on_train_end(&mut self, _history: &TrainingHistory) {}
}

impl<F> EpochObserver for F
where
    F: FnMut(&EpochMetrics),
{
    fn on_epoch_end(&mut self, metrics: &EpochMetrics) {
        (*self)(metrics)
    }
}

/// Terminal progress bar driven by epoch notifications
pub struct ProgressObserver {
    bar: ProgressBar,
}

impl ProgressObserver {
    pub fn new(epochs: usize) -> Self {
        let bar = ProgressBar::new(epochs as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        Self { bar }
    }
}

impl EpochObserver for ProgressObserver {
    fn on_epoch_end(&mut self, metrics: &EpochMetrics) {
        self.bar.set_message(match metrics.val_loss {
            Some(val) => format!("loss {:.5} | val {:.5}", metrics.loss, val),
            None => format!("loss {:.5}", metrics.loss),
        });
        self.bar.inc(1);
    }

    fn on_train_end(&mut self, history: &TrainingHistory) {
        self.bar
            .finish_with_message(format!("best epoch {}", history.best_epoch));
    }
}

/// Per-epoch losses of a finished run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochMetrics>,
    /// Epoch whose weights were restored
    pub best_epoch: usize,
    pub best_loss: f64,
    pub stopped_early: bool,
}

impl TrainingHistory {
    pub fn loss(&self) -> Vec<f64> {
        self.epochs.iter().map(|m| m.loss).collect()
    }

    pub fn val_loss(&self) -> Vec<f64> {
        self.epochs.iter().filter_map(|m| m.val_loss).collect()
    }

    pub fn epochs_run(&self) -> usize {
        self.epochs.len()
    }
}

/// What early stopping decided after an epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopDecision {
    Improved,
    Wait,
    Stop,
}

/// Stops when the monitored loss has not decreased by more than
/// `min_delta` for `patience` consecutive epochs
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    min_delta: f64,
    best: f64,
    best_epoch: usize,
    wait: usize,
}

impl EarlyStopping {
    pub fn new(patience: usize, min_delta: f64) -> Self {
        Self {
            patience,
            min_delta,
            best: f64::INFINITY,
            best_epoch: 0,
            wait: 0,
        }
    }

    pub fn update(&mut self, epoch: usize, monitored: f64) -> StopDecision {
        if monitored < self.best - self.min_delta {
            self.best = monitored;
            self.best_epoch = epoch;
            self.wait = 0;
            return StopDecision::Improved;
        }
        self.wait += 1;
        if self.wait >= self.patience {
            StopDecision::Stop
        } else {
            StopDecision::Wait
        }
    }

    pub fn best(&self) -> f64 {
        self.best
    }

    pub fn best_epoch(&self) -> usize {
        self.best_epoch
    }
}

impl SequenceRegressor {
    /// Fits the network on `x` `[windows, time_step, features]` and `y`.
    ///
    /// Observers are notified after every epoch. On return the network holds
    /// the weights of the epoch with the lowest monitored loss.
    pub fn fit(
        &mut self,
        x: &Array3<f64>,
        y: &Array1<f64>,
        config: &ModelConfig,
        observers: &mut [&mut dyn EpochObserver],
    ) -> Result<TrainingHistory> {
        let loss_fn = config.loss_function()?;
        config.validate()?;

        let n = x.shape()[0];
        if n != y.len() {
            return Err(Error::validation(format!(
                "{} windows but {} targets",
                n,
                y.len()
            )));
        }
        let n_train = (n as f64 * (1.0 - config.validation_split)).floor() as usize;
        if n_train == 0 {
            return Err(Error::validation(format!(
                "not enough windows to train: {} windows, validation_split {}",
                n, config.validation_split
            )));
        }

        let x_train = x.slice(s![..n_train, .., ..]);
        let y_train = y.slice(s![..n_train]);
        let x_val = x.slice(s![n_train.., .., ..]);
        let y_val = y.slice(s![n_train..]);
        info!(
            "Training on {} windows, validating on {} ({} epochs, batch {})",
            n_train,
            n - n_train,
            config.epochs,
            config.batch_size
        );

        let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(1));
        let mut optimizer = Adam::new(config.learning_rate);
        let mut stopper = EarlyStopping::new(config.patience, config.min_delta);
        let mut history = TrainingHistory::default();
        let mut best_weights: Option<SequenceRegressor> = None;
        let mut order: Vec<usize> = (0..n_train).collect();

        for epoch in 1..=config.epochs {
            if config.shuffle {
                order.shuffle(&mut rng);
            }

            let mut total_loss = 0.0;
            for batch in order.chunks(config.batch_size) {
                let xb = x_train.select(Axis(0), batch);
                let yb = y_train.select(Axis(0), batch);

                let (predictions, cache) = self.forward_train(&xb.view(), &mut rng);
                let loss = loss_fn.value(predictions.view(), yb.view());
                if !loss.is_finite() {
                    return Err(Error::TrainingFailure {
                        epoch,
                        reason: format!("non-finite training loss {}", loss),
                    });
                }
                total_loss += loss * batch.len() as f64;

                let grad = loss_fn.gradient(predictions.view(), yb.view());
                let mut grads = self.backward(&cache, &grad);
                if let Some(max_norm) = config.gradient_clip {
                    let norm = clip_by_global_norm(&mut grads, max_norm);
                    if !norm.is_finite() {
                        return Err(Error::TrainingFailure {
                            epoch,
                            reason: "non-finite gradient".to_string(),
                        });
                    }
                }
                optimizer.step(self.params_mut(), &grads);
            }

            let loss = total_loss / n_train as f64;
            let val_loss = if y_val.is_empty() {
                None
            } else {
                let predictions = self.predict(&x_val)?;
                Some(loss_fn.value(predictions.view(), y_val))
            };
            if let Some(val) = val_loss {
                if !val.is_finite() {
                    return Err(Error::TrainingFailure {
                        epoch,
                        reason: format!("non-finite validation loss {}", val),
                    });
                }
            }

            let metrics = EpochMetrics {
                epoch,
                loss,
                val_loss,
            };
            debug!("{}", metrics);
            for observer in observers.iter_mut() {
                observer.on_epoch_end(&metrics);
            }
            let decision = stopper.update(epoch, metrics.monitored());
            history.epochs.push(metrics);

            match decision {
                StopDecision::Improved => best_weights = Some(self.clone()),
                StopDecision::Wait => {}
                StopDecision::Stop => {
                    warn!("Early stopping at epoch {}", epoch);
                    history.stopped_early = true;
                    break;
                }
            }
        }

        if let Some(best) = best_weights {
            *self = best;
        }
        history.best_epoch = stopper.best_epoch();
        history.best_loss = stopper.best();
        info!(
            "Training finished after {} epochs, best epoch {} (loss {:.6})",
            history.epochs_run(),
            history.best_epoch,
            history.best_loss
        );

        for observer in observers.iter_mut() {
            observer.on_train_end(&history);
        }
        Ok(history)
    }
}
