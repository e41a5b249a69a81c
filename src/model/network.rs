//! Stacked recurrent regressor
//!
//! Architecture:
//! ```text
//! Input [batch, time_step, features]
//!   -> recurrent layer 1 (full sequence) -> [batch norm] -> dropout
//!   -> ...
//!   -> recurrent layer N (last step only) -> [batch norm] -> dropout
//!   -> dense(1), linear
//! ```

use super::config::{ModelConfig, ModelKind};
use super::gru::{GruCache, GruLayer};
use super::layers::{dropout_mask, BatchNorm, BatchNormCache, Dense, ParamGrads};
use super::lstm::{LstmCache, LstmLayer};
use crate::error::{Error, Result};
use ndarray::{s, Array1, Array2, ArrayView2, ArrayView3, ArrayViewMutD, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Windows per forward pass when predicting
const PREDICT_CHUNK: usize = 256;

/// Anything that maps one `[time_step, features]` window to a scaled target value
pub trait WindowRegressor {
    fn time_step(&self) -> usize;

    fn num_features(&self) -> usize;

    fn predict_window(&self, window: ArrayView2<'_, f64>) -> Result<f64>;
}

/// One recurrent cell of either variant
#[derive(Debug, Clone, Serialize, Deserialize)]
enum RecurrentLayer {
    Lstm(LstmLayer),
    Gru(GruLayer),
}

#[derive(Debug, Clone)]
enum RecurrentCache {
    Lstm(LstmCache),
    Gru(GruCache),
}

impl RecurrentLayer {
    fn new<R: Rng>(kind: ModelKind, input_size: usize, hidden_size: usize, rng: &mut R) -> Self {
        match kind {
            ModelKind::Lstm => RecurrentLayer::Lstm(LstmLayer::new(input_size, hidden_size, rng)),
            ModelKind::Gru => RecurrentLayer::Gru(GruLayer::new(input_size, hidden_size, rng)),
        }
    }

    fn forward(&self, inputs: &[Array2<f64>]) -> Vec<Array2<f64>> {
        match self {
            RecurrentLayer::Lstm(l) => l.forward(inputs),
            RecurrentLayer::Gru(l) => l.forward(inputs),
        }
    }

    fn forward_train(&self, inputs: &[Array2<f64>]) -> (Vec<Array2<f64>>, RecurrentCache) {
        match self {
            RecurrentLayer::Lstm(l) => {
                let (out, cache) = l.forward_train(inputs);
                (out, RecurrentCache::Lstm(cache))
            }
            RecurrentLayer::Gru(l) => {
                let (out, cache) = l.forward_train(inputs);
                (out, RecurrentCache::Gru(cache))
            }
        }
    }

    fn backward(&self, cache: &RecurrentCache, grad_outputs: &[Array2<f64>]) -> (Vec<Array2<f64>>, ParamGrads) {
        match (self, cache) {
            (RecurrentLayer::Lstm(l), RecurrentCache::Lstm(c)) => l.backward(c, grad_outputs),
            (RecurrentLayer::Gru(l), RecurrentCache::Gru(c)) => l.backward(c, grad_outputs),
            _ => unreachable!("cache recorded by a different cell type"),
        }
    }

    fn params_mut(&mut self) -> Vec<ArrayViewMutD<'_, f64>> {
        match self {
            RecurrentLayer::Lstm(l) => l.params_mut(),
            RecurrentLayer::Gru(l) => l.params_mut(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RecurrentBlock {
    cell: RecurrentLayer,
    norm: Option<BatchNorm>,
    /// Every block but the last passes the whole sequence on
    return_sequences: bool,
}

#[derive(Debug)]
struct BlockCache {
    cell: RecurrentCache,
    norm: Option<BatchNormCache>,
    masks: Vec<Array2<f64>>,
    steps: usize,
}

/// Activations recorded by [`SequenceRegressor::forward_train`]
#[derive(Debug)]
pub(super) struct ForwardCache {
    blocks: Vec<BlockCache>,
    head_input: Array2<f64>,
}

/// Stacked LSTM/GRU network with a single linear output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceRegressor {
    kind: ModelKind,
    time_step: usize,
    num_features: usize,
    dropout_rate: f64,
    blocks: Vec<RecurrentBlock>,
    head: Dense,
}

impl SequenceRegressor {
    /// Builds an untrained network for windows of `[config.time_step, num_features]`
    pub fn build(config: &ModelConfig, num_features: usize) -> Result<Self> {
        let kind = config.kind()?;
        config.loss_function()?;
        config.validate()?;
        if num_features != config.num_features() {
            return Err(Error::ModelBuild(format!(
                "input has {} features but the configuration lists {}",
                num_features,
                config.num_features()
            )));
        }

        let mut rng = StdRng::seed_from_u64(config.seed);
        let hidden = config.num_neurons;
        let layers = config.num_hidden_layers;

        let blocks = (0..layers)
            .map(|l| {
                let input_size = if l == 0 { num_features } else { hidden };
                RecurrentBlock {
                    cell: RecurrentLayer::new(kind, input_size, hidden, &mut rng),
                    norm: config.use_batch_norm.then(|| BatchNorm::new(hidden)),
                    return_sequences: l + 1 < layers,
                }
            })
            .collect();
        let head = Dense::new(hidden, 1, &mut rng);

        info!("Built {} network: {}", kind, config.summary());

        Ok(Self {
            kind,
            time_step: config.time_step,
            num_features,
            dropout_rate: config.dropout_rate,
            blocks,
            head,
        })
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn num_layers(&self) -> usize {
        self.blocks.len()
    }

    /// Inference-mode predictions (no dropout, running batch statistics)
    pub fn predict(&self, x: &ArrayView3<'_, f64>) -> Result<Array1<f64>> {
        self.check_input(x)?;
        let mut predictions = Vec::with_capacity(x.shape()[0]);
        for chunk in x.axis_chunks_iter(Axis(0), PREDICT_CHUNK) {
            predictions.extend(self.forward(&chunk).iter());
        }
        Ok(Array1::from(predictions))
    }

    fn check_input(&self, x: &ArrayView3<'_, f64>) -> Result<()> {
        let shape = x.shape();
        if shape[1] != self.time_step || shape[2] != self.num_features {
            return Err(Error::validation(format!(
                "expected windows of [{}, {}], got [{}, {}]",
                self.time_step, self.num_features, shape[1], shape[2]
            )));
        }
        Ok(())
    }

    fn forward(&self, x: &ArrayView3<'_, f64>) -> Array1<f64> {
        let mut seq = split_steps(x);
        for block in &self.blocks {
            let mut out = block.cell.forward(&seq);
            if !block.return_sequences {
                out = out.pop().into_iter().collect();
            }
            if let Some(norm) = &block.norm {
                out = out.iter().map(|h| norm.forward(h)).collect();
            }
            seq = out;
        }
        let head_input = seq
            .pop()
            .unwrap_or_else(|| Array2::zeros((x.shape()[0], self.head.input_size())));
        self.head.forward(&head_input).column(0).to_owned()
    }

    /// Training-mode forward pass: dropout active, batch statistics updated
    pub(super) fn forward_train<R: Rng>(
        &mut self,
        x: &ArrayView3<'_, f64>,
        rng: &mut R,
    ) -> (Array1<f64>, ForwardCache) {
        let batch = x.shape()[0];
        let rate = self.dropout_rate;
        let mut seq = split_steps(x);
        let mut caches = Vec::with_capacity(self.blocks.len());

        for block in self.blocks.iter_mut() {
            let steps = seq.len();
            let (mut out, cell_cache) = block.cell.forward_train(&seq);
            if !block.return_sequences {
                out = out.pop().into_iter().collect();
            }

            let norm_cache = match block.norm.as_mut() {
                Some(norm) => {
                    let (normalized, cache) = norm.forward_train(&stack_steps(&out));
                    out = unstack_steps(&normalized, out.len());
                    Some(cache)
                }
                None => None,
            };

            let masks: Vec<Array2<f64>> = out.iter().map(|h| dropout_mask(h.dim(), rate, rng)).collect();
            for (h, mask) in out.iter_mut().zip(&masks) {
                *h *= mask;
            }

            caches.push(BlockCache {
                cell: cell_cache,
                norm: norm_cache,
                masks,
                steps,
            });
            seq = out;
        }

        let head_input = seq
            .pop()
            .unwrap_or_else(|| Array2::zeros((batch, self.head.input_size())));
        let predictions = self.head.forward(&head_input).column(0).to_owned();

        (
            predictions,
            ForwardCache {
                blocks: caches,
                head_input,
            },
        )
    }

    /// Parameter gradients for `d loss / d prediction`, ordered like [`Self::params_mut`]
    pub(super) fn backward(&self, cache: &ForwardCache, grad_predictions: &Array1<f64>) -> ParamGrads {
        let grad_out = grad_predictions.clone().insert_axis(Axis(1));
        let (grad_head_input, head_grads) = self.head.backward(&cache.head_input, &grad_out);

        let mut grad_seq = vec![grad_head_input];
        let mut block_grads: Vec<ParamGrads> = Vec::with_capacity(self.blocks.len());

        for (block, bc) in self.blocks.iter().zip(&cache.blocks).rev() {
            for (grad, mask) in grad_seq.iter_mut().zip(&bc.masks) {
                *grad *= mask;
            }

            let mut norm_grads = None;
            if let (Some(norm), Some(norm_cache)) = (&block.norm, &bc.norm) {
                let (grad_input, grads) = norm.backward(norm_cache, &stack_steps(&grad_seq));
                grad_seq = unstack_steps(&grad_input, grad_seq.len());
                norm_grads = Some(grads);
            }

            let grad_outputs = if block.return_sequences {
                grad_seq
            } else {
                expand_last_step(grad_seq, bc.steps)
            };

            let (grad_inputs, mut grads) = block.cell.backward(&bc.cell, &grad_outputs);
            if let Some(ng) = norm_grads {
                grads.extend(ng);
            }
            block_grads.push(grads);
            grad_seq = grad_inputs;
        }

        block_grads.reverse();
        let mut all: ParamGrads = block_grads.into_iter().flatten().collect();
        all.extend(head_grads);
        debug!("Computed {} gradient tensors", all.len());
        all
    }

    /// Mutable views of every trainable tensor
    pub(super) fn params_mut(&mut self) -> Vec<ArrayViewMutD<'_, f64>> {
        let mut params = Vec::new();
        for block in self.blocks.iter_mut() {
            params.extend(block.cell.params_mut());
            if let Some(norm) = block.norm.as_mut() {
                params.extend(norm.params_mut());
            }
        }
        params.extend(self.head.params_mut());
        params
    }
}

impl WindowRegressor for SequenceRegressor {
    fn time_step(&self) -> usize {
        self.time_step
    }

    fn num_features(&self) -> usize {
        self.num_features
    }

    fn predict_window(&self, window: ArrayView2<'_, f64>) -> Result<f64> {
        let batch = window.insert_axis(Axis(0));
        self.check_input(&batch)?;
        Ok(self.forward(&batch)[0])
    }
}

/// `[batch, time, features]` to one `[batch, features]` matrix per step
fn split_steps(x: &ArrayView3<'_, f64>) -> Vec<Array2<f64>> {
    x.axis_iter(Axis(1)).map(|step| step.to_owned()).collect()
}

/// Stacks per-step matrices vertically so batch norm sees batch and time together
fn stack_steps(steps: &[Array2<f64>]) -> Array2<f64> {
    let (rows, cols) = steps.first().map_or((0, 0), |s| s.dim());
    let mut stacked = Array2::zeros((rows * steps.len(), cols));
    for (t, step) in steps.iter().enumerate() {
        stacked.slice_mut(s![t * rows..(t + 1) * rows, ..]).assign(step);
    }
    stacked
}

fn unstack_steps(stacked: &Array2<f64>, n_steps: usize) -> Vec<Array2<f64>> {
    let rows = stacked.nrows() / n_steps.max(1);
    (0..n_steps)
        .map(|t| stacked.slice(s![t * rows..(t + 1) * rows, ..]).to_owned())
        .collect()
}

/// Gradient for a layer that only emitted its last hidden state
fn expand_last_step(mut grad_seq: Vec<Array2<f64>>, steps: usize) -> Vec<Array2<f64>> {
    let last = match grad_seq.pop() {
        Some(last) => last,
        None => return Vec::new(),
    };
    let mut grads = vec![Array2::zeros(last.dim()); steps];
    if let Some(slot) = grads.last_mut() {
        *slot = last;
    }
    grads
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::Array3;
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;

    fn config(kind: ModelKind, batch_norm: bool) -> ModelConfig {
        ModelConfig::new(vec!["Close".into(), "Volume".into()], "Close")
            .with_model_type(kind)
            .with_neurons(32)
            .with_layers(2)
            .with_batch_norm(batch_norm)
            .with_time_step(5)
    }

    fn windows(n: usize) -> Array3<f64> {
        let mut rng = StdRng::seed_from_u64(9);
        Array3::random_using((n, 5, 2), Uniform::new(0.0, 1.0), &mut rng)
    }

    #[test]
    fn test_build_and_predict_shapes() {
        for kind in [ModelKind::Lstm, ModelKind::Gru] {
            let model = SequenceRegressor::build(&config(kind, true), 2).unwrap();
            assert_eq!(model.num_layers(), 2);
            assert_eq!(model.kind(), kind);

            let predictions = model.predict(&windows(7).view()).unwrap();
            assert_eq!(predictions.len(), 7);
            assert!(predictions.iter().all(|p| p.is_finite()));
        }
    }

    #[test]
    fn test_build_rejects_unknown_kind() {
        let mut cfg = config(ModelKind::Lstm, false);
        cfg.model_type = "Transformer".to_string();
        assert!(matches!(
            SequenceRegressor::build(&cfg, 2),
            Err(Error::ModelBuild(_))
        ));
    }

    #[test]
    fn test_build_rejects_feature_mismatch() {
        assert!(SequenceRegressor::build(&config(ModelKind::Lstm, false), 3).is_err());
    }

    #[test]
    fn test_same_seed_same_weights() {
        let a = SequenceRegressor::build(&config(ModelKind::Gru, false), 2).unwrap();
        let b = SequenceRegressor::build(&config(ModelKind::Gru, false), 2).unwrap();
        let x = windows(4);
        assert_eq!(a.predict(&x.view()).unwrap(), b.predict(&x.view()).unwrap());
    }

    #[test]
    fn test_predict_window_matches_batch() {
        let model = SequenceRegressor::build(&config(ModelKind::Lstm, true), 2).unwrap();
        let x = windows(3);
        let batch = model.predict(&x.view()).unwrap();
        let single = model.predict_window(x.index_axis(Axis(0), 2)).unwrap();
        assert_abs_diff_eq!(batch[2], single, epsilon = 1e-12);
    }

    #[test]
    fn test_predict_rejects_wrong_window() {
        let model = SequenceRegressor::build(&config(ModelKind::Lstm, false), 2).unwrap();
        let x = Array3::<f64>::zeros((2, 4, 2));
        assert!(model.predict(&x.view()).is_err());
    }

    #[test]
    fn test_gradient_count_matches_parameters() {
        for batch_norm in [false, true] {
            let mut model = SequenceRegressor::build(&config(ModelKind::Lstm, batch_norm), 2).unwrap();
            let mut rng = StdRng::seed_from_u64(1);
            let x = windows(6);
            let (predictions, cache) = model.forward_train(&x.view(), &mut rng);
            let grads = model.backward(&cache, &Array1::ones(predictions.len()));
            let params = model.params_mut();

            assert_eq!(grads.len(), params.len());
            for (g, p) in grads.iter().zip(params.iter()) {
                assert_eq!(g.shape(), p.shape());
            }
        }
    }
}
