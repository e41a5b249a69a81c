//! LSTM layer with backpropagation through time
//!
//! Gate equations (per time step, batched over rows):
//! - Forget gate: f_t = σ(x_t W_f + h_{t-1} U_f + b_f)
//! - Input gate:  i_t = σ(x_t W_i + h_{t-1} U_i + b_i)
//! - Candidate:   g_t = tanh(x_t W_g + h_{t-1} U_g + b_g)
//! - Output gate: o_t = σ(x_t W_o + h_{t-1} U_o + b_o)
//! - Cell state:  c_t = f_t ⊙ c_{t-1} + i_t ⊙ g_t
//! - Hidden:      h_t = o_t ⊙ tanh(c_t)

use super::layers::{sigmoid, sigmoid_grad, tanh_grad, ParamGrads};
use ndarray::{s, Array1, Array2, ArrayViewMutD, Axis};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// LSTM layer. The four gates are packed along the last axis in the order
/// input, forget, candidate, output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LstmLayer {
    input_size: usize,
    hidden_size: usize,
    /// [input, 4 * hidden]
    w_x: Array2<f64>,
    /// [hidden, 4 * hidden]
    w_h: Array2<f64>,
    /// [4 * hidden]
    bias: Array1<f64>,
}

/// Activations of one time step
#[derive(Debug, Clone)]
struct LstmStep {
    x: Array2<f64>,
    h_prev: Array2<f64>,
    c_prev: Array2<f64>,
    i: Array2<f64>,
    f: Array2<f64>,
    g: Array2<f64>,
    o: Array2<f64>,
    tanh_c: Array2<f64>,
    h: Array2<f64>,
    c: Array2<f64>,
}

/// Everything the backward pass needs from a training forward pass
#[derive(Debug, Clone)]
pub struct LstmCache {
    steps: Vec<LstmStep>,
}

impl LstmLayer {
    /// Uniform(-1/sqrt(hidden), 1/sqrt(hidden)) weights, forget-gate bias 1
    pub fn new<R: Rng>(input_size: usize, hidden_size: usize, rng: &mut R) -> Self {
        let limit = (1.0 / hidden_size as f64).sqrt();

        let mut bias = Array1::zeros(4 * hidden_size);
        bias.slice_mut(s![hidden_size..2 * hidden_size]).fill(1.0);

        Self {
            input_size,
            hidden_size,
            w_x: Array2::random_using((input_size, 4 * hidden_size), Uniform::new(-limit, limit), rng),
            w_h: Array2::random_using((hidden_size, 4 * hidden_size), Uniform::new(-limit, limit), rng),
            bias,
        }
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    fn step(&self, x: &Array2<f64>, h_prev: &Array2<f64>, c_prev: &Array2<f64>) -> LstmStep {
        let hs = self.hidden_size;
        let z = x.dot(&self.w_x) + h_prev.dot(&self.w_h) + &self.bias;

        let i = z.slice(s![.., ..hs]).mapv(sigmoid);
        let f = z.slice(s![.., hs..2 * hs]).mapv(sigmoid);
        let g = z.slice(s![.., 2 * hs..3 * hs]).mapv(f64::tanh);
        let o = z.slice(s![.., 3 * hs..]).mapv(sigmoid);

        let c = &f * c_prev + &i * &g;
        let tanh_c = c.mapv(f64::tanh);
        let h = &o * &tanh_c;

        LstmStep {
            x: x.clone(),
            h_prev: h_prev.clone(),
            c_prev: c_prev.clone(),
            i,
            f,
            g,
            o,
            tanh_c,
            h,
            c,
        }
    }

    /// Hidden states for every time step, no cache
    pub fn forward(&self, inputs: &[Array2<f64>]) -> Vec<Array2<f64>> {
        let batch = inputs.first().map_or(0, |x| x.nrows());
        let mut h = Array2::zeros((batch, self.hidden_size));
        let mut c = Array2::zeros((batch, self.hidden_size));
        let mut outputs = Vec::with_capacity(inputs.len());

        for x in inputs {
            let step = self.step(x, &h, &c);
            h = step.h;
            c = step.c;
            outputs.push(h.clone());
        }
        outputs
    }

    /// Hidden states for every time step plus the cache for [`LstmLayer::backward`]
    pub fn forward_train(&self, inputs: &[Array2<f64>]) -> (Vec<Array2<f64>>, LstmCache) {
        let batch = inputs.first().map_or(0, |x| x.nrows());
        let mut h = Array2::zeros((batch, self.hidden_size));
        let mut c = Array2::zeros((batch, self.hidden_size));
        let mut outputs = Vec::with_capacity(inputs.len());
        let mut steps = Vec::with_capacity(inputs.len());

        for x in inputs {
            let step = self.step(x, &h, &c);
            h = step.h.clone();
            c = step.c.clone();
            outputs.push(step.h.clone());
            steps.push(step);
        }
        (outputs, LstmCache { steps })
    }

    /// Backpropagation through time.
    ///
    /// `grad_outputs[t]` is the loss gradient w.r.t. `h_t`. Returns the
    /// gradients w.r.t. each input step and the parameter gradients
    /// (`w_x`, `w_h`, `bias`).
    pub fn backward(
        &self,
        cache: &LstmCache,
        grad_outputs: &[Array2<f64>],
    ) -> (Vec<Array2<f64>>, ParamGrads) {
        let hs = self.hidden_size;
        let mut grad_w_x = Array2::<f64>::zeros(self.w_x.raw_dim());
        let mut grad_w_h = Array2::<f64>::zeros(self.w_h.raw_dim());
        let mut grad_bias = Array1::<f64>::zeros(self.bias.raw_dim());

        let batch = cache.steps.first().map_or(0, |s| s.x.nrows());
        let mut dh_next = Array2::<f64>::zeros((batch, hs));
        let mut dc_next = Array2::<f64>::zeros((batch, hs));
        let mut grad_inputs = vec![Array2::<f64>::zeros((batch, self.input_size)); cache.steps.len()];

        for (t, st) in cache.steps.iter().enumerate().rev() {
            let dh = &grad_outputs[t] + &dh_next;
            let d_o = &dh * &st.tanh_c;
            let dc = &dh * &st.o * &st.tanh_c.mapv(tanh_grad) + &dc_next;
            let d_i = &dc * &st.g;
            let d_f = &dc * &st.c_prev;
            let d_g = &dc * &st.i;
            dc_next = &dc * &st.f;

            let mut dz = Array2::<f64>::zeros((batch, 4 * hs));
            dz.slice_mut(s![.., ..hs])
                .assign(&(d_i * &st.i.mapv(sigmoid_grad)));
            dz.slice_mut(s![.., hs..2 * hs])
                .assign(&(d_f * &st.f.mapv(sigmoid_grad)));
            dz.slice_mut(s![.., 2 * hs..3 * hs])
                .assign(&(d_g * &st.g.mapv(tanh_grad)));
            dz.slice_mut(s![.., 3 * hs..])
                .assign(&(d_o * &st.o.mapv(sigmoid_grad)));

            grad_w_x += &st.x.t().dot(&dz);
            grad_w_h += &st.h_prev.t().dot(&dz);
            grad_bias += &dz.sum_axis(Axis(0));

            grad_inputs[t] = dz.dot(&self.w_x.t());
            dh_next = dz.dot(&self.w_h.t());
        }

        (
            grad_inputs,
            vec![grad_w_x.into_dyn(), grad_w_h.into_dyn(), grad_bias.into_dyn()],
        )
    }

    pub fn params_mut(&mut self) -> Vec<ArrayViewMutD<'_, f64>> {
        vec![
            self.w_x.view_mut().into_dyn(),
            self.w_h.view_mut().into_dyn(),
            self.bias.view_mut().into_dyn(),
        ]
    }
}
