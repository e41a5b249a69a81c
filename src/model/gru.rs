//! GRU layer with backpropagation through time
//!
//! GRU simplifies LSTM by using only two gates:
//! - Update gate: z_t = σ(x_t W_z + h_{t-1} U_z + b_z)
//! - Reset gate:  r_t = σ(x_t W_r + h_{t-1} U_r + b_r)
//! - Candidate:   n_t = tanh(x_t W_n + (r_t ⊙ h_{t-1}) U_n + b_n)
//! - Hidden:      h_t = (1 - z_t) ⊙ n_t + z_t ⊙ h_{t-1}

use super::layers::{sigmoid, sigmoid_grad, tanh_grad, ParamGrads};
use ndarray::{s, Array1, Array2, ArrayViewMutD, Axis};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// GRU layer. Gates are packed along the last axis in the order update,
/// reset, candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GruLayer {
    input_size: usize,
    hidden_size: usize,
    /// [input, 3 * hidden]
    w_x: Array2<f64>,
    /// [hidden, 3 * hidden]
    w_h: Array2<f64>,
    /// [3 * hidden]
    bias: Array1<f64>,
}

#[derive(Debug, Clone)]
struct GruStep {
    x: Array2<f64>,
    h_prev: Array2<f64>,
    z: Array2<f64>,
    r: Array2<f64>,
    n: Array2<f64>,
    /// r ⊙ h_prev
    rh: Array2<f64>,
    h: Array2<f64>,
}

#[derive(Debug, Clone)]
pub struct GruCache {
    steps: Vec<GruStep>,
}

impl GruLayer {
    pub fn new<R: Rng>(input_size: usize, hidden_size: usize, rng: &mut R) -> Self {
        let limit = (1.0 / hidden_size as f64).sqrt();

        Self {
            input_size,
            hidden_size,
            w_x: Array2::random_using((input_size, 3 * hidden_size), Uniform::new(-limit, limit), rng),
            w_h: Array2::random_using((hidden_size, 3 * hidden_size), Uniform::new(-limit, limit), rng),
            bias: Array1::zeros(3 * hidden_size),
        }
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    fn step(&self, x: &Array2<f64>, h_prev: &Array2<f64>) -> GruStep {
        let hs = self.hidden_size;
        let xw = x.dot(&self.w_x) + &self.bias;
        let hw = h_prev.dot(&self.w_h.slice(s![.., ..2 * hs]));

        let z = (&xw.slice(s![.., ..hs]) + &hw.slice(s![.., ..hs])).mapv(sigmoid);
        let r = (&xw.slice(s![.., hs..2 * hs]) + &hw.slice(s![.., hs..])).mapv(sigmoid);
        let rh = &r * h_prev;
        let n = (&xw.slice(s![.., 2 * hs..]) + &rh.dot(&self.w_h.slice(s![.., 2 * hs..])))
            .mapv(f64::tanh);

        // h = n + z ⊙ (h_prev - n)
        let h = &n + &(&z * &(h_prev - &n));

        GruStep {
            x: x.clone(),
            h_prev: h_prev.clone(),
            z,
            r,
            n,
            rh,
            h,
        }
    }

    /// Hidden states for every time step, no cache
    pub fn forward(&self, inputs: &[Array2<f64>]) -> Vec<Array2<f64>> {
        let batch = inputs.first().map_or(0, |x| x.nrows());
        let mut h = Array2::zeros((batch, self.hidden_size));
        let mut outputs = Vec::with_capacity(inputs.len());

        for x in inputs {
            h = self.step(x, &h).h;
            outputs.push(h.clone());
        }
        outputs
    }

    pub fn forward_train(&self, inputs: &[Array2<f64>]) -> (Vec<Array2<f64>>, GruCache) {
        let batch = inputs.first().map_or(0, |x| x.nrows());
        let mut h = Array2::zeros((batch, self.hidden_size));
        let mut outputs = Vec::with_capacity(inputs.len());
        let mut steps = Vec::with_capacity(inputs.len());

        for x in inputs {
            let step = self.step(x, &h);
            h = step.h.clone();
            outputs.push(step.h.clone());
            steps.push(step);
        }
        (outputs, GruCache { steps })
    }

    /// Backpropagation through time; same contract as the LSTM layer
    pub fn backward(
        &self,
        cache: &GruCache,
        grad_outputs: &[Array2<f64>],
    ) -> (Vec<Array2<f64>>, ParamGrads) {
        let hs = self.hidden_size;
        let mut grad_w_x = Array2::<f64>::zeros(self.w_x.raw_dim());
        let mut grad_w_h = Array2::<f64>::zeros(self.w_h.raw_dim());
        let mut grad_bias = Array1::<f64>::zeros(self.bias.raw_dim());

        let batch = cache.steps.first().map_or(0, |s| s.x.nrows());
        let mut dh_next = Array2::<f64>::zeros((batch, hs));
        let mut grad_inputs = vec![Array2::<f64>::zeros((batch, self.input_size)); cache.steps.len()];

        let w_h_zr = self.w_h.slice(s![.., ..2 * hs]);
        let w_h_n = self.w_h.slice(s![.., 2 * hs..]);

        for (t, st) in cache.steps.iter().enumerate().rev() {
            let dh = &grad_outputs[t] + &dh_next;

            let dn = &dh * &st.z.mapv(|v| 1.0 - v);
            let dz = &dh * &(&st.h_prev - &st.n);
            let mut dh_prev = &dh * &st.z;

            let da_n = dn * &st.n.mapv(tanh_grad);
            let d_rh = da_n.dot(&w_h_n.t());
            let dr = &d_rh * &st.h_prev;
            dh_prev += &(&d_rh * &st.r);

            let mut da = Array2::<f64>::zeros((batch, 3 * hs));
            da.slice_mut(s![.., ..hs])
                .assign(&(dz * &st.z.mapv(sigmoid_grad)));
            da.slice_mut(s![.., hs..2 * hs])
                .assign(&(dr * &st.r.mapv(sigmoid_grad)));
            da.slice_mut(s![.., 2 * hs..]).assign(&da_n);

            let da_zr = da.slice(s![.., ..2 * hs]);

            grad_w_x += &st.x.t().dot(&da);
            grad_bias += &da.sum_axis(Axis(0));
            grad_w_h
                .slice_mut(s![.., ..2 * hs])
                .scaled_add(1.0, &st.h_prev.t().dot(&da_zr));
            grad_w_h
                .slice_mut(s![.., 2 * hs..])
                .scaled_add(1.0, &st.rh.t().dot(&da_n));

            grad_inputs[t] = da.dot(&self.w_x.t());
            dh_prev += &da_zr.dot(&w_h_zr.t());
            dh_next = dh_prev;
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
