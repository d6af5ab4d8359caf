use std::sync::Mutex;

use candle_core::{backprop::GradStore, DType, Module, Result, Tensor};
use candle_nn::{AdamW, Linear, Optimizer, VarBuilder, VarMap};

use crate::brains::learners::{
    utils::{adam, gumbel_softmax, linear},
    DEVICE,
};

use super::{poisoned, CopyWeights, Policy, ValueEstimator};

const RELU_GAIN: f64 = std::f64::consts::SQRT_2;

/// `in -> hidden -> hidden -> out`, ReLU between layers, linear output.
struct Mlp {
    layers: Vec<Linear>,
}

impl Mlp {
    fn new(in_len: usize, hidden_len: usize, out_len: usize, vs: VarBuilder) -> Result<Self> {
        let layers = vec![
            linear(in_len, hidden_len, RELU_GAIN, vs.pp("l0"))?,
            linear(hidden_len, hidden_len, RELU_GAIN, vs.pp("l1"))?,
            linear(hidden_len, out_len, 1.0, vs.pp("l2"))?,
        ];
        Ok(Self { layers })
    }

    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let n_layers = self.layers.len();
        let mut x = x.clone();
        for layer in self.layers[..n_layers - 1].iter() {
            x = layer.forward(&x)?.relu()?;
        }
        self.layers[n_layers - 1].forward(&x)
    }
}

pub struct MlpActor {
    mlp: Mlp,
    pub varmap: VarMap,
    pub optim: Mutex<AdamW>,
}

impl MlpActor {
    pub fn new(obs_len: usize, action_len: usize, hidden_len: usize, lr: f64) -> Result<Self> {
        let varmap = VarMap::new();
        let vs = VarBuilder::from_varmap(&varmap, DType::F32, &DEVICE);
        let mlp = Mlp::new(obs_len, hidden_len, action_len, vs)?;
        let optim = Mutex::new(adam(varmap.all_vars(), lr)?);
        Ok(Self { mlp, varmap, optim })
    }
}

impl Policy for MlpActor {
    type Logits = Tensor;

    fn action_logits(&self, obs: &Tensor) -> Result<Self::Logits> {
        self.mlp.forward(obs)
    }

    fn act(&self, obs: &Tensor) -> Result<(Tensor, Self::Logits)> {
        let logits = self.action_logits(obs)?;
        let action = gumbel_softmax(&logits, true)?;
        Ok((action, logits))
    }

    fn apply_gradients(&self, grads: &GradStore) -> Result<()> {
        self.optim.lock().map_err(poisoned)?.step(grads)
    }
}

impl CopyWeights for MlpActor {
    fn varmap(&self) -> &VarMap {
        &self.varmap
    }
}

/// Joint critic: scores the concatenation of observations and actions.
pub struct MlpCritic {
    mlp: Mlp,
    pub varmap: VarMap,
    pub optim: Mutex<AdamW>,
}

impl MlpCritic {
    pub fn new(in_len: usize, hidden_len: usize, lr: f64) -> Result<Self> {
        let varmap = VarMap::new();
        let vs = VarBuilder::from_varmap(&varmap, DType::F32, &DEVICE);
        let mlp = Mlp::new(in_len, hidden_len, 1, vs)?;
        let optim = Mutex::new(adam(varmap.all_vars(), lr)?);
        Ok(Self { mlp, varmap, optim })
    }
}

impl ValueEstimator for MlpCritic {
    fn estimate_value(&self, obs: &Tensor, action: Option<&Tensor>) -> Result<Tensor> {
        let x = match action {
            Some(action) => Tensor::cat(&[obs, action], 1)?,
            None => obs.clone(),
        };
        self.mlp.forward(&x)?.squeeze(1)
    }

    fn apply_gradients(&self, grads: &GradStore) -> Result<()> {
        self.optim.lock().map_err(poisoned)?.step(grads)
    }
}

impl CopyWeights for MlpCritic {
    fn varmap(&self) -> &VarMap {
        &self.varmap
    }
}
