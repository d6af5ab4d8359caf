use std::sync::PoisonError;

use candle_core::{backprop::GradStore, Result, Tensor};
use candle_nn::VarMap;

pub mod mlp;

pub trait Policy {
    type Logits;
    fn action_logits(&self, obs: &Tensor) -> Result<Self::Logits>;
    /// Sampled action alongside the logits it came from.
    fn act(&self, obs: &Tensor) -> Result<(Tensor, Self::Logits)>;
    fn apply_gradients(&self, grads: &GradStore) -> Result<()>;
}

pub trait ValueEstimator {
    fn estimate_value(&self, obs: &Tensor, action: Option<&Tensor>) -> Result<Tensor>;
    fn apply_gradients(&self, grads: &GradStore) -> Result<()>;
}

pub(crate) fn poisoned<T>(_: PoisonError<T>) -> candle_core::Error {
    candle_core::Error::Msg("varmap lock poisoned".to_owned())
}

pub trait CopyWeights {
    fn varmap(&self) -> &VarMap;

    /// `self = tau * other + (1 - tau) * self`, matched by variable name.
    fn soft_update(&self, other: &Self, tau: f32) -> Result<()> {
        let mine = self.varmap().data().lock().map_err(poisoned)?;
        let theirs = other.varmap().data().lock().map_err(poisoned)?;
        for (name, var) in mine.iter() {
            let Some(src) = theirs.get(name) else {
                candle_core::bail!("no variable named {name} to copy from");
            };
            let blended = (var.affine(1.0 - tau as f64, 0.0)? + src.affine(tau as f64, 0.0)?)?;
            var.set(&blended)?;
        }
        Ok(())
    }

    fn hard_update(&self, other: &Self) -> Result<()> {
        let mine = self.varmap().data().lock().map_err(poisoned)?;
        let theirs = other.varmap().data().lock().map_err(poisoned)?;
        for (name, var) in mine.iter() {
            let Some(src) = theirs.get(name) else {
                candle_core::bail!("no variable named {name} to copy from");
            };
            var.set(src.as_tensor())?;
        }
        Ok(())
    }
}

pub struct PolicyWithTarget<P: Policy + CopyWeights> {
    pub policy: P,
    pub target_policy: P,
}

impl<P: Policy + CopyWeights> PolicyWithTarget<P> {
    /// The target starts as an exact copy of the online policy.
    pub fn new(policy: P, target_policy: P) -> Result<Self> {
        target_policy.hard_update(&policy)?;
        Ok(Self {
            policy,
            target_policy,
        })
    }

    pub fn soft_update(&self, tau: f32) -> Result<()> {
        self.target_policy.soft_update(&self.policy, tau)
    }
}

impl<P: Policy + CopyWeights> Policy for PolicyWithTarget<P> {
    type Logits = P::Logits;

    fn action_logits(&self, obs: &Tensor) -> Result<Self::Logits> {
        self.policy.action_logits(obs)
    }

    fn act(&self, obs: &Tensor) -> Result<(Tensor, Self::Logits)> {
        self.policy.act(obs)
    }

    fn apply_gradients(&self, grads: &GradStore) -> Result<()> {
        self.policy.apply_gradients(grads)
    }
}

pub struct CriticWithTarget<V: ValueEstimator + CopyWeights> {
    pub critic: V,
    pub target_critic: V,
}

impl<V: ValueEstimator + CopyWeights> CriticWithTarget<V> {
    pub fn new(critic: V, target_critic: V) -> Result<Self> {
        target_critic.hard_update(&critic)?;
        Ok(Self {
            critic,
            target_critic,
        })
    }

    pub fn soft_update(&self, tau: f32) -> Result<()> {
        self.target_critic.soft_update(&self.critic, tau)
    }
}

impl<V: ValueEstimator + CopyWeights> ValueEstimator for CriticWithTarget<V> {
    fn estimate_value(&self, obs: &Tensor, action: Option<&Tensor>) -> Result<Tensor> {
        self.critic.estimate_value(obs, action)
    }

    fn apply_gradients(&self, grads: &GradStore) -> Result<()> {
        self.critic.apply_gradients(grads)
    }
}
