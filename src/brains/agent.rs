use candle_core::{Result, Tensor};

use crate::hparams::MAX_GRAD_NORM;

use super::{
    learners::utils::{argmax, backward_clipped, gumbel_softmax},
    models::{mlp::MlpActor, CopyWeights, Policy, PolicyWithTarget},
};

/// One learning agent: an actor and its target. Critics live with the trainer.
pub struct Agent {
    pub actor: PolicyWithTarget<MlpActor>,
}

impl Agent {
    pub fn new(obs_len: usize, action_len: usize, hidden_len: usize, lr: f64) -> Result<Self> {
        let actor = PolicyWithTarget::new(
            MlpActor::new(obs_len, action_len, hidden_len, lr)?,
            MlpActor::new(obs_len, action_len, hidden_len, lr)?,
        )?;
        Ok(Self { actor })
    }

    /// Differentiable one-hot sample plus the raw logits.
    pub fn action(&self, obs: &Tensor) -> Result<(Tensor, Tensor)> {
        self.actor.act(obs)
    }

    /// Stochastic action index for a single `(1, obs_len)` observation.
    pub fn select(&self, obs: &Tensor) -> Result<usize> {
        let (action, _) = self.action(obs)?;
        argmax(&action)
    }

    pub fn greedy(&self, obs: &Tensor) -> Result<usize> {
        argmax(&self.actor.action_logits(obs)?)
    }

    pub fn target_action(&self, next_obs: &Tensor) -> Result<Tensor> {
        let logits = self.actor.target_policy.action_logits(next_obs)?;
        Ok(gumbel_softmax(&logits, true)?.detach())
    }

    pub fn update_actor(&self, loss: &Tensor) -> Result<()> {
        let grads = backward_clipped(loss, self.actor.policy.varmap(), MAX_GRAD_NORM)?;
        self.actor.apply_gradients(&grads)
    }

    pub fn soft_update(&self, tau: f32) -> Result<()> {
        self.actor.soft_update(tau)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brains::learners::DEVICE;
    use candle_core::DType;

    #[test]
    fn selections_are_in_range() -> Result<()> {
        let agent = Agent::new(10, 6, 16, 0.01)?;
        let obs = Tensor::rand(0f32, 1.0, (1, 10), &DEVICE)?;
        for _ in 0..20 {
            assert!(agent.select(&obs)? < 6);
        }
        assert!(agent.greedy(&obs)? < 6);
        assert_eq!(agent.greedy(&obs)?, agent.greedy(&obs)?);
        Ok(())
    }

    #[test]
    fn target_action_is_one_hot_batch() -> Result<()> {
        let agent = Agent::new(10, 6, 16, 0.01)?;
        let next_obs = Tensor::zeros((7, 10), DType::F32, &DEVICE)?;
        let a = agent.target_action(&next_obs)?;
        assert_eq!(a.dims(), &[7, 6]);
        let sums = a.sum(1)?.to_vec1::<f32>()?;
        assert!(sums.iter().all(|s| (s - 1.0).abs() < 1e-6));
        Ok(())
    }

    #[test]
    fn actor_update_changes_weights() -> Result<()> {
        let agent = Agent::new(4, 3, 8, 0.05)?;
        let obs = Tensor::ones((2, 4), DType::F32, &DEVICE)?;
        let before = agent.actor.action_logits(&obs)?.to_vec2::<f32>()?;
        let (_, logits) = agent.action(&obs)?;
        agent.update_actor(&logits.sqr()?.mean_all()?)?;
        let after = agent.actor.action_logits(&obs)?.to_vec2::<f32>()?;
        assert_ne!(before, after);
        // the target only moves on soft updates
        let target = agent.actor.target_policy.action_logits(&obs)?.to_vec2::<f32>()?;
        assert_eq!(before, target);
        Ok(())
    }
}
