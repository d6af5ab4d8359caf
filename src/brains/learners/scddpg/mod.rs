//! Multi-agent DDPG with one pooled critic per team.
//!
//! Every agent keeps its own actor, but all members of a team share a single
//! critic (and target critic) that scores the joint observation and joint
//! action of *all* agents. The critic's Bellman target uses the team's summed
//! reward and summed done flags.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
};

use candle_core::{DType, Tensor};
use derive_more::Display;
use itertools::Itertools;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    brains::{
        agent::Agent,
        models::{mlp::MlpCritic, poisoned, CopyWeights, CriticWithTarget, ValueEstimator},
    },
    envs::{
        pp::{PREDATOR_PREFIX, PREY_PREFIX},
        Observation,
    },
    hparams::{TrainParams, LOGIT_PENALTY, MAX_GRAD_NORM},
    Error, Result, TbWriter,
};

use self::replay_buffer::{ReplayBuffer, Transitions};

use super::{utils::backward_clipped, Status, DEVICE};

pub mod replay_buffer;

pub const MODEL_FILE: &str = "model.safetensors";
pub const REWARDS_FILE: &str = "rewards.json";

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Team {
    #[display(fmt = "predator")]
    Predator,
    #[display(fmt = "prey")]
    Prey,
}

impl Team {
    pub fn of(agent: &str) -> Result<Self> {
        if agent.starts_with(PREDATOR_PREFIX) {
            Ok(Self::Predator)
        } else if agent.starts_with(PREY_PREFIX) {
            Ok(Self::Prey)
        } else {
            Err(Error::UnknownAgent(agent.to_owned()))
        }
    }
}

/// An action as produced by a policy (`OneHot`) or by sampling the action space (`Index`).
#[derive(Debug, Clone, PartialEq)]
pub enum ActionInput {
    Index(usize),
    OneHot(Vec<f32>),
}

impl From<usize> for ActionInput {
    fn from(value: usize) -> Self {
        Self::Index(value)
    }
}

impl From<Vec<f32>> for ActionInput {
    fn from(value: Vec<f32>) -> Self {
        Self::OneHot(value)
    }
}

impl ActionInput {
    pub fn to_one_hot(&self, action_len: usize) -> Result<Vec<f32>> {
        match self {
            Self::Index(i) if *i < action_len => {
                let mut v = vec![0.0; action_len];
                v[*i] = 1.0;
                Ok(v)
            }
            Self::Index(i) => Err(Error::InvalidAction {
                action: *i,
                actions: action_len,
            }),
            Self::OneHot(v) if v.len() == action_len => Ok(v.clone()),
            Self::OneHot(v) => Err(Error::DimensionMismatch {
                expected: action_len,
                got: v.len(),
            }),
        }
    }
}

/// `(obs_len, action_len)` per agent name.
pub type DimInfo = BTreeMap<String, (usize, usize)>;

/// One shared-index sample across every agent, with target actions for the next step.
pub struct Batch {
    pub transitions: BTreeMap<String, Transitions>,
    pub next_action: BTreeMap<String, Tensor>,
}

impl Batch {
    fn joint_obs(&self) -> Result<Tensor> {
        let parts = self.transitions.values().map(|t| &t.obs).collect_vec();
        Ok(Tensor::cat(&parts, 1)?)
    }

    fn joint_next_obs(&self) -> Result<Tensor> {
        let parts = self.transitions.values().map(|t| &t.next_obs).collect_vec();
        Ok(Tensor::cat(&parts, 1)?)
    }

    fn actions(&self) -> BTreeMap<String, Tensor> {
        self.transitions
            .iter()
            .map(|(k, t)| (k.clone(), t.action.clone()))
            .collect()
    }

    /// Sums reward and done columns over the members of `team`.
    fn team_sums(&self, team: Team) -> Result<(Tensor, Tensor)> {
        let n = self.transitions.values().next().map(|t| t.reward.dims1()).transpose()?.unwrap_or(0);
        let mut reward = Tensor::zeros(n, DType::F32, &DEVICE)?;
        let mut done = Tensor::zeros(n, DType::F32, &DEVICE)?;
        for (agent, t) in self.transitions.iter() {
            if Team::of(agent)? == team {
                reward = (reward + &t.reward)?;
                done = (done + &t.done)?;
            }
        }
        Ok((reward, done))
    }
}

fn joint(actions: &BTreeMap<String, Tensor>) -> Result<Tensor> {
    let parts = actions.values().collect_vec();
    Ok(Tensor::cat(&parts, 1)?)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScddpgStatus {
    pub critic_loss: BTreeMap<Team, f32>,
    pub actor_loss: BTreeMap<String, f32>,
}

impl ScddpgStatus {
    pub fn mean_actor_loss(&self) -> f32 {
        if self.actor_loss.is_empty() {
            return 0.0;
        }
        self.actor_loss.values().sum::<f32>() / self.actor_loss.len() as f32
    }
}

impl Status for ScddpgStatus {
    fn log(&self, writer: &mut TbWriter, step: usize) {
        for (team, loss) in self.critic_loss.iter() {
            writer.add_scalar(&format!("Value/{team}/Loss"), *loss, step);
        }
        for (agent, loss) in self.actor_loss.iter() {
            writer.add_scalar(&format!("Policy/{agent}/Loss"), *loss, step);
        }
        writer.add_scalar("Policy/Loss", self.mean_actor_loss(), step);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RewardHistory {
    pub rewards: BTreeMap<String, Vec<f32>>,
}

pub struct Scddpg {
    dim_info: DimInfo,
    agents: BTreeMap<String, Agent>,
    buffers: BTreeMap<String, ReplayBuffer>,
    critics: BTreeMap<Team, CriticWithTarget<MlpCritic>>,
    rng: ChaCha8Rng,
}

impl Scddpg {
    pub fn new(dim_info: DimInfo, params: &TrainParams) -> Result<Self> {
        let joint_len = dim_info.values().map(|(o, a)| o + a).sum::<usize>();

        let mut teams = BTreeSet::new();
        let mut agents = BTreeMap::new();
        let mut buffers = BTreeMap::new();
        for (name, &(obs_len, action_len)) in dim_info.iter() {
            teams.insert(Team::of(name)?);
            agents.insert(
                name.clone(),
                Agent::new(obs_len, action_len, params.hidden_dim, params.actor_lr)?,
            );
            buffers.insert(
                name.clone(),
                ReplayBuffer::new(params.buffer_capacity, obs_len, action_len),
            );
        }

        let mut critics = BTreeMap::new();
        for team in teams {
            let critic = CriticWithTarget::new(
                MlpCritic::new(joint_len, params.hidden_dim, params.critic_lr)?,
                MlpCritic::new(joint_len, params.hidden_dim, params.critic_lr)?,
            )?;
            critics.insert(team, critic);
        }
        debug!(agents = dim_info.len(), teams = critics.len(), joint_len, "built trainer");

        Ok(Self {
            dim_info,
            agents,
            buffers,
            critics,
            rng: ChaCha8Rng::seed_from_u64(params.seed),
        })
    }

    pub fn dim_info(&self) -> &DimInfo {
        &self.dim_info
    }

    pub fn agent(&self, name: &str) -> Result<&Agent> {
        self.agents
            .get(name)
            .ok_or_else(|| Error::UnknownAgent(name.to_owned()))
    }

    /// Fewest transitions held by any agent's buffer.
    pub fn len(&self) -> usize {
        self.buffers.values().map(|b| b.len()).min().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stores one environment step for every agent present in `obs`.
    pub fn add<O, A>(
        &mut self,
        obs: &BTreeMap<String, O>,
        actions: &BTreeMap<String, A>,
        rewards: &BTreeMap<String, f32>,
        next_obs: &BTreeMap<String, O>,
        dones: &BTreeMap<String, bool>,
    ) -> Result<()>
    where
        O: Observation,
        A: Clone + Into<ActionInput>,
    {
        for (agent, o) in obs.iter() {
            let missing = || Error::UnknownAgent(agent.clone());
            let &(_, action_len) = self.dim_info.get(agent).ok_or_else(missing)?;
            let action: ActionInput = actions.get(agent).ok_or_else(missing)?.clone().into();
            let reward = *rewards.get(agent).ok_or_else(missing)?;
            let next = next_obs.get(agent).ok_or_else(missing)?;
            let done = *dones.get(agent).ok_or_else(missing)?;
            let buffer = self.buffers.get_mut(agent).ok_or_else(missing)?;
            buffer.add(
                o.as_slice(),
                &action.to_one_hot(action_len)?,
                reward,
                next.as_slice(),
                done,
            )?;
        }
        Ok(())
    }

    /// Draws `batch_size` distinct indices once and gathers them from every buffer.
    pub fn sample(&mut self, batch_size: usize) -> Result<Batch> {
        let available = self.len();
        if available < batch_size {
            return Err(Error::InsufficientSamples {
                requested: batch_size,
                available,
            });
        }
        let indices = rand::seq::index::sample(&mut self.rng, available, batch_size).into_vec();

        let mut transitions = BTreeMap::new();
        let mut next_action = BTreeMap::new();
        for (agent, buffer) in self.buffers.iter() {
            let t = buffer.sample(&indices)?;
            next_action.insert(agent.clone(), self.agent(agent)?.target_action(&t.next_obs)?);
            transitions.insert(agent.clone(), t);
        }
        Ok(Batch {
            transitions,
            next_action,
        })
    }

    pub fn select_action<O: Observation>(
        &self,
        obs: &BTreeMap<String, O>,
    ) -> Result<BTreeMap<String, usize>> {
        let mut actions = BTreeMap::new();
        for (agent, o) in obs.iter() {
            let x = o.as_tensor(&DEVICE)?.unsqueeze(0)?;
            let action = self.agent(agent)?.select(&x)?;
            debug!(agent = agent.as_str(), action, "selected");
            actions.insert(agent.clone(), action);
        }
        Ok(actions)
    }

    /// Argmax of each actor's logits; used for evaluation rollouts.
    pub fn greedy_action<O: Observation>(
        &self,
        obs: &BTreeMap<String, O>,
    ) -> Result<BTreeMap<String, usize>> {
        let mut actions = BTreeMap::new();
        for (agent, o) in obs.iter() {
            let x = o.as_tensor(&DEVICE)?.unsqueeze(0)?;
            actions.insert(agent.clone(), self.agent(agent)?.greedy(&x)?);
        }
        Ok(actions)
    }

    pub fn learn(&mut self, batch_size: usize, gamma: f32) -> Result<ScddpgStatus> {
        let mut status = ScddpgStatus::default();

        let batch = self.sample(batch_size)?;
        let obs = batch.joint_obs()?;
        let act = joint(&batch.actions())?;
        let next_obs = batch.joint_next_obs()?;
        let next_act = joint(&batch.next_action)?;
        for (team, critic) in self.critics.iter() {
            let value = critic.estimate_value(&obs, Some(&act))?;
            let next_value = critic.target_critic.estimate_value(&next_obs, Some(&next_act))?;
            let (reward, done) = batch.team_sums(*team)?;
            let target = (reward + (next_value.affine(gamma as f64, 0.0)? * done.affine(-1.0, 1.0)?)?)?;
            let loss = candle_nn::loss::mse(&value, &target.detach())?;
            let grads = backward_clipped(&loss, &critic.critic.varmap, MAX_GRAD_NORM)?;
            critic.apply_gradients(&grads)?;
            status.critic_loss.insert(*team, loss.to_scalar::<f32>()?);
        }

        let names = self.agents.keys().cloned().collect_vec();
        for name in names {
            let batch = self.sample(batch_size)?;
            let team = Team::of(&name)?;
            let critic = self
                .critics
                .get(&team)
                .ok_or_else(|| Error::UnknownAgent(name.clone()))?;
            let agent = self.agent(&name)?;
            let own_obs = &batch
                .transitions
                .get(&name)
                .ok_or_else(|| Error::UnknownAgent(name.clone()))?
                .obs;

            let (action, logits) = agent.action(own_obs)?;
            let mut actions = batch.actions();
            actions.insert(name.clone(), action);
            let value = critic.estimate_value(&batch.joint_obs()?, Some(&joint(&actions)?))?;
            let policy_loss = value.mean_all()?.neg()?;
            let penalty = logits.sqr()?.mean_all()?;
            let loss = (policy_loss + penalty.affine(LOGIT_PENALTY, 0.0)?)?;
            agent.update_actor(&loss)?;
            status.actor_loss.insert(name, loss.to_scalar::<f32>()?);
        }

        Ok(status)
    }

    /// Polyak-averages every target network towards its online network.
    pub fn update_target(&self, tau: f32) -> Result<()> {
        for critic in self.critics.values() {
            critic.soft_update(tau)?;
        }
        for agent in self.agents.values() {
            agent.soft_update(tau)?;
        }
        Ok(())
    }

    /// Writes actor weights and the reward history into `dir`. Critics are not kept.
    pub fn save(&self, dir: impl AsRef<Path>, rewards: &RewardHistory) -> Result<PathBuf> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let mut tensors = HashMap::new();
        for (agent, a) in self.agents.iter() {
            let data = a.actor.policy.varmap.data().lock().map_err(poisoned)?;
            for (name, var) in data.iter() {
                tensors.insert(format!("{agent}.{name}"), var.as_tensor().copy()?);
            }
        }
        let model = dir.join(MODEL_FILE);
        candle_core::safetensors::save(&tensors, &model)?;

        let f = BufWriter::new(File::create(dir.join(REWARDS_FILE))?);
        serde_json::to_writer(f, rewards)?;
        info!(path = %model.display(), "saved actors");
        Ok(model)
    }

    /// Rebuilds a trainer around saved actor weights. The hidden width is read
    /// back from the first layer; learning rates are zeroed, so the result is
    /// only fit for acting.
    pub fn load(dim_info: DimInfo, file: impl AsRef<Path>) -> Result<Self> {
        let tensors = candle_core::safetensors::load(file.as_ref(), &DEVICE)?;

        let saved = tensors
            .keys()
            .filter_map(|k| k.split_once('.').map(|(agent, _)| agent.to_owned()))
            .collect::<BTreeSet<_>>();
        let configured = dim_info.keys().cloned().collect::<BTreeSet<_>>();
        if saved != configured {
            return Err(Error::AgentMismatch { saved, configured });
        }

        // l0.weight is (hidden, obs_len)
        let hidden_dim = match configured.first() {
            Some(agent) => {
                let key = format!("{agent}.l0.weight");
                let Some(w) = tensors.get(&key) else {
                    return Err(Error::Candle(candle_core::Error::Msg(format!(
                        "missing tensor {key}"
                    ))));
                };
                w.dims2()?.0
            }
            None => TrainParams::default().hidden_dim,
        };
        let params = TrainParams {
            buffer_capacity: 0,
            batch_size: 0,
            actor_lr: 0.0,
            critic_lr: 0.0,
            hidden_dim,
            ..Default::default()
        };
        let this = Self::new(dim_info, &params)?;

        for (agent, a) in this.agents.iter() {
            {
                let data = a.actor.policy.varmap.data().lock().map_err(poisoned)?;
                for (name, var) in data.iter() {
                    let key = format!("{agent}.{name}");
                    let Some(t) = tensors.get(&key) else {
                        return Err(Error::Candle(candle_core::Error::Msg(format!(
                            "missing tensor {key}"
                        ))));
                    };
                    var.set(t)?;
                }
            }
            a.actor.target_policy.hard_update(&a.actor.policy)?;
        }
        info!(agents = configured.len(), "loaded actors");
        Ok(this)
    }
}

pub fn load_rewards(path: impl AsRef<Path>) -> Result<RewardHistory> {
    let f = File::open(path)?;
    Ok(serde_json::from_reader(f)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        brains::models::Policy,
        envs::perception::RayObservation,
    };

    fn dims() -> DimInfo {
        [("agent_0", (4, 3)), ("agent_1", (4, 3)), ("adversary_0", (4, 3))]
            .into_iter()
            .map(|(k, v)| (k.to_owned(), v))
            .collect()
    }

    fn small_params() -> TrainParams {
        TrainParams {
            buffer_capacity: 64,
            batch_size: 8,
            hidden_dim: 8,
            ..Default::default()
        }
    }

    fn obs(v: f32) -> RayObservation {
        RayObservation(vec![v; 4].into_boxed_slice())
    }

    fn fill(trainer: &mut Scddpg, steps: usize) {
        for t in 0..steps {
            let names = trainer.dim_info().keys().cloned().collect::<Vec<_>>();
            let o = names.iter().map(|n| (n.clone(), obs(t as f32))).collect::<BTreeMap<_, _>>();
            let a = names.iter().map(|n| (n.clone(), t % 3)).collect::<BTreeMap<_, _>>();
            let r = names
                .iter()
                .map(|n| (n.clone(), if n.starts_with("agent_") { -1.0 } else { 1.0 }))
                .collect::<BTreeMap<_, _>>();
            let n_o = names.iter().map(|n| (n.clone(), obs(t as f32 + 1.0))).collect::<BTreeMap<_, _>>();
            let d = names.iter().map(|n| (n.clone(), t % 10 == 9)).collect::<BTreeMap<_, _>>();
            trainer.add(&o, &a, &r, &n_o, &d).unwrap();
        }
    }

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("ppmarl-{tag}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn teams_follow_names() {
        assert_eq!(Team::of("agent_2").unwrap(), Team::Predator);
        assert_eq!(Team::of("adversary_0").unwrap(), Team::Prey);
        assert!(matches!(Team::of("bystander"), Err(Error::UnknownAgent(_))));

        let mut bad = dims();
        bad.insert("bystander".to_owned(), (4, 3));
        assert!(Scddpg::new(bad, &small_params()).is_err());
    }

    #[test]
    fn one_critic_per_team() {
        let trainer = Scddpg::new(dims(), &small_params()).unwrap();
        assert_eq!(trainer.critics.len(), 2);
        let predators_only = [("agent_0".to_owned(), (4, 3))].into_iter().collect();
        let trainer = Scddpg::new(predators_only, &small_params()).unwrap();
        assert_eq!(trainer.critics.keys().copied().collect::<Vec<_>>(), vec![Team::Predator]);
    }

    #[test]
    fn actions_are_normalised_to_one_hot() {
        assert_eq!(ActionInput::Index(1).to_one_hot(3).unwrap(), vec![0.0, 1.0, 0.0]);
        assert_eq!(
            ActionInput::OneHot(vec![0.0, 0.0, 1.0]).to_one_hot(3).unwrap(),
            vec![0.0, 0.0, 1.0]
        );
        assert!(matches!(
            ActionInput::Index(3).to_one_hot(3),
            Err(Error::InvalidAction { action: 3, actions: 3 })
        ));
        assert!(ActionInput::OneHot(vec![1.0]).to_one_hot(3).is_err());
    }

    #[test]
    fn sampling_needs_enough_transitions() {
        let mut trainer = Scddpg::new(dims(), &small_params()).unwrap();
        fill(&mut trainer, 5);
        assert!(matches!(
            trainer.sample(8),
            Err(Error::InsufficientSamples { requested: 8, available: 5 })
        ));
        fill(&mut trainer, 5);
        assert!(trainer.sample(8).is_ok());
    }

    #[test]
    fn sampled_rows_align_across_agents() {
        let mut trainer = Scddpg::new(dims(), &small_params()).unwrap();
        fill(&mut trainer, 20);
        let batch = trainer.sample(8).unwrap();
        let first = batch.transitions["agent_0"].obs.to_vec2::<f32>().unwrap();
        for t in batch.transitions.values() {
            assert_eq!(t.obs.to_vec2::<f32>().unwrap(), first);
        }
        assert_eq!(batch.next_action["adversary_0"].dims(), &[8, 3]);
    }

    #[test]
    fn team_sums_add_members() {
        let mut trainer = Scddpg::new(dims(), &small_params()).unwrap();
        fill(&mut trainer, 10);
        let batch = trainer.sample(4).unwrap();
        let (r, _) = batch.team_sums(Team::Predator).unwrap();
        assert_eq!(r.to_vec1::<f32>().unwrap(), vec![-2.0; 4]);
        let (r, _) = batch.team_sums(Team::Prey).unwrap();
        assert_eq!(r.to_vec1::<f32>().unwrap(), vec![1.0; 4]);
    }

    #[test]
    fn learn_reports_every_loss() {
        let mut trainer = Scddpg::new(dims(), &small_params()).unwrap();
        fill(&mut trainer, 32);
        let status = trainer.learn(8, 0.95).unwrap();
        assert_eq!(status.critic_loss.len(), 2);
        assert_eq!(status.actor_loss.len(), 3);
        assert!(status.critic_loss.values().all(|l| l.is_finite()));
        assert!(status.mean_actor_loss().is_finite());
        trainer.update_target(0.02).unwrap();
    }

    #[test]
    fn update_target_extremes() {
        let trainer = Scddpg::new(dims(), &small_params()).unwrap();
        let agent = trainer.agent("agent_0").unwrap();
        let x = Tensor::ones((1, 4), DType::F32, &DEVICE).unwrap();
        // move the online actor away from its target
        {
            let data = agent.actor.policy.varmap.data().lock().unwrap();
            for var in data.values() {
                var.set(&(var.as_tensor() + 0.5).unwrap()).unwrap();
            }
        }
        let online = agent.actor.policy.action_logits(&x).unwrap().to_vec2::<f32>().unwrap();
        let target = || {
            agent
                .actor
                .target_policy
                .action_logits(&x)
                .unwrap()
                .to_vec2::<f32>()
                .unwrap()
        };
        let before = target();
        assert_ne!(before, online);
        trainer.update_target(0.0).unwrap();
        assert_eq!(target(), before);
        trainer.update_target(1.0).unwrap();
        assert_eq!(target(), online);
    }

    #[test]
    fn save_load_round_trip_is_exact() {
        let dir = temp_dir("roundtrip");
        let dim_info: DimInfo = [("agent_0", (4, 3)), ("adversary_0", (4, 3))]
            .into_iter()
            .map(|(k, v)| (k.to_owned(), v))
            .collect();
        let trainer = Scddpg::new(dim_info.clone(), &small_params()).unwrap();
        let mut history = RewardHistory::default();
        history.rewards.insert("agent_0".to_owned(), vec![-5.0, -2.5]);
        history.rewards.insert("adversary_0".to_owned(), vec![1.0, 1.0]);
        let model = trainer.save(&dir, &history).unwrap();

        let loaded = Scddpg::load(dim_info, &model).unwrap();
        let x = Tensor::new(&[[0.3f32, -1.0, 2.0, 0.5]], &DEVICE).unwrap();
        for name in ["agent_0", "adversary_0"] {
            let a = trainer.agent(name).unwrap().actor.action_logits(&x).unwrap();
            let b = loaded.agent(name).unwrap().actor.action_logits(&x).unwrap();
            assert_eq!(a.to_vec2::<f32>().unwrap(), b.to_vec2::<f32>().unwrap());
            let t = loaded.agent(name).unwrap().actor.target_policy.action_logits(&x).unwrap();
            assert_eq!(t.to_vec2::<f32>().unwrap(), b.to_vec2::<f32>().unwrap());
        }
        let observations = [("agent_0".to_owned(), obs(0.7)), ("adversary_0".to_owned(), obs(-0.2))]
            .into_iter()
            .collect::<BTreeMap<_, _>>();
        assert_eq!(
            trainer.greedy_action(&observations).unwrap(),
            loaded.greedy_action(&observations).unwrap()
        );
        assert_eq!(load_rewards(dir.join(REWARDS_FILE)).unwrap(), history);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn load_recovers_hidden_width() {
        let dir = temp_dir("hidden");
        let params = TrainParams {
            hidden_dim: 32,
            ..small_params()
        };
        let trainer = Scddpg::new(dims(), &params).unwrap();
        let model = trainer.save(&dir, &RewardHistory::default()).unwrap();
        let loaded = Scddpg::load(dims(), &model).unwrap();
        let x = Tensor::new(&[[1.0f32, 0.0, -0.5, 2.0]], &DEVICE).unwrap();
        for name in ["agent_0", "agent_1", "adversary_0"] {
            let a = trainer.agent(name).unwrap().actor.action_logits(&x).unwrap();
            let b = loaded.agent(name).unwrap().actor.action_logits(&x).unwrap();
            assert_eq!(a.to_vec2::<f32>().unwrap(), b.to_vec2::<f32>().unwrap());
        }
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn load_rejects_other_agents() {
        let dir = temp_dir("mismatch");
        let trainer = Scddpg::new(dims(), &small_params()).unwrap();
        let model = trainer.save(&dir, &RewardHistory::default()).unwrap();
        let fewer: DimInfo = [("agent_0".to_owned(), (4, 3))].into_iter().collect();
        match Scddpg::load(fewer, &model) {
            Err(Error::AgentMismatch { saved, configured }) => {
                assert_eq!(saved.len(), 3);
                assert_eq!(configured.len(), 1);
            }
            _ => panic!("expected an agent mismatch"),
        }
        let _ = std::fs::remove_dir_all(dir);
    }
}
