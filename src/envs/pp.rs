use std::collections::BTreeMap;

use nalgebra::Vector2;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::{
    hparams::{EnvParams, NUM_ACTIONS, SPAWN_OFFSET},
    Error, Result,
};

use super::{
    entity::{Entity, EntityId, Role},
    game_manager::GameManager,
    perception::{RayFan, RayObservation},
    physics::{Category, PhysicsWorld},
    render::{self, Sprite},
    AgentMap, BoxSpace, Discrete, Frame, Info, ParallelEnv, PpAction, StepResult,
};

pub const PREDATOR_PREFIX: &str = "agent_";
pub const PREY_PREFIX: &str = "adversary_";

const PREDATOR_BASE_REWARD: f32 = -5.0;
const PREY_REWARD: f32 = 1.0;

/// Predators named `agent_{i}`, prey named `adversary_{i}`, in spawn order.
pub fn agent_names(params: &EnvParams) -> Vec<String> {
    (0..params.num_predators)
        .map(|i| format!("{PREDATOR_PREFIX}{i}"))
        .chain((0..params.num_prey).map(|i| format!("{PREY_PREFIX}{i}")))
        .collect()
}

/// Halves the base penalty once for every ray that currently sees prey.
pub fn predator_reward(obs: &RayObservation) -> f32 {
    (0..obs.count_category(Category::Prey)).fold(PREDATOR_BASE_REWARD, |r, _| r / 2.0)
}

pub struct PredatorPreyEnv {
    params: EnvParams,
    world: PhysicsWorld,
    game: GameManager,
    rng: ChaCha8Rng,
    possible_agents: Vec<String>,
    agents: Vec<String>,
    entity_of: BTreeMap<String, EntityId>,
    time_step: usize,
}

impl PredatorPreyEnv {
    pub fn new(params: EnvParams, seed: u64) -> Self {
        let mut world = PhysicsWorld::new(1.0 / params.fps);
        let game = GameManager::new(&mut world, params.width, params.height, params.pivot_max_force);
        Self {
            possible_agents: agent_names(&params),
            params,
            world,
            game,
            rng: ChaCha8Rng::seed_from_u64(seed),
            agents: Vec::new(),
            entity_of: BTreeMap::new(),
            time_step: 0,
        }
    }

    pub fn params(&self) -> &EnvParams {
        &self.params
    }

    pub fn time_step(&self) -> usize {
        self.time_step
    }

    pub fn is_done(&self) -> bool {
        self.agents.is_empty()
    }

    fn fan(&self) -> RayFan {
        RayFan {
            num_rays: self.params.num_rays,
            length: self.params.ray_length,
            selection: self.params.ray_selection,
        }
    }

    fn entity_id(&self, agent: &str) -> Result<EntityId> {
        self.entity_of
            .get(agent)
            .copied()
            .ok_or_else(|| Error::UnknownAgent(agent.to_owned()))
    }

    pub fn entity(&self, agent: &str) -> Result<&Entity> {
        let id = self.entity_id(agent)?;
        self.game
            .entity(id)
            .ok_or_else(|| Error::UnknownAgent(agent.to_owned()))
    }

    /// Moves an agent's body, e.g. to stage a scenario.
    pub fn teleport(&mut self, agent: &str, position: Vector2<f32>) -> Result<()> {
        let body = self.entity(agent)?.body;
        self.world.set_position(body, position);
        Ok(())
    }

    /// Drives an agent with the scripted random walk instead of a policy action.
    pub fn wander(&mut self, agent: &str) -> Result<()> {
        let id = self.entity_id(agent)?;
        let force = self.params.move_force;
        let entity = self
            .game
            .entity_mut(id)
            .ok_or_else(|| Error::UnknownAgent(agent.to_owned()))?;
        entity.wander(&mut self.world, force, &mut self.rng);
        Ok(())
    }

    pub fn sprites(&self) -> Vec<Sprite> {
        self.game
            .entities()
            .iter()
            .map(|e| Sprite {
                position: self.world.position(e.body),
                angle: self.world.angle(e.body),
                radius: e.radius,
                role: e.role,
            })
            .collect()
    }

    fn observe(&self, agent: &str) -> Result<RayObservation> {
        let id = self.entity_id(agent)?;
        self.game
            .observe(&self.world, id, &self.fan())
            .ok_or_else(|| Error::UnknownAgent(agent.to_owned()))
    }

    fn apply(&mut self, agent: &str, code: usize) -> Result<()> {
        let action = PpAction::from_code(code);
        debug!(agent, code, ?action, step = self.time_step, "action");
        let id = self.entity_id(agent)?;
        let rotation = action.rotation() * self.params.rotate_step;
        let force = self.params.move_force;
        let Some(entity) = self.game.entity(id) else {
            return Err(Error::UnknownAgent(agent.to_owned()));
        };
        if rotation != 0.0 {
            entity.rotate(&mut self.world, rotation);
        }
        if action.thrusts() {
            entity.thrust(&mut self.world, force);
        }
        Ok(())
    }
}

impl ParallelEnv for PredatorPreyEnv {
    type Observation = RayObservation;

    fn reset(&mut self, seed: Option<u64>) -> (AgentMap<RayObservation>, AgentMap<Info>) {
        if let Some(seed) = seed {
            self.rng = ChaCha8Rng::seed_from_u64(seed);
        }
        self.time_step = 0;
        self.world = PhysicsWorld::new(1.0 / self.params.fps);
        self.game = GameManager::new(
            &mut self.world,
            self.params.width,
            self.params.height,
            self.params.pivot_max_force,
        );
        self.entity_of.clear();

        // both columns share the predator spacing
        let spacing = self.params.height / (self.params.num_predators + 1) as f32;
        for name in self.possible_agents.iter() {
            let (role, index) = match name.strip_prefix(PREDATOR_PREFIX) {
                Some(i) => (Role::Predator, i),
                None => (Role::Prey, name.trim_start_matches(PREY_PREFIX)),
            };
            let row = index.parse::<usize>().unwrap_or_default() + 1;
            let y = spacing * row as f32;
            let id = match role {
                Role::Predator => self
                    .game
                    .add_predator(&mut self.world, Vector2::new(SPAWN_OFFSET, y)),
                Role::Prey => self.game.add_prey(
                    &mut self.world,
                    Vector2::new(self.params.width - SPAWN_OFFSET, y),
                ),
            };
            self.entity_of.insert(name.clone(), id);
        }
        self.agents = self.possible_agents.clone();

        let fan = self.fan();
        let mut observations = AgentMap::new();
        for name in self.agents.iter() {
            if let Some(obs) = self.game.observe(&self.world, self.entity_of[name], &fan) {
                observations.insert(name.clone(), obs);
            }
        }
        let infos = self.agents.iter().map(|a| (a.clone(), Info::new())).collect();
        (observations, infos)
    }

    fn step(&mut self, actions: &AgentMap<usize>) -> StepResult<RayObservation> {
        if self.agents.is_empty() {
            return StepResult::default();
        }
        self.time_step += 1;

        let live = self.agents.clone();
        for agent in live.iter() {
            let code = actions.get(agent).copied().unwrap_or_default();
            if let Err(e) = self.apply(agent, code) {
                debug!(%e, "skipping action");
            }
        }
        self.game.tick(&mut self.world);

        let mut result = StepResult::default();
        for agent in live.iter() {
            let (Ok(obs), Ok(entity)) = (self.observe(agent), self.entity(agent)) else {
                continue;
            };
            let done = entity.contact_count > 0 || self.time_step > self.params.max_steps;
            let reward = match entity.role {
                Role::Predator => predator_reward(&obs),
                Role::Prey => PREY_REWARD,
            };
            result.rewards.insert(agent.clone(), reward);
            result.terminations.insert(agent.clone(), done);
            result.truncations.insert(agent.clone(), done);
            result.observations.insert(agent.clone(), obs);
        }

        // any ending ends the episode for every agent
        if result.terminations.values().any(|d| *d) {
            debug!(step = self.time_step, "episode over");
            for done in result
                .terminations
                .values_mut()
                .chain(result.truncations.values_mut())
            {
                *done = true;
            }
            self.agents.clear();
        }
        result.infos = self.agents.iter().map(|a| (a.clone(), Info::new())).collect();
        result
    }

    fn observation_space(&self, _agent: &str) -> BoxSpace {
        let (low, high) = (0..self.params.num_rays)
            .flat_map(|_| {
                [
                    (Category::Predator.code(), Category::Open.code()),
                    (0.0, self.params.ray_length),
                ]
            })
            .unzip();
        BoxSpace { low, high }
    }

    fn action_space(&self, _agent: &str) -> Discrete {
        Discrete { n: NUM_ACTIONS }
    }

    fn render(&self) -> Result<Frame> {
        render::rasterize(
            self.params.width as u32,
            self.params.height as u32,
            &self.sprites(),
        )
    }

    fn agents(&self) -> &[String] {
        &self.agents
    }

    fn possible_agents(&self) -> &[String] {
        &self.possible_agents
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envs::Observation;

    fn noops(env: &PredatorPreyEnv) -> AgentMap<usize> {
        env.agents().iter().map(|a| (a.clone(), 0)).collect()
    }

    #[test]
    fn reset_returns_every_agent() {
        let mut env = PredatorPreyEnv::new(EnvParams::default(), 0);
        let (obs, infos) = env.reset(Some(1));
        assert_eq!(obs.len(), 4);
        assert_eq!(
            obs.keys().cloned().collect::<Vec<_>>(),
            vec!["adversary_0", "agent_0", "agent_1", "agent_2"]
        );
        for (agent, o) in obs.iter() {
            assert_eq!(o.as_slice().len(), 40);
            assert!(env.observation_space(agent).contains(o.as_slice()));
            assert!(infos[agent].is_empty());
        }
        assert_eq!(env.action_space("agent_0"), Discrete { n: 6 });
    }

    #[test]
    fn noop_episode_ends_after_max_steps() {
        let mut env = PredatorPreyEnv::new(EnvParams::default(), 0);
        env.reset(None);
        let max_steps = env.params().max_steps;
        for _ in 0..max_steps {
            let result = env.step(&noops(&env));
            assert!(result.terminations.values().all(|d| !*d));
            assert_eq!(result.infos.len(), 4);
        }
        let result = env.step(&noops(&env));
        assert_eq!(result.terminations.len(), 4);
        assert!(result.terminations.values().all(|d| *d));
        assert_eq!(result.truncations, result.terminations);
        assert!(env.is_done());
        assert!(result.infos.is_empty());

        let after = env.step(&noops(&env));
        assert!(after.observations.is_empty());
        assert!(after.rewards.is_empty());
    }

    #[test]
    fn contact_ends_the_episode_for_everyone() {
        let mut env = PredatorPreyEnv::new(EnvParams::default(), 0);
        env.reset(Some(3));
        let target = env.entity("agent_0").map(|e| e.body).unwrap();
        let position = env.world.position(target);
        env.teleport("adversary_0", position).unwrap();
        let result = env.step(&noops(&env));
        assert!(env.entity("agent_0").unwrap().contact_count > 0);
        assert!(env.entity("adversary_0").unwrap().contact_count > 0);
        assert_eq!(env.entity("agent_1").unwrap().contact_count, 0);
        assert_eq!(result.terminations.len(), 4);
        assert!(result.terminations.values().all(|d| *d));
        assert!(result.truncations.values().all(|d| *d));
        assert!(env.agents().is_empty());
    }

    #[test]
    fn rewards_follow_role() {
        let mut env = PredatorPreyEnv::new(EnvParams::default(), 0);
        env.reset(None);
        let result = env.step(&noops(&env));
        assert_eq!(result.rewards["adversary_0"], 1.0);
        let r = result.rewards["agent_0"];
        let seen = result.observations["agent_0"].count_category(Category::Prey);
        assert_eq!(r, -5.0 / 2f32.powi(seen as i32));
    }

    #[test]
    fn predator_reward_halves_per_prey_ray() {
        let mut values = Vec::new();
        for category in [Category::Prey, Category::Prey, Category::Predator, Category::Open] {
            values.extend([category.code(), 100.0]);
        }
        let obs = RayObservation(values.into_boxed_slice());
        assert_eq!(predator_reward(&obs), -1.25);
        let blind = RayObservation(vec![Category::Open.code(), 500.0].into_boxed_slice());
        assert_eq!(predator_reward(&blind), -5.0);
    }

    #[test]
    fn predator_with_prey_in_view_is_penalised_less() {
        let mut env = PredatorPreyEnv::new(EnvParams::default(), 0);
        env.reset(None);
        let predator = env.world.position(env.entity("agent_1").unwrap().body);
        // straight ahead, inside the fan and clear of the other predators
        env.teleport("adversary_0", predator + Vector2::new(150.0, 0.0))
            .unwrap();
        let result = env.step(&noops(&env));
        let seen = result.observations["agent_1"].count_category(Category::Prey);
        assert!(seen > 0);
        assert_eq!(result.rewards["agent_1"], -5.0 / 2f32.powi(seen as i32));
        assert!(result.rewards["agent_1"] > -5.0);
        assert!(result.terminations.values().all(|d| !*d));
    }

    #[test]
    fn actions_are_matched_by_name() {
        let mut env = PredatorPreyEnv::new(EnvParams::default(), 0);
        env.reset(None);
        let mut actions = AgentMap::new();
        actions.insert("agent_1".to_owned(), 3);
        actions.insert("nobody".to_owned(), 3);
        let before = env.world.position(env.entity("agent_1").unwrap().body);
        env.step(&actions);
        let moved = env.world.position(env.entity("agent_1").unwrap().body);
        assert!(moved.x > before.x);
        for still in ["agent_0", "agent_2", "adversary_0"] {
            let v = env.world.velocity(env.entity(still).unwrap().body);
            assert!(v.norm() < 1e-3);
        }
    }

    #[test]
    fn rotate_actions_turn_the_body() {
        let mut env = PredatorPreyEnv::new(EnvParams::default(), 0);
        env.reset(None);
        let actions = [("agent_0", 1), ("agent_1", 2), ("agent_2", 5)]
            .into_iter()
            .map(|(a, c)| (a.to_owned(), c))
            .collect();
        env.step(&actions);
        let angle = |a: &str| env.world.angle(env.entity(a).unwrap().body);
        assert!((angle("agent_0") - 0.05).abs() < 1e-5);
        assert!((angle("agent_1") + 0.05).abs() < 1e-5);
        assert!((angle("agent_2") - 0.05).abs() < 1e-5);
    }

    #[test]
    fn seeded_wander_is_reproducible() {
        let run = || {
            let mut env = PredatorPreyEnv::new(EnvParams::default(), 0);
            env.reset(Some(11));
            for _ in 0..10 {
                env.wander("adversary_0").unwrap();
                env.step(&AgentMap::new());
            }
            env.world.position(env.entity("adversary_0").unwrap().body)
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn unknown_agent_is_an_error() {
        let mut env = PredatorPreyEnv::new(EnvParams::default(), 0);
        env.reset(None);
        assert!(matches!(env.wander("agent_9"), Err(Error::UnknownAgent(_))));
    }

    #[test]
    fn render_produces_arena_sized_frame() {
        let mut env = PredatorPreyEnv::new(EnvParams::default(), 0);
        env.reset(None);
        let frame = env.render().unwrap();
        assert_eq!((frame.width, frame.height), (1200, 800));
        assert_eq!(frame.rgb.len(), 1200 * 800 * 3);
    }
}
