use std::{
    fs::File,
    io::{Read, Write},
    path::Path,
};

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::envs::perception::RaySelection;

pub const ARENA_WIDTH: f32 = 1200.0;
pub const ARENA_HEIGHT: f32 = 800.0;
pub const FPS: f32 = 30.0;
pub const MAX_STEPS: usize = 100;

pub const NUM_PREDATORS: usize = 3;
pub const NUM_PREY: usize = 1;
/// Horizontal distance of the spawn columns from the left and right walls.
pub const SPAWN_OFFSET: f32 = 400.0;

pub const NUM_RAYS: usize = 20;
pub const RAY_LENGTH: f32 = 500.0;

pub const PREDATOR_RADIUS: f32 = 30.0;
pub const PREY_RADIUS: f32 = 20.0;
pub const PREDATOR_MAX_VEL: f32 = 1000.0;
pub const PREY_MAX_VEL: f32 = 500.0;

pub const BODY_MASS: f32 = 0.4;
pub const BODY_HEALTH: f32 = 10.0;
pub const PIVOT_MAX_FORCE: f32 = 700.0;
pub const MOVE_FORCE: f32 = 1500.0;
pub const ROTATE_STEP: f32 = 0.05;
pub const WALL_FRICTION: f32 = 0.3;

pub const NUM_ACTIONS: usize = 6;

pub const MAX_GRAD_NORM: f64 = 0.5;
pub const LOGIT_PENALTY: f64 = 1e-3;

pub trait Params {
    fn to_yaml(&self) -> crate::Result<String>
    where
        Self: Serialize,
    {
        let s = serde_yaml::to_string(self)?;
        Ok(s)
    }
    fn to_yaml_file(&self, path: impl AsRef<Path>) -> crate::Result<()>
    where
        Self: Serialize,
    {
        let mut f = File::create(path)?;
        let s = self.to_yaml()?;
        write!(f, "{}", s)?;
        Ok(())
    }
    fn from_yaml<'a>(yaml: &'a str) -> crate::Result<Self>
    where
        Self: Deserialize<'a> + Sized,
    {
        let this = serde_yaml::from_str(yaml)?;
        Ok(this)
    }
    fn from_yaml_file(path: impl AsRef<Path>) -> crate::Result<Self>
    where
        Self: DeserializeOwned + Sized,
    {
        let mut f = File::open(path)?;
        let mut s = String::new();
        f.read_to_string(&mut s)?;
        let this = serde_yaml::from_str(&s)?;
        Ok(this)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvParams {
    pub width: f32,
    pub height: f32,
    pub fps: f32,
    pub max_steps: usize,
    pub num_predators: usize,
    pub num_prey: usize,
    pub num_rays: usize,
    pub ray_length: f32,
    pub ray_selection: RaySelection,
    pub move_force: f32,
    pub rotate_step: f32,
    pub pivot_max_force: f32,
}

impl Default for EnvParams {
    fn default() -> Self {
        Self {
            width: ARENA_WIDTH,
            height: ARENA_HEIGHT,
            fps: FPS,
            max_steps: MAX_STEPS,
            num_predators: NUM_PREDATORS,
            num_prey: NUM_PREY,
            num_rays: NUM_RAYS,
            ray_length: RAY_LENGTH,
            ray_selection: RaySelection::default(),
            move_force: MOVE_FORCE,
            rotate_step: ROTATE_STEP,
            pivot_max_force: PIVOT_MAX_FORCE,
        }
    }
}

impl EnvParams {
    pub fn obs_len(&self) -> usize {
        2 * self.num_rays
    }
}

impl Params for EnvParams {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainParams {
    pub episodes: usize,
    pub buffer_capacity: usize,
    pub batch_size: usize,
    pub actor_lr: f64,
    pub critic_lr: f64,
    pub hidden_dim: usize,
    pub gamma: f32,
    pub tau: f32,
    pub learn_interval: usize,
    pub random_steps: usize,
    pub seed: u64,
}

impl Default for TrainParams {
    fn default() -> Self {
        Self {
            episodes: 30_000,
            buffer_capacity: 1_000_000,
            batch_size: 1024,
            actor_lr: 0.01,
            critic_lr: 0.01,
            hidden_dim: 64,
            gamma: 0.95,
            tau: 0.02,
            learn_interval: 100,
            random_steps: 50_000,
            seed: 0,
        }
    }
}

impl TrainParams {
    pub fn validate(&self) -> crate::Result<()> {
        if self.learn_interval == 0 {
            return Err(crate::Error::InvalidParams(
                "learn_interval must be at least 1".to_owned(),
            ));
        }
        if self.batch_size == 0 {
            return Err(crate::Error::InvalidParams(
                "batch_size must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }

    /// Learning starts after the random warm-up, runs every `learn_interval`
    /// steps, and waits until a full batch is stored.
    pub fn learn_due(&self, step: usize, stored: usize) -> bool {
        step >= self.random_steps
            && step % self.learn_interval.max(1) == 0
            && stored >= self.batch_size
    }
}

impl Params for TrainParams {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunParams {
    pub env: EnvParams,
    pub train: TrainParams,
}

impl Params for RunParams {}
