use std::collections::BTreeMap;

use candle_core::{Device, Tensor};
use rand::Rng;
use serde::{Deserialize, Serialize};

pub mod entity;
pub mod game_manager;
pub mod perception;
pub mod physics;
pub mod pp;
pub mod render;

pub trait Observation: Clone
where
    Self: Sized,
{
    fn as_slice(&self) -> &[f32];
    fn as_tensor(&self, device: &Device) -> candle_core::Result<Tensor> {
        Tensor::from_slice(self.as_slice(), self.as_slice().len(), device)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discrete {
    pub n: usize,
}

impl Discrete {
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        rng.gen_range(0..self.n)
    }

    pub fn contains(&self, action: usize) -> bool {
        action < self.n
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxSpace {
    pub low: Vec<f32>,
    pub high: Vec<f32>,
}

impl BoxSpace {
    pub fn shape(&self) -> usize {
        self.low.len()
    }

    pub fn contains(&self, x: &[f32]) -> bool {
        x.len() == self.shape()
            && x
                .iter()
                .zip(self.low.iter().zip(self.high.iter()))
                .all(|(v, (lo, hi))| (*lo..=*hi).contains(v))
    }
}

/// Per-agent step info. Always empty for this scenario.
pub type Info = BTreeMap<String, String>;
pub type AgentMap<T> = BTreeMap<String, T>;

#[derive(Debug, Clone)]
pub struct StepResult<O> {
    pub observations: AgentMap<O>,
    pub rewards: AgentMap<f32>,
    pub terminations: AgentMap<bool>,
    pub truncations: AgentMap<bool>,
    pub infos: AgentMap<Info>,
}

impl<O> Default for StepResult<O> {
    fn default() -> Self {
        Self {
            observations: AgentMap::new(),
            rewards: AgentMap::new(),
            terminations: AgentMap::new(),
            truncations: AgentMap::new(),
            infos: AgentMap::new(),
        }
    }
}

/// Packed RGB8 pixels, row-major, `width * height * 3` bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

/// Every agent acts simultaneously; all maps are keyed by agent name.
pub trait ParallelEnv {
    type Observation: Observation;

    fn reset(&mut self, seed: Option<u64>) -> (AgentMap<Self::Observation>, AgentMap<Info>);
    fn step(&mut self, actions: &AgentMap<usize>) -> StepResult<Self::Observation>;
    fn observation_space(&self, agent: &str) -> BoxSpace;
    fn action_space(&self, agent: &str) -> Discrete;
    fn render(&self) -> crate::Result<Frame>;
    /// Agents still live in the current episode.
    fn agents(&self) -> &[String];
    fn possible_agents(&self) -> &[String];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PpAction {
    Noop,
    RotateLeft,
    RotateRight,
    Thrust,
    RotateLeftThrust,
}

impl PpAction {
    /// Codes 4 and 5 both rotate left and thrust. Unknown codes are no-ops.
    pub fn from_code(code: usize) -> Self {
        match code {
            1 => Self::RotateLeft,
            2 => Self::RotateRight,
            3 => Self::Thrust,
            4 | 5 => Self::RotateLeftThrust,
            _ => Self::Noop,
        }
    }

    pub fn rotation(self) -> f32 {
        match self {
            Self::RotateLeft | Self::RotateLeftThrust => 1.0,
            Self::RotateRight => -1.0,
            Self::Noop | Self::Thrust => 0.0,
        }
    }

    pub fn thrusts(self) -> bool {
        matches!(self, Self::Thrust | Self::RotateLeftThrust)
    }
}
