//! Plays one episode and records it as a GIF.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use ppmarl::{
    brains::learners::scddpg::{DimInfo, Scddpg},
    envs::{pp::PredatorPreyEnv, render::GifRecorder, AgentMap, ParallelEnv},
    hparams::{EnvParams, Params, RunParams},
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    #[arg(long)]
    config: Option<PathBuf>,
    /// Trained actors (`model.safetensors`); random actions when absent.
    #[arg(long)]
    model: Option<PathBuf>,
    /// Drive the prey with the scripted random walk instead of actions.
    #[arg(long)]
    wander_prey: bool,
    #[arg(long, default_value = "gif/rollout.gif")]
    out: PathBuf,
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    let args = Args::parse();

    let params: EnvParams = match &args.config {
        Some(path) => {
            RunParams::from_yaml_file(path)
                .with_context(|| format!("reading {}", path.display()))?
                .env
        }
        None => EnvParams::default(),
    };
    let mut env = PredatorPreyEnv::new(params.clone(), args.seed);

    let trainer = match &args.model {
        Some(model) => {
            let dim_info: DimInfo = env
                .possible_agents()
                .iter()
                .map(|a| {
                    (
                        a.clone(),
                        (env.observation_space(a).shape(), env.action_space(a).n),
                    )
                })
                .collect();
            Some(Scddpg::load(dim_info, model).context("loading actors")?)
        }
        None => None,
    };

    if let Some(parent) = args.out.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut gif = GifRecorder::create(&args.out, params.width as u32, params.height as u32, params.fps)?;
    let mut rng = ChaCha8Rng::seed_from_u64(args.seed);

    let (mut obs, _) = env.reset(Some(args.seed));
    let mut returns: AgentMap<f32> = AgentMap::new();
    while !env.agents().is_empty() {
        gif.push(&env.sprites())?;
        let mut actions: AgentMap<usize> = match &trainer {
            Some(trainer) => trainer.greedy_action(&obs)?,
            // 6 is outside the action space on purpose and must act as a no-op
            None => env
                .agents()
                .iter()
                .map(|a| (a.clone(), rng.gen_range(0..=6)))
                .collect(),
        };
        if args.wander_prey {
            let prey = env
                .agents()
                .iter()
                .filter(|a| a.starts_with(ppmarl::envs::pp::PREY_PREFIX))
                .cloned()
                .collect::<Vec<_>>();
            for agent in prey {
                env.wander(&agent)?;
                actions.insert(agent, 0);
            }
        }
        let result = env.step(&actions);
        for (agent, r) in result.rewards.iter() {
            *returns.entry(agent.clone()).or_default() += r;
        }
        obs = result.observations;
    }

    info!(
        frames = gif.frames(),
        steps = env.time_step(),
        ?returns,
        out = %args.out.display(),
        "episode recorded"
    );
    Ok(())
}
