use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::Parser;
use itertools::Itertools;
use kdam::{tqdm, BarExt};
use ppmarl::{
    brains::learners::{
        scddpg::{DimInfo, RewardHistory, Scddpg},
        Status,
    },
    envs::{pp::PredatorPreyEnv, ParallelEnv},
    hparams::{Params, RunParams},
    TbWriter, Timestamp,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Trains predators and prey against each other with team-pooled critics.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// YAML run parameters; anything missing falls back to the defaults.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, default_value = "results")]
    results_dir: PathBuf,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    episodes: Option<usize>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

fn load_params(args: &Args) -> Result<RunParams> {
    let mut params = match &args.config {
        Some(path) => RunParams::from_yaml_file(path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => RunParams::default(),
    };
    if let Some(seed) = args.seed {
        params.train.seed = seed;
    }
    if let Some(episodes) = args.episodes {
        params.train.episodes = episodes;
    }
    params.train.validate().context("checking train params")?;
    Ok(params)
}

fn run_dir(root: &Path) -> Result<PathBuf> {
    let dir = root.join(Timestamp::default().to_string());
    std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
    Ok(dir)
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let params = load_params(&args)?;
    let dir = run_dir(&args.results_dir)?;
    params
        .to_yaml_file(dir.join("params.yaml"))
        .context("writing params.yaml")?;
    info!(dir = %dir.display(), "starting run");

    let train = &params.train;
    let mut env = PredatorPreyEnv::new(params.env.clone(), train.seed);
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
    let mut trainer = Scddpg::new(dim_info, train)?;
    let mut rng = ChaCha8Rng::seed_from_u64(train.seed.wrapping_add(1));

    let mut writer = TbWriter::default();
    writer.init(None, &dir);

    let mut history = RewardHistory {
        rewards: env
            .possible_agents()
            .iter()
            .map(|a| (a.clone(), Vec::with_capacity(train.episodes)))
            .collect(),
    };

    let mut step = 0usize;
    let mut it = tqdm!(total = train.episodes, desc = "Episodes");
    for episode in 0..train.episodes {
        let seed = (episode == 0).then_some(train.seed);
        let (mut obs, _) = env.reset(seed);
        let mut episode_reward: BTreeMap<String, f32> =
            env.agents().iter().map(|a| (a.clone(), 0.0)).collect();

        while !env.agents().is_empty() {
            step += 1;
            let actions = if step < train.random_steps {
                env.agents()
                    .iter()
                    .map(|a| (a.clone(), env.action_space(a).sample(&mut rng)))
                    .collect()
            } else {
                trainer.select_action(&obs)?
            };
            let result = env.step(&actions);
            trainer.add(
                &obs,
                &actions,
                &result.rewards,
                &result.observations,
                &result.terminations,
            )?;
            for (agent, r) in result.rewards.iter() {
                *episode_reward.entry(agent.clone()).or_default() += r;
            }

            if train.learn_due(step, trainer.len()) {
                let status = trainer.learn(train.batch_size, train.gamma)?;
                trainer.update_target(train.tau)?;
                status.log(&mut writer, step);
                debug!(step, actor_loss = status.mean_actor_loss(), "learned");
            }
            obs = result.observations;
        }

        for (agent, r) in episode_reward.iter() {
            history.rewards.entry(agent.clone()).or_default().push(*r);
            writer.add_scalar(&format!("Reward/{agent}"), *r, episode);
        }
        debug!(episode, ?episode_reward, "episode finished");

        if (episode + 1) % 100 == 0 {
            let summary = episode_reward
                .iter()
                .map(|(agent, r)| format!("{agent}: {r:>8.3}"))
                .join("; ");
            let total: f32 = episode_reward.values().sum();
            info!("episode {}, {} sum reward: {:.3}", episode + 1, summary, total);
            writer.flush();
        }
        it.set_postfix(format!("step={step}"));
        it.update(1).ok();
    }

    trainer.save(&dir, &history)?;
    writer.flush();
    info!(dir = %dir.display(), "done");
    Ok(())
}
