//! Rollouts of a task-conditioned agent.
use crate::{
    replay_buffer::{MultiTaskReplayBuffer, Path, Transition},
    MetaAgent, TaskEnv,
};
use anyhow::Result;

/// Runs one episode on the active task of `env`, up to `max_path_length` steps.
///
/// The latent variable held by the agent is kept fixed during the episode.
pub fn rollout<E, A>(
    env: &mut E,
    agent: &mut A,
    task: usize,
    max_path_length: usize,
    deterministic: bool,
) -> Result<Path>
where
    E: TaskEnv,
    A: MetaAgent,
{
    let mut path = Path::new(task);
    let mut obs = env.reset()?;
    while path.len() < max_path_length {
        let act = agent.sample(&obs, deterministic)?;
        let (step, _) = env.step(&act)?;
        let terminal = step.terminal;
        path.push(Transition {
            obs,
            act,
            reward: step.reward,
            next_obs: step.obs.clone(),
            terminal,
        });
        if terminal {
            break;
        }
        obs = step.obs;
    }
    Ok(path)
}

/// Draws `z` from the posterior given context of `task` in `buffer`.
///
/// Falls back to the prior when the store holds no usable context: no
/// transitions, or no completed episode for an order-sensitive encoder.
pub fn sample_z_from_posterior<A: MetaAgent>(
    agent: &mut A,
    buffer: &mut MultiTaskReplayBuffer,
    task: usize,
    batch_size: usize,
) -> Result<()> {
    let sequential = agent.embedding_sequential();
    let store = buffer.store(task)?;
    if store.size() == 0 || (sequential && store.num_episodes() == 0) {
        log::trace!("No context for task {}, sampling z from the prior", task);
        return agent.clear_z(1);
    }
    let context = buffer.random_batch(task, batch_size, sequential)?;
    agent.clear_z(1)?;
    agent.infer_posterior(&[context])
}

/// Collects whole paths on the active task of an environment.
pub struct PathSampler {
    max_path_length: usize,
}

impl PathSampler {
    /// Creates a sampler.
    pub fn new(max_path_length: usize) -> Self {
        Self { max_path_length }
    }

    /// Maximum length of a path.
    pub fn max_path_length(&self) -> usize {
        self.max_path_length
    }

    /// Collects paths while fewer than `max_samples` steps and fewer than
    /// `max_trajs` paths were collected.
    ///
    /// With `resample > 0`, `z` is redrawn after every `resample` paths.
    /// Returns the paths and the total number of steps.
    #[allow(clippy::too_many_arguments)]
    pub fn obtain_samples<E, A>(
        &self,
        env: &mut E,
        agent: &mut A,
        task: usize,
        deterministic: bool,
        max_samples: usize,
        max_trajs: usize,
        resample: usize,
    ) -> Result<(Vec<Path>, usize)>
    where
        E: TaskEnv,
        A: MetaAgent,
    {
        let mut paths = vec![];
        let mut n_steps_total = 0;
        while n_steps_total < max_samples && paths.len() < max_trajs {
            let path = rollout(env, agent, task, self.max_path_length, deterministic)?;
            n_steps_total += path.len();
            paths.push(path);
            if resample > 0 && paths.len() % resample == 0 {
                agent.sample_z()?;
            }
        }
        Ok((paths, n_steps_total))
    }
}
