//! Data collection on the training tasks.
use crate::{
    error::PearlError,
    replay_buffer::{MultiTaskReplayBuffer, Transition},
    sampler::sample_z_from_posterior,
    MetaAgent, TaskEnv,
};
use anyhow::Result;

/// Writes transitions of the active task into the RL and context pools.
///
/// The current observation persists across calls, so an episode continues
/// until it terminates or reaches the maximum path length. Switching to
/// another task closes the open episode.
pub struct Collector {
    max_path_length: usize,
    embedding_batch_size: usize,
    task: Option<usize>,
    obs: Option<Vec<f32>>,
    path_len: usize,
    n_env_steps: usize,
    n_rollouts: usize,
}

impl Collector {
    /// Creates a collector.
    pub fn new(max_path_length: usize, embedding_batch_size: usize) -> Self {
        Self {
            max_path_length,
            embedding_batch_size,
            task: None,
            obs: None,
            path_len: 0,
            n_env_steps: 0,
            n_rollouts: 0,
        }
    }

    /// Total number of collected transitions.
    pub fn n_env_steps(&self) -> usize {
        self.n_env_steps
    }

    /// Total number of completed episodes.
    pub fn n_rollouts(&self) -> usize {
        self.n_rollouts
    }

    fn end_episode(
        &mut self,
        task: usize,
        replay: &mut MultiTaskReplayBuffer,
        context: &mut MultiTaskReplayBuffer,
    ) -> Result<()> {
        replay.terminate_episode(task)?;
        context.terminate_episode(task)?;
        self.n_rollouts += 1;
        self.path_len = 0;
        Ok(())
    }

    /// Makes `task` the active task of the environment.
    pub fn set_task<E: TaskEnv>(
        &mut self,
        env: &mut E,
        task: usize,
        replay: &mut MultiTaskReplayBuffer,
        context: &mut MultiTaskReplayBuffer,
    ) -> Result<()> {
        if let Some(prev) = self.task {
            if self.path_len > 0 {
                self.end_episode(prev, replay, context)?;
            }
        }
        env.reset_task(task)?;
        self.obs = Some(env.reset()?);
        self.task = Some(task);
        Ok(())
    }

    /// Performs `num_samples` environment steps with the current `z`.
    pub fn collect_transitions<E, A>(
        &mut self,
        env: &mut E,
        agent: &mut A,
        replay: &mut MultiTaskReplayBuffer,
        context: &mut MultiTaskReplayBuffer,
        num_samples: usize,
        add_to_context: bool,
    ) -> Result<()>
    where
        E: TaskEnv,
        A: MetaAgent,
    {
        let task = self
            .task
            .ok_or_else(|| PearlError::InvalidConfig("no active task for collection".into()))?;
        for _ in 0..num_samples {
            let obs = match self.obs.take() {
                Some(obs) => obs,
                None => env.reset()?,
            };
            let act = agent.sample(&obs, false)?;
            let (step, _) = env.step(&act)?;
            let tr = Transition {
                obs,
                act,
                reward: step.reward,
                next_obs: step.obs.clone(),
                terminal: step.terminal,
            };
            replay.add_sample(task, &tr)?;
            if add_to_context {
                context.add_sample(task, &tr)?;
            }
            self.path_len += 1;
            self.n_env_steps += 1;

            if step.terminal || self.path_len >= self.max_path_length {
                self.end_episode(task, replay, context)?;
                self.obs = Some(env.reset()?);
            } else {
                self.obs = Some(step.obs);
            }
        }
        Ok(())
    }

    /// Collects `num_samples` transitions on the active task.
    ///
    /// Starts from the prior and collects in chunks of `resample_z_rate`
    /// steps. The posterior is re-inferred from the context pool every
    /// `update_posterior_rate` steps (never with `None`), and `z` is redrawn
    /// after each chunk.
    #[allow(clippy::too_many_arguments)]
    pub fn collect_data<E, A>(
        &mut self,
        env: &mut E,
        agent: &mut A,
        replay: &mut MultiTaskReplayBuffer,
        context: &mut MultiTaskReplayBuffer,
        num_samples: usize,
        resample_z_rate: usize,
        update_posterior_rate: Option<usize>,
        add_to_context: bool,
    ) -> Result<()>
    where
        E: TaskEnv,
        A: MetaAgent,
    {
        if resample_z_rate == 0 || update_posterior_rate.map_or(false, |u| resample_z_rate > u) {
            return Err(PearlError::InvalidConfig(format!(
                "resample_z_rate {} is incompatible with update_posterior_rate {:?}",
                resample_z_rate, update_posterior_rate
            ))
            .into());
        }
        let task = self
            .task
            .ok_or_else(|| PearlError::InvalidConfig("no active task for collection".into()))?;

        agent.clear_z(1)?;
        let mut counter = 0;
        for _ in 0..num_samples / resample_z_rate {
            self.collect_transitions(env, agent, replay, context, resample_z_rate, add_to_context)?;
            counter += resample_z_rate;
            if let Some(rate) = update_posterior_rate {
                if counter % rate == 0 {
                    sample_z_from_posterior(agent, context, task, self.embedding_batch_size)?;
                }
            }
            agent.sample_z()?;
        }
        Ok(())
    }
}
