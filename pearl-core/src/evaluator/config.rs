//! Configuration of [`MetaEvaluator`](super::MetaEvaluator).
use crate::EmbeddingSource;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`MetaEvaluator`](super::MetaEvaluator).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct MetaEvaluatorConfig {
    /// Independent evaluation runs per task, each with fresh context.
    pub num_evals: usize,

    /// Rollouts with `z` drawn from the prior.
    pub num_prior_paths: usize,

    /// Rollouts with `z` drawn once from the posterior given the fixed context.
    pub num_posterior_paths: usize,

    /// Rollouts of the online-adaptation regime.
    pub num_online_paths: usize,

    /// Training tasks evaluated per evaluation, drawn with replacement.
    /// `None` evaluates as many training tasks as there are evaluation tasks.
    pub num_train_tasks_eval: Option<usize>,

    /// Source of the fixed context of the posterior regime.
    pub eval_embedding_source: EmbeddingSource,

    /// Steps collected for the fixed context.
    pub num_steps_per_task: usize,

    /// Context transitions per posterior inference.
    pub embedding_batch_size: usize,

    /// Maximum length of a rollout.
    pub max_path_length: usize,

    /// Rollouts take the mode of the policy.
    pub eval_deterministic: bool,

    /// Writes rollouts as JSON under `<model_dir>/eval_trajectories/`.
    pub dump_eval_paths: bool,

    /// Capacity of the evaluation context stores.
    pub replay_buffer_size: usize,

    /// Seed for task sampling and the evaluation context stores.
    pub seed: u64,
}

impl Default for MetaEvaluatorConfig {
    fn default() -> Self {
        Self {
            num_evals: 1,
            num_prior_paths: 1,
            num_posterior_paths: 1,
            num_online_paths: 10,
            num_train_tasks_eval: None,
            eval_embedding_source: EmbeddingSource::OnlineExplorationTrajectories,
            num_steps_per_task: 100,
            embedding_batch_size: 100,
            max_path_length: 20,
            eval_deterministic: true,
            dump_eval_paths: false,
            replay_buffer_size: 100_000,
            seed: 24,
        }
    }
}

impl MetaEvaluatorConfig {
    /// Sets the number of independent evaluation runs.
    pub fn num_evals(mut self, v: usize) -> Self {
        self.num_evals = v;
        self
    }

    /// Sets the number of prior rollouts.
    pub fn num_prior_paths(mut self, v: usize) -> Self {
        self.num_prior_paths = v;
        self
    }

    /// Sets the number of fixed-posterior rollouts.
    pub fn num_posterior_paths(mut self, v: usize) -> Self {
        self.num_posterior_paths = v;
        self
    }

    /// Sets the number of online-adaptation rollouts.
    pub fn num_online_paths(mut self, v: usize) -> Self {
        self.num_online_paths = v;
        self
    }

    /// Sets the number of evaluated training tasks.
    pub fn num_train_tasks_eval(mut self, v: Option<usize>) -> Self {
        self.num_train_tasks_eval = v;
        self
    }

    /// Sets the source of the fixed context.
    pub fn eval_embedding_source(mut self, v: EmbeddingSource) -> Self {
        self.eval_embedding_source = v;
        self
    }

    /// Sets the number of steps collected for the fixed context.
    pub fn num_steps_per_task(mut self, v: usize) -> Self {
        self.num_steps_per_task = v;
        self
    }

    /// Sets the size of context batches.
    pub fn embedding_batch_size(mut self, v: usize) -> Self {
        self.embedding_batch_size = v;
        self
    }

    /// Sets the maximum length of a rollout.
    pub fn max_path_length(mut self, v: usize) -> Self {
        self.max_path_length = v;
        self
    }

    /// Sets if rollouts are deterministic.
    pub fn eval_deterministic(mut self, v: bool) -> Self {
        self.eval_deterministic = v;
        self
    }

    /// Sets if rollouts are dumped as JSON.
    pub fn dump_eval_paths(mut self, v: bool) -> Self {
        self.dump_eval_paths = v;
        self
    }

    /// Sets the capacity of the evaluation context stores.
    pub fn replay_buffer_size(mut self, v: usize) -> Self {
        self.replay_buffer_size = v;
        self
    }

    /// Sets the seed.
    pub fn seed(mut self, v: u64) -> Self {
        self.seed = v;
        self
    }

    /// Loads the configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let rdr = BufReader::new(File::open(path)?);
        Ok(serde_yaml::from_reader(rdr)?)
    }

    /// Saves the configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
