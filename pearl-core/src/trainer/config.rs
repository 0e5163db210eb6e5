//! Configuration of [`MetaTrainer`](super::MetaTrainer).
use crate::{error::PearlError, EmbeddingSource};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`MetaTrainer`](super::MetaTrainer).
///
/// ```rust
/// use pearl_core::{EmbeddingSource, MetaTrainerConfig};
///
/// let config = MetaTrainerConfig::default()
///     .num_iterations(100)
///     .meta_batch(16)
///     .train_embedding_source(EmbeddingSource::OnlineOnPolicyTrajectories)
///     .model_dir("model/pearl_point_robot");
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct MetaTrainerConfig {
    /// Number of outer iterations (epochs).
    pub num_iterations: usize,

    /// Meta-updates per iteration.
    pub num_train_steps_per_itr: usize,

    /// Transitions collected per training task before the first iteration.
    pub num_initial_steps: usize,

    /// Training tasks visited for data collection per iteration.
    pub num_tasks_sample: usize,

    /// Transitions collected per visited task.
    pub num_steps_per_task: usize,

    /// Task ids per meta-update, drawn with replacement.
    pub meta_batch: usize,

    /// Context transitions per posterior inference during collection.
    pub embedding_batch_size: usize,

    /// Maximum length of an episode.
    pub max_path_length: usize,

    /// Steps between two draws of `z` during collection.
    pub resample_z_rate: usize,

    /// Steps between two posterior updates during collection.
    pub update_post_train: usize,

    /// How the context of visited tasks is collected.
    pub train_embedding_source: EmbeddingSource,

    /// Interval of evaluation in iterations.
    pub eval_interval: usize,

    /// Capacity of every per-task store.
    pub replay_buffer_size: usize,

    /// Seed of task sampling, environments and stores.
    pub seed: u64,

    /// Where snapshots and evaluation rollouts are saved.
    pub model_dir: Option<String>,
}

impl Default for MetaTrainerConfig {
    fn default() -> Self {
        Self {
            num_iterations: 500,
            num_train_steps_per_itr: 2000,
            num_initial_steps: 2000,
            num_tasks_sample: 5,
            num_steps_per_task: 400,
            meta_batch: 16,
            embedding_batch_size: 100,
            max_path_length: 20,
            resample_z_rate: 1,
            update_post_train: 1,
            train_embedding_source: EmbeddingSource::OnlineExplorationTrajectories,
            eval_interval: 1,
            replay_buffer_size: 1_000_000,
            seed: 42,
            model_dir: None,
        }
    }
}

impl MetaTrainerConfig {
    /// Sets the number of iterations.
    pub fn num_iterations(mut self, v: usize) -> Self {
        self.num_iterations = v;
        self
    }

    /// Sets the number of meta-updates per iteration.
    pub fn num_train_steps_per_itr(mut self, v: usize) -> Self {
        self.num_train_steps_per_itr = v;
        self
    }

    /// Sets the size of the initial pool per task.
    pub fn num_initial_steps(mut self, v: usize) -> Self {
        self.num_initial_steps = v;
        self
    }

    /// Sets the number of visited tasks per iteration.
    pub fn num_tasks_sample(mut self, v: usize) -> Self {
        self.num_tasks_sample = v;
        self
    }

    /// Sets the number of collected transitions per visited task.
    pub fn num_steps_per_task(mut self, v: usize) -> Self {
        self.num_steps_per_task = v;
        self
    }

    /// Sets the number of tasks per meta-update.
    pub fn meta_batch(mut self, v: usize) -> Self {
        self.meta_batch = v;
        self
    }

    /// Sets the size of context batches used during collection.
    pub fn embedding_batch_size(mut self, v: usize) -> Self {
        self.embedding_batch_size = v;
        self
    }

    /// Sets the maximum length of an episode.
    pub fn max_path_length(mut self, v: usize) -> Self {
        self.max_path_length = v;
        self
    }

    /// Sets the resampling interval of `z`.
    pub fn resample_z_rate(mut self, v: usize) -> Self {
        self.resample_z_rate = v;
        self
    }

    /// Sets the posterior update interval.
    pub fn update_post_train(mut self, v: usize) -> Self {
        self.update_post_train = v;
        self
    }

    /// Sets the context source for training.
    pub fn train_embedding_source(mut self, v: EmbeddingSource) -> Self {
        self.train_embedding_source = v;
        self
    }

    /// Sets the evaluation interval.
    pub fn eval_interval(mut self, v: usize) -> Self {
        self.eval_interval = v;
        self
    }

    /// Sets the capacity of the per-task stores.
    pub fn replay_buffer_size(mut self, v: usize) -> Self {
        self.replay_buffer_size = v;
        self
    }

    /// Sets the seed.
    pub fn seed(mut self, v: u64) -> Self {
        self.seed = v;
        self
    }

    /// Sets the directory of snapshots.
    pub fn model_dir(mut self, v: impl Into<String>) -> Self {
        self.model_dir = Some(v.into());
        self
    }

    /// Checks the consistency of the configuration.
    pub fn validate(&self) -> Result<(), PearlError> {
        self.train_embedding_source.validate_for_training()?;
        let positive = [
            ("meta_batch", self.meta_batch),
            ("embedding_batch_size", self.embedding_batch_size),
            ("max_path_length", self.max_path_length),
            ("resample_z_rate", self.resample_z_rate),
            ("update_post_train", self.update_post_train),
            ("eval_interval", self.eval_interval),
            ("replay_buffer_size", self.replay_buffer_size),
        ];
        for (name, v) in positive.iter() {
            if *v == 0 {
                return Err(PearlError::InvalidConfig(format!("{} must be positive", name)));
            }
        }
        if self.resample_z_rate > self.update_post_train {
            return Err(PearlError::InvalidConfig(format!(
                "resample_z_rate ({}) must not exceed update_post_train ({})",
                self.resample_z_rate, self.update_post_train
            )));
        }
        Ok(())
    }

    /// Checks that every context store of a training task holds a complete
    /// episode when the agent samples context sequentially.
    ///
    /// Online sources clear the context store of a task before collecting
    /// `num_steps_per_task` steps into it, so both that count and
    /// `num_initial_steps` must cover at least one full path.
    pub fn validate_for_sequential_context(&self) -> Result<(), PearlError> {
        if self.num_initial_steps < self.max_path_length {
            return Err(PearlError::InvalidConfig(format!(
                "num_initial_steps ({}) must be at least max_path_length ({}) \
                 for sequential context",
                self.num_initial_steps, self.max_path_length
            )));
        }
        let clears_context = matches!(
            self.train_embedding_source,
            EmbeddingSource::OnlineExplorationTrajectories
                | EmbeddingSource::OnlineOnPolicyTrajectories
        );
        if clears_context && self.num_steps_per_task < self.max_path_length {
            return Err(PearlError::InvalidConfig(format!(
                "num_steps_per_task ({}) must be at least max_path_length ({}) \
                 for sequential context with {}",
                self.num_steps_per_task, self.max_path_length, self.train_embedding_source
            )));
        }
        Ok(())
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

#[cfg(test)]
mod test {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_serde_trainer_config() -> Result<()> {
        let config = MetaTrainerConfig::default()
            .num_iterations(3)
            .train_embedding_source(EmbeddingSource::InitialPool)
            .model_dir("some/directory");
        let dir = TempDir::new("trainer_config")?;
        let path = dir.path().join("trainer_config.yaml");
        config.save(&path)?;
        assert_eq!(MetaTrainerConfig::load(&path)?, config);
        Ok(())
    }

    #[test]
    fn test_validate() {
        let config = MetaTrainerConfig::default().resample_z_rate(5).update_post_train(2);
        assert!(matches!(config.validate(), Err(PearlError::InvalidConfig(_))));
        let config = MetaTrainerConfig::default().train_embedding_source(EmbeddingSource::Online);
        assert!(matches!(
            config.validate(),
            Err(PearlError::InvalidEmbeddingSource(_))
        ));
    }

    #[test]
    fn test_validate_for_sequential_context() {
        let config = MetaTrainerConfig::default()
            .max_path_length(10)
            .num_initial_steps(40)
            .num_steps_per_task(5)
            .train_embedding_source(EmbeddingSource::OnlineExplorationTrajectories);
        assert!(matches!(
            config.validate_for_sequential_context(),
            Err(PearlError::InvalidConfig(_))
        ));

        // The initial pool is never cleared.
        let config = config.train_embedding_source(EmbeddingSource::InitialPool);
        assert!(config.validate_for_sequential_context().is_ok());

        let config = config.num_initial_steps(9);
        assert!(matches!(
            config.validate_for_sequential_context(),
            Err(PearlError::InvalidConfig(_))
        ));
    }
}
