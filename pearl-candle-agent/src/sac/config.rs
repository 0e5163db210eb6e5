//! Configuration of [`PearlSac`](super::PearlSac).
use super::{ent_coef::EntCoefMode, TwinCriticConfig};
use crate::{agent::PearlAgentConfig, opt::OptimizerConfig};
use anyhow::Result;
use pearl_core::error::PearlError;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`PearlSac`](super::PearlSac).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct PearlSacConfig {
    /// Agent with the context encoder and the policy.
    pub agent_config: PearlAgentConfig,

    /// Twin critics. The input dimension is set from the agent.
    pub critic_config: TwinCriticConfig,

    /// Optimizer of the policy.
    pub policy_opt_config: OptimizerConfig,

    /// Optimizer of the context encoder.
    pub context_opt_config: OptimizerConfig,

    /// Entropy coefficient. `None` tunes alpha toward `-act_dim` with the
    /// learning rate of the policy.
    pub ent_coef_mode: Option<EntCoefMode>,

    /// Size of the RL batch per task.
    pub batch_size: usize,

    /// Size of the context batch per task in one meta-update.
    pub embedding_batch_size: usize,

    /// Size of the context slices between which `z` is detached.
    pub embedding_mini_batch_size: usize,

    /// Discount factor.
    pub discount: f64,

    /// Scale of rewards in the critic targets.
    pub reward_scale: f64,

    /// Soft update coefficient of the target critics.
    pub tau: f64,

    /// Weight of the KL divergence in the encoder loss.
    pub kl_lambda: f64,
}

impl Default for PearlSacConfig {
    fn default() -> Self {
        Self {
            agent_config: PearlAgentConfig::default(),
            critic_config: TwinCriticConfig::default(),
            policy_opt_config: OptimizerConfig::Adam { lr: 3e-4 },
            context_opt_config: OptimizerConfig::Adam { lr: 3e-4 },
            ent_coef_mode: None,
            batch_size: 256,
            embedding_batch_size: 100,
            embedding_mini_batch_size: 100,
            discount: 0.99,
            reward_scale: 5.0,
            tau: 0.005,
            kl_lambda: 0.1,
        }
    }
}

impl PearlSacConfig {
    /// Sets the configuration of the agent.
    pub fn agent_config(mut self, v: PearlAgentConfig) -> Self {
        self.agent_config = v;
        self
    }

    /// Sets the configuration of the critics.
    pub fn critic_config(mut self, v: TwinCriticConfig) -> Self {
        self.critic_config = v;
        self
    }

    /// Sets the optimizer of the policy.
    pub fn policy_opt_config(mut self, v: OptimizerConfig) -> Self {
        self.policy_opt_config = v;
        self
    }

    /// Sets the optimizer of the context encoder.
    pub fn context_opt_config(mut self, v: OptimizerConfig) -> Self {
        self.context_opt_config = v;
        self
    }

    /// Sets the mode of the entropy coefficient.
    pub fn ent_coef_mode(mut self, v: EntCoefMode) -> Self {
        self.ent_coef_mode = Some(v);
        self
    }

    /// Sets the size of the RL batch per task.
    pub fn batch_size(mut self, v: usize) -> Self {
        self.batch_size = v;
        self
    }

    /// Sets the size of the context batch per task.
    pub fn embedding_batch_size(mut self, v: usize) -> Self {
        self.embedding_batch_size = v;
        self
    }

    /// Sets the size of the context slices.
    pub fn embedding_mini_batch_size(mut self, v: usize) -> Self {
        self.embedding_mini_batch_size = v;
        self
    }

    /// Sets the discount factor.
    pub fn discount(mut self, v: f64) -> Self {
        self.discount = v;
        self
    }

    /// Sets the reward scale.
    pub fn reward_scale(mut self, v: f64) -> Self {
        self.reward_scale = v;
        self
    }

    /// Sets the soft update coefficient.
    pub fn tau(mut self, v: f64) -> Self {
        self.tau = v;
        self
    }

    /// Sets the weight of the KL divergence.
    pub fn kl_lambda(mut self, v: f64) -> Self {
        self.kl_lambda = v;
        self
    }

    /// Number of context slices in one meta-update.
    pub fn num_mini_batches(&self) -> usize {
        self.embedding_batch_size / self.embedding_mini_batch_size.max(1)
    }

    /// Checks batch sizes.
    pub fn validate(&self) -> Result<(), PearlError> {
        if self.batch_size == 0 || self.embedding_mini_batch_size == 0 {
            return Err(PearlError::InvalidConfig(
                "batch sizes must be positive".to_string(),
            ));
        }
        if self.embedding_batch_size < self.embedding_mini_batch_size {
            return Err(PearlError::InvalidConfig(format!(
                "embedding_batch_size ({}) < embedding_mini_batch_size ({})",
                self.embedding_batch_size, self.embedding_mini_batch_size
            )));
        }
        Ok(())
    }

    /// Constructs [`PearlSacConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`PearlSacConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
