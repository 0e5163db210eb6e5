//! Configuration of [`PearlAgent`](super::PearlAgent).
use crate::{encoder::EncoderConfig, policy::PolicyConfig, Device};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`PearlAgent`](super::PearlAgent).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct PearlAgentConfig {
    /// Dimension of observations.
    pub obs_dim: usize,

    /// Dimension of actions.
    pub act_dim: usize,

    /// Dimension of the latent task variable.
    pub latent_dim: usize,

    /// If `true`, `z` is a sample of a Gaussian regularized toward the
    /// standard normal, otherwise a point estimate.
    pub use_information_bottleneck: bool,

    /// If `true`, context tuples include the next observation.
    pub use_next_obs_in_context: bool,

    /// Context encoder.
    pub encoder_config: EncoderConfig,

    /// Policy.
    pub policy_config: PolicyConfig,

    /// Device.
    pub device: Device,

    /// Seed of the random number generator for `z` and actions.
    pub seed: u64,
}

impl Default for PearlAgentConfig {
    fn default() -> Self {
        Self {
            obs_dim: 0,
            act_dim: 0,
            latent_dim: 5,
            use_information_bottleneck: true,
            use_next_obs_in_context: false,
            encoder_config: EncoderConfig::default(),
            policy_config: PolicyConfig::default(),
            device: Device::Cpu,
            seed: 42,
        }
    }
}

impl PearlAgentConfig {
    /// Creates a configuration with default values for the given dimensions.
    pub fn new(obs_dim: usize, act_dim: usize) -> Self {
        Self {
            obs_dim,
            act_dim,
            ..Default::default()
        }
    }

    /// Sets the dimension of the latent task variable.
    pub fn latent_dim(mut self, v: usize) -> Self {
        self.latent_dim = v;
        self
    }

    /// Sets whether the information bottleneck is used.
    pub fn use_information_bottleneck(mut self, v: bool) -> Self {
        self.use_information_bottleneck = v;
        self
    }

    /// Sets whether context tuples include the next observation.
    pub fn use_next_obs_in_context(mut self, v: bool) -> Self {
        self.use_next_obs_in_context = v;
        self
    }

    /// Sets the configuration of the context encoder.
    pub fn encoder_config(mut self, v: EncoderConfig) -> Self {
        self.encoder_config = v;
        self
    }

    /// Sets the configuration of the policy.
    pub fn policy_config(mut self, v: PolicyConfig) -> Self {
        self.policy_config = v;
        self
    }

    /// Sets the device.
    pub fn device(mut self, v: Device) -> Self {
        self.device = v;
        self
    }

    /// Sets the random seed.
    pub fn seed(mut self, v: u64) -> Self {
        self.seed = v;
        self
    }

    /// Width of a context tuple.
    pub fn context_dim(&self) -> usize {
        pearl_core::replay_buffer::context_dim(
            self.obs_dim,
            self.act_dim,
            self.use_next_obs_in_context,
        )
    }

    /// Output dimension of the context encoder.
    pub fn encoder_out_dim(&self) -> usize {
        match self.use_information_bottleneck {
            true => 2 * self.latent_dim,
            false => self.latent_dim,
        }
    }

    /// Constructs [`PearlAgentConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`PearlAgentConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::encoder::EncoderKind;
    use tempdir::TempDir;

    #[test]
    fn test_serde_agent_config() -> Result<()> {
        let config = PearlAgentConfig::new(2, 2)
            .latent_dim(3)
            .use_next_obs_in_context(true)
            .encoder_config(
                EncoderConfig::default().kind(EncoderKind::Recurrent { hidden_dim: 32 }),
            );
        assert_eq!(config.context_dim(), 7);
        assert_eq!(config.encoder_out_dim(), 6);

        let dir = TempDir::new("pearl_agent_config")?;
        let path = dir.path().join("agent.yaml");
        config.save(&path)?;
        let config_ = PearlAgentConfig::load(&path)?;
        assert_eq!(config, config_);
        Ok(())
    }
}
