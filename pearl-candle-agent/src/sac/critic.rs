//! Twin soft critics with target networks.
use crate::{
    mlp::{Mlp, MlpConfig},
    model::SubModel2,
    opt::{Optimizer, OptimizerConfig},
    util::{track, OutDim},
};
use anyhow::{Context, Result};
use candle_core::{backprop::GradStore, DType, Device, Tensor, D};
use candle_nn::{VarBuilder, VarMap};
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`TwinCritic`].
///
/// The input dimension of `q_config` is `obs_dim + act_dim + latent_dim`.
pub struct TwinCriticConfig {
    pub q_config: Option<MlpConfig>,
    pub opt_config: OptimizerConfig,
}

impl Default for TwinCriticConfig {
    fn default() -> Self {
        Self {
            q_config: None,
            opt_config: OptimizerConfig::default(),
        }
    }
}

impl TwinCriticConfig {
    /// Sets configurations for action-value functions.
    pub fn q_config(mut self, v: MlpConfig) -> Self {
        self.q_config = Some(v);
        self
    }

    /// Sets optimizer configuration.
    pub fn opt_config(mut self, v: OptimizerConfig) -> Self {
        self.opt_config = v;
        self
    }

    /// Constructs [`TwinCriticConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`TwinCriticConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

fn build_pair(varmap: &VarMap, config: &MlpConfig, device: &Device) -> Result<(Mlp, Mlp)> {
    let vb = VarBuilder::from_varmap(varmap, DType::F32, device);
    let qf1 = Mlp::build(vb.pp("qf1"), config.clone())?;
    let qf2 = Mlp::build(vb.pp("qf2"), config.clone())?;
    Ok((qf1, qf2))
}

/// Two action-value functions of `(obs, act, z)` and their target networks.
pub struct TwinCritic {
    varmap: VarMap,
    qf1: Mlp,
    qf2: Mlp,
    varmap_tgt: VarMap,
    qf1_tgt: Mlp,
    qf2_tgt: Mlp,
    opt: Optimizer,
}

impl TwinCritic {
    /// Constructs [`TwinCritic`]. Target networks start as copies.
    pub fn build(config: TwinCriticConfig, device: &Device) -> Result<Self> {
        let mut q_config = config.q_config.context("q_config is not set.")?;
        if q_config.get_out_dim() != 1 {
            q_config.set_out_dim(1);
        }

        let varmap = VarMap::new();
        let (qf1, qf2) = build_pair(&varmap, &q_config, device)?;
        let varmap_tgt = VarMap::new();
        let (qf1_tgt, qf2_tgt) = build_pair(&varmap_tgt, &q_config, device)?;
        track(&varmap_tgt, &varmap, 1.0)?;
        let opt = config.opt_config.build(varmap.all_vars())?;

        Ok(Self {
            varmap,
            qf1,
            qf2,
            varmap_tgt,
            qf1_tgt,
            qf2_tgt,
            opt,
        })
    }

    fn forward(q: &Mlp, obs: &Tensor, act: &Tensor, z: &Tensor) -> Result<Tensor> {
        let act_z = Tensor::cat(&[act, z], D::Minus1)?;
        Ok(q.forward(obs, &act_z)?.squeeze(D::Minus1)?)
    }

    /// Action values of both online critics, `[B]` each.
    pub fn qvals(&self, obs: &Tensor, act: &Tensor, z: &Tensor) -> Result<(Tensor, Tensor)> {
        let q1 = Self::forward(&self.qf1, obs, act, z)?;
        let q2 = Self::forward(&self.qf2, obs, act, z)?;
        Ok((q1, q2))
    }

    /// Elementwise minimum of the two target critics, `[B]`.
    pub fn qvals_min_tgt(&self, obs: &Tensor, act: &Tensor, z: &Tensor) -> Result<Tensor> {
        let q1 = Self::forward(&self.qf1_tgt, obs, act, z)?;
        let q2 = Self::forward(&self.qf2_tgt, obs, act, z)?;
        Ok(q1.minimum(&q2)?)
    }

    /// Updates the online critics with precomputed gradients.
    pub fn step(&mut self, grads: &GradStore) -> Result<()> {
        self.opt.step(grads)
    }

    /// `target <- tau * online + (1 - tau) * target`.
    pub fn soft_update(&mut self, tau: f64) -> Result<()> {
        track(&self.varmap_tgt, &self.varmap, tau)
    }

    /// Saves both online and target critics in the given directory.
    pub fn save<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        let path = path.as_ref();
        self.varmap.save(path.join("qf.safetensors"))?;
        self.varmap_tgt.save(path.join("target_qf.safetensors"))?;
        info!("Save critics to {:?}", path);
        Ok(())
    }

    /// Loads both online and target critics from the given directory.
    pub fn load<T: AsRef<Path>>(&mut self, path: T) -> Result<()> {
        let path = path.as_ref();
        self.varmap.load(path.join("qf.safetensors"))?;
        self.varmap_tgt.load(path.join("target_qf.safetensors"))?;
        info!("Load critics from {:?}", path);
        Ok(())
    }
}
