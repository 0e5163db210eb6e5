//! Agent holding the context encoder, the policy and the latent state.
use super::PearlAgentConfig;
use crate::{
    encoder::ContextEncoder,
    latent::LatentState,
    policy::{PolicyOutput, TanhGaussianPolicy},
};
use anyhow::{bail, Result};
use candle_core::{DType, Device, Tensor, Var, D};
use candle_nn::{VarBuilder, VarMap};
use log::info;
use pearl_core::{
    error::PearlError,
    record::{Record, RecordValue},
    replay_buffer::TransitionBatch,
    MetaPolicy,
};
use rand::{rngs::StdRng, SeedableRng};
use std::path::Path;

/// Context encoder, tanh-Gaussian policy and latent task variable.
///
/// The latent state holds one `z` per task row. The policy acts on a single
/// row, training uses all rows at once.
pub struct PearlAgent {
    config: PearlAgentConfig,
    device: Device,
    encoder_varmap: VarMap,
    encoder: Box<dyn ContextEncoder>,
    policy_varmap: VarMap,
    policy: TanhGaussianPolicy,
    latent: LatentState,
    rng: StdRng,
    n_detach: usize,
}

impl PearlAgent {
    /// Builds the agent. The latent state is undefined until
    /// [`PearlAgent::clear_z`] or [`PearlAgent::infer_posterior`].
    pub fn build(config: PearlAgentConfig) -> Result<Self> {
        let device: Device = config.device.try_into()?;

        let encoder_varmap = VarMap::new();
        let encoder = {
            let vb = VarBuilder::from_varmap(&encoder_varmap, DType::F32, &device);
            config
                .encoder_config
                .build(vb, config.context_dim(), config.encoder_out_dim())?
        };

        let policy_varmap = VarMap::new();
        let policy = {
            let vb = VarBuilder::from_varmap(&policy_varmap, DType::F32, &device);
            TanhGaussianPolicy::build(
                vb,
                &config.policy_config,
                config.obs_dim + config.latent_dim,
                config.act_dim,
            )?
        };

        Ok(Self {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            device,
            encoder_varmap,
            encoder,
            policy_varmap,
            policy,
            latent: LatentState::Undefined,
            n_detach: 0,
        })
    }

    /// Configuration of the agent.
    pub fn config(&self) -> &PearlAgentConfig {
        &self.config
    }

    /// The device on which tensors are placed.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Current latent state.
    pub fn latent(&self) -> &LatentState {
        &self.latent
    }

    /// Number of calls to [`PearlAgent::detach_z`].
    pub fn n_detach(&self) -> usize {
        self.n_detach
    }

    /// Returns `true` if context must be sampled as whole episodes in order.
    pub fn is_recurrent(&self) -> bool {
        self.encoder.is_recurrent()
    }

    /// Variables of the context encoder.
    pub fn encoder_vars(&self) -> Vec<Var> {
        self.encoder_varmap.all_vars()
    }

    /// Variables of the policy.
    pub fn policy_vars(&self) -> Vec<Var> {
        self.policy_varmap.all_vars()
    }

    /// Resets `num_tasks` rows to the prior and draws `z`.
    ///
    /// The encoder state is dropped.
    pub fn clear_z(&mut self, num_tasks: usize) -> Result<()> {
        self.latent = LatentState::prior(
            num_tasks,
            self.config.latent_dim,
            self.config.use_information_bottleneck,
            &mut self.rng,
            &self.device,
        )?;
        Ok(())
    }

    /// Redraws `z` from the current distribution.
    pub fn sample_z(&mut self) -> Result<()> {
        self.latent = self.latent.resample(&mut self.rng)?;
        Ok(())
    }

    /// Cuts the gradient path of the latent state, keeping its value.
    pub fn detach_z(&mut self) {
        self.latent = self.latent.detach();
        self.n_detach += 1;
    }

    /// Stacks one context batch per task row into a tensor `[T, N, C]`.
    pub fn context_tensor(&self, context: &[TransitionBatch]) -> Result<Tensor> {
        let n = match context.first() {
            Some(b) => b.len(),
            None => bail!("Context of no task"),
        };
        if n == 0 || context.iter().any(|b| b.len() != n) {
            bail!("Context batches must be non-empty and of the same length");
        }

        let use_next_obs = self.config.use_next_obs_in_context;
        let c = context[0].context_dim(use_next_obs);
        let data: Vec<f32> = context
            .iter()
            .flat_map(|b| b.to_context(use_next_obs))
            .collect();
        Ok(Tensor::from_vec(data, (context.len(), n, c), &self.device)?)
    }

    /// Encodes context `[T, N, C]` and draws `z` from the posterior.
    ///
    /// An order-sensitive encoder continues from the state left by the
    /// previous call when the latent state is a posterior of the same rows.
    pub fn infer_posterior_tensor(&mut self, context: &Tensor) -> Result<()> {
        let t = context.dims3()?.0;
        let state = match self.latent.num_tasks() == t {
            true => self.latent.encoder_state(),
            false => crate::encoder::EncoderState::Stateless,
        };
        let (params, state) = self.encoder.encode(context, state)?;
        self.latent = LatentState::posterior(
            &params,
            state,
            self.config.latent_dim,
            self.config.use_information_bottleneck,
            &mut self.rng,
        )?;
        Ok(())
    }

    /// Encodes one context batch per task row and draws `z` from the posterior.
    pub fn infer_posterior(&mut self, context: &[TransitionBatch]) -> Result<()> {
        let context = self.context_tensor(context)?;
        self.infer_posterior_tensor(&context)
    }

    /// Repeats `z` of every task row `batch_size` times, `[T * batch_size, latent_dim]`.
    pub fn task_z(&self, batch_size: usize) -> Result<Tensor> {
        let z = self.latent.z()?;
        let (t, l) = z.dims2()?;
        Ok(z.unsqueeze(1)?
            .broadcast_as((t, batch_size, l))?
            .contiguous()?
            .reshape((t * batch_size, l))?)
    }

    /// Samples actions for observations `[B, obs_dim]` conditioned on `z` `[B, latent_dim]`.
    pub fn policy_sample(&mut self, obs: &Tensor, z: &Tensor) -> Result<PolicyOutput> {
        let xs = Tensor::cat(&[obs, z], D::Minus1)?;
        self.policy.sample(&xs, &mut self.rng)
    }

    /// KL divergence of the latent distribution from the prior, summed over rows.
    pub fn kl_divergence(&self) -> Result<Option<Tensor>> {
        self.latent.kl_divergence()
    }

    /// Summary of the latent distribution of the first row.
    pub fn latent_record(&self, suffix: &str) -> Result<Record> {
        let mut record = Record::empty();
        if let Some(dist) = self.latent.dist() {
            let mean = dist.mean.get(0)?.abs()?.mean_all()?.to_scalar::<f32>()?;
            let var = dist.var.get(0)?.mean_all()?.to_scalar::<f32>()?;
            record.insert(format!("Z mean {}", suffix), RecordValue::Scalar(mean));
            record.insert(format!("Z variance {}", suffix), RecordValue::Scalar(var));
        }
        Ok(record)
    }

    /// Saves the encoder and the policy in the given directory.
    pub fn save<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        let path = path.as_ref();
        self.encoder_varmap.save(path.join("context_encoder.safetensors"))?;
        self.policy_varmap.save(path.join("policy.safetensors"))?;
        info!("Save agent to {:?}", path);
        Ok(())
    }

    /// Loads the encoder and the policy from the given directory.
    pub fn load<T: AsRef<Path>>(&mut self, path: T) -> Result<()> {
        let path = path.as_ref();
        self.encoder_varmap.load(path.join("context_encoder.safetensors"))?;
        self.policy_varmap.load(path.join("policy.safetensors"))?;
        info!("Load agent from {:?}", path);
        Ok(())
    }
}

impl MetaPolicy for PearlAgent {
    fn sample(&mut self, obs: &[f32], deterministic: bool) -> Result<Vec<f32>> {
        let n = self.latent.num_tasks();
        if n == 0 {
            return Err(PearlError::LatentUndefined.into());
        } else if n != 1 {
            return Err(PearlError::InvalidConfig(format!(
                "acting requires a single task row, got {}",
                n
            ))
            .into());
        }

        let obs = Tensor::from_slice(obs, (1, obs.len()), &self.device)?;
        let z = self.latent.z()?.detach();
        let xs = Tensor::cat(&[&obs, &z], D::Minus1)?;
        let act = match deterministic {
            true => self.policy.mode(&xs)?,
            false => self.policy.sample(&xs, &mut self.rng)?.action,
        };
        Ok(act.flatten_all()?.to_vec1()?)
    }
}
