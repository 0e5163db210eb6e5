//! PEARL agent trained by soft actor-critic.
use super::{ent_coef::EntCoef, EntCoefMode, PearlSacConfig, TwinCritic};
use crate::{agent::PearlAgent, opt::Optimizer, util::OutDim};
use anyhow::Result;
use candle_core::{Device, Tensor};
use candle_nn::loss::mse;
use log::{info, trace};
use pearl_core::{
    record::{stats_record, Record, RecordValue},
    replay_buffer::{MultiTaskReplayBuffer, TransitionBatch},
    MetaAgent, MetaPolicy,
};
use std::{fs, path::Path};

/// RL batch of all task rows, `T * batch_size` rows each.
struct SacBatch {
    obs: Tensor,
    act: Tensor,
    reward: Tensor,
    next_obs: Tensor,
    not_done: Tensor,
}

/// Soft actor-critic agent conditioned on a latent task variable.
///
/// The critics are trained on `(obs, act, z)` with `z` inferred from
/// context, and the context encoder is trained through the critic loss and
/// the KL divergence of the posterior. The policy sees `z` without gradient.
pub struct PearlSac {
    config: PearlSacConfig,
    device: Device,
    agent: PearlAgent,
    critic: TwinCritic,
    ent_coef: EntCoef,
    policy_opt: Optimizer,
    context_opt: Optimizer,
    train: bool,
    n_opts: usize,
}

impl PearlSac {
    /// Builds the agent, the critics and their optimizers.
    pub fn build(config: PearlSacConfig) -> Result<Self> {
        config.validate()?;
        let agent = PearlAgent::build(config.agent_config.clone())?;
        let device = agent.device().clone();
        let agent_config = agent.config();

        let critic = {
            let mut critic_config = config.critic_config.clone();
            if let Some(q_config) = critic_config.q_config.as_mut() {
                q_config.set_in_dim(
                    agent_config.obs_dim + agent_config.act_dim + agent_config.latent_dim,
                );
                q_config.set_out_dim(1);
            }
            TwinCritic::build(critic_config, &device)?
        };

        let ent_coef = {
            let mode = match &config.ent_coef_mode {
                Some(mode) => mode.clone(),
                None => EntCoefMode::Auto(
                    -(agent_config.act_dim as f64),
                    config.policy_opt_config.lr(),
                ),
            };
            EntCoef::new(mode, &device)?
        };

        let policy_opt = config.policy_opt_config.build(agent.policy_vars())?;
        let context_opt = config.context_opt_config.build(agent.encoder_vars())?;

        Ok(Self {
            config,
            device,
            agent,
            critic,
            ent_coef,
            policy_opt,
            context_opt,
            train: true,
            n_opts: 0,
        })
    }

    /// The task-conditioned agent.
    pub fn agent(&self) -> &PearlAgent {
        &self.agent
    }

    /// The critics.
    pub fn critic(&self) -> &TwinCritic {
        &self.critic
    }

    /// Number of optimization steps done so far.
    pub fn n_opts(&self) -> usize {
        self.n_opts
    }

    fn sample_sac(
        &self,
        indices: &[usize],
        replay_buffer: &mut MultiTaskReplayBuffer,
    ) -> Result<SacBatch> {
        let batch_size = self.config.batch_size;
        let batches = indices
            .iter()
            .map(|&task| replay_buffer.random_batch(task, batch_size, false))
            .collect::<Result<Vec<TransitionBatch>>>()?;
        let n = indices.len() * batch_size;
        let (obs_dim, act_dim) = {
            let c = self.agent.config();
            (c.obs_dim, c.act_dim)
        };

        let cat = |f: fn(&TransitionBatch) -> &[f32]| -> Vec<f32> {
            batches.iter().flat_map(|b| f(b).iter().copied()).collect()
        };
        let not_done: Vec<f32> = batches
            .iter()
            .flat_map(|b| b.terminal.iter().map(|&t| 1f32 - t as f32))
            .collect();

        Ok(SacBatch {
            obs: Tensor::from_vec(cat(|b| b.obs.as_slice()), (n, obs_dim), &self.device)?,
            act: Tensor::from_vec(cat(|b| b.act.as_slice()), (n, act_dim), &self.device)?,
            reward: Tensor::from_vec(cat(|b| b.reward.as_slice()), (n,), &self.device)?,
            next_obs: Tensor::from_vec(cat(|b| b.next_obs.as_slice()), (n, obs_dim), &self.device)?,
            not_done: Tensor::from_vec(not_done, (n,), &self.device)?,
        })
    }

    /// One optimization step of the critics, the encoder, the policy and alpha
    /// on a context slice of every task row.
    ///
    /// The posterior is inferred from `context` continuing from the current
    /// latent state. Statistics are returned only if `with_record` is `true`.
    fn take_step(
        &mut self,
        indices: &[usize],
        context: &[TransitionBatch],
        replay_buffer: &mut MultiTaskReplayBuffer,
        with_record: bool,
    ) -> Result<Record> {
        let batch = self.sample_sac(indices, replay_buffer)?;
        self.agent.infer_posterior(context)?;
        let z = self.agent.task_z(self.config.batch_size)?;
        let z_detached = z.detach();

        // Policy at the current observations
        let pi = self.agent.policy_sample(&batch.obs, &z_detached)?;

        // Alpha is updated before the policy loss uses it
        let alpha_loss = self.ent_coef.update(&pi.log_pi)?;
        let alpha = self.ent_coef.alpha()?;

        let policy_loss = {
            let (q1, q2) = self.critic.qvals(&batch.obs, &pi.action, &z_detached)?;
            let min_q = q1.minimum(&q2)?;
            (pi.log_pi.broadcast_mul(&alpha)? - min_q)?.mean_all()?
        };

        // Critic targets use the target networks at actions sampled at next_obs
        let q_target = {
            let next_pi = self.agent.policy_sample(&batch.next_obs, &z_detached)?;
            let q_next = self
                .critic
                .qvals_min_tgt(&batch.next_obs, &next_pi.action, &z_detached)?;
            let v_next = (q_next - next_pi.log_pi.broadcast_mul(&alpha)?)?;
            let discounted = ((&batch.not_done * v_next)? * self.config.discount)?;
            ((&batch.reward * self.config.reward_scale)? + discounted)?.detach()
        };
        let (q1_pred, q2_pred) = self.critic.qvals(&batch.obs, &batch.act, &z)?;
        let qf1_loss = mse(&q1_pred, &q_target)?;
        let qf2_loss = mse(&q2_pred, &q_target)?;

        let kl_div = self.agent.kl_divergence()?;
        let kl_loss = match &kl_div {
            Some(kl) => Some((kl * self.config.kl_lambda)?),
            None => None,
        };
        let critic_loss = match &kl_loss {
            Some(kl_loss) => ((&qf1_loss + &qf2_loss)? + kl_loss)?,
            None => (&qf1_loss + &qf2_loss)?,
        };

        // Gradients of both losses are taken before any parameter changes
        let critic_grads = critic_loss.backward()?;
        let policy_grads = policy_loss.backward()?;
        self.critic.step(&critic_grads)?;
        self.context_opt.step(&critic_grads)?;
        self.policy_opt.step(&policy_grads)?;
        self.critic.soft_update(self.config.tau)?;
        self.n_opts += 1;
        trace!("take_step: n_opts = {}", self.n_opts);

        if !with_record {
            return Ok(Record::empty());
        }

        let to_vec = |t: &Tensor| -> Result<Vec<f32>> { Ok(t.flatten_all()?.to_vec1::<f32>()?) };
        let mut record = Record::from_slice(&[
            ("QF1 Loss", RecordValue::Scalar(qf1_loss.to_scalar::<f32>()?)),
            ("QF2 Loss", RecordValue::Scalar(qf2_loss.to_scalar::<f32>()?)),
            ("Policy Loss", RecordValue::Scalar(policy_loss.to_scalar::<f32>()?)),
        ]);
        record.merge_inplace(stats_record("Q1 Predictions", &to_vec(&q1_pred)?));
        record.merge_inplace(stats_record("Q2 Predictions", &to_vec(&q2_pred)?));
        record.merge_inplace(stats_record("Q Targets", &to_vec(&q_target)?));
        record.merge_inplace(stats_record("Log Pis", &to_vec(&pi.log_pi)?));
        record.merge_inplace(stats_record("Policy mu", &to_vec(&pi.mean)?));
        record.merge_inplace(stats_record("Policy log std", &to_vec(&pi.lstd)?));
        if let Some(alpha_loss) = alpha_loss {
            record.insert("Alpha", RecordValue::Scalar(to_vec(&alpha)?[0]));
            record.insert("Alpha Loss", RecordValue::Scalar(alpha_loss));
        }
        if let (Some(kl_div), Some(kl_loss)) = (kl_div, kl_loss) {
            record.merge_inplace(self.agent.latent_record("train")?);
            record.insert("KL Divergence", RecordValue::Scalar(kl_div.to_scalar::<f32>()?));
            record.insert("KL Loss", RecordValue::Scalar(kl_loss.to_scalar::<f32>()?));
        }

        Ok(record)
    }
}

impl MetaPolicy for PearlSac {
    fn sample(&mut self, obs: &[f32], deterministic: bool) -> Result<Vec<f32>> {
        self.agent.sample(obs, deterministic)
    }
}

impl MetaAgent for PearlSac {
    fn train(&mut self) {
        self.train = true;
    }

    fn eval(&mut self) {
        self.train = false;
    }

    fn is_train(&self) -> bool {
        self.train
    }

    fn clear_z(&mut self, num_tasks: usize) -> Result<()> {
        self.agent.clear_z(num_tasks)
    }

    fn sample_z(&mut self) -> Result<()> {
        self.agent.sample_z()
    }

    fn infer_posterior(&mut self, context: &[TransitionBatch]) -> Result<()> {
        self.agent.infer_posterior(context)
    }

    fn detach_z(&mut self) -> Result<()> {
        self.agent.detach_z();
        Ok(())
    }

    fn embedding_sequential(&self) -> bool {
        self.agent.is_recurrent()
    }

    fn latent_record(&self, suffix: &str) -> Result<Record> {
        self.agent.latent_record(suffix)
    }

    /// Draws `embedding_batch_size` context transitions per task and runs one
    /// optimization step per slice of `embedding_mini_batch_size`, detaching
    /// `z` after each. Statistics are those of the first step.
    fn do_training_with_record(
        &mut self,
        indices: &[usize],
        replay_buffer: &mut MultiTaskReplayBuffer,
        context_buffer: &mut MultiTaskReplayBuffer,
    ) -> Result<Record> {
        let mb_size = self.config.embedding_mini_batch_size;
        let sequential = self.embedding_sequential();
        let context_batches = indices
            .iter()
            .map(|&task| {
                context_buffer.random_batch(task, self.config.embedding_batch_size, sequential)
            })
            .collect::<Result<Vec<_>>>()?;

        self.agent.clear_z(indices.len())?;

        let mut record = Record::empty();
        for i in 0..self.config.num_mini_batches() {
            let context: Vec<TransitionBatch> = context_batches
                .iter()
                .map(|b| b.slice(i * mb_size, mb_size))
                .collect();
            let r = self.take_step(indices, &context, replay_buffer, i == 0)?;
            if i == 0 {
                record = r;
            }
            self.detach_z()?;
        }

        Ok(record)
    }

    fn save_params(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)?;
        self.agent.save(path)?;
        self.critic.save(path)?;
        self.ent_coef.save(path.join("ent_coef.safetensors"))?;
        info!("Save PEARL agent to {:?}", path);
        Ok(())
    }

    fn load_params(&mut self, path: &Path) -> Result<()> {
        self.agent.load(path)?;
        self.critic.load(path)?;
        self.ent_coef.load(path.join("ent_coef.safetensors"))?;
        info!("Load PEARL agent from {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        agent::PearlAgentConfig,
        encoder::{EncoderConfig, EncoderKind},
        mlp::MlpConfig,
        policy::PolicyConfig,
        sac::TwinCriticConfig,
    };
    use pearl_core::replay_buffer::{Transition, TransitionStoreConfig};
    use tempdir::TempDir;

    fn sac_config(recurrent: bool) -> PearlSacConfig {
        let encoder_config = match recurrent {
            true => EncoderConfig::default()
                .units(vec![16])
                .kind(EncoderKind::Recurrent { hidden_dim: 8 }),
            false => EncoderConfig::default().units(vec![16]),
        };
        let agent_config = PearlAgentConfig::new(2, 2)
            .latent_dim(3)
            .encoder_config(encoder_config)
            .policy_config(PolicyConfig::default().units(vec![16]));
        PearlSacConfig::default()
            .agent_config(agent_config)
            .critic_config(
                TwinCriticConfig::default().q_config(MlpConfig::new(0, vec![16], 1, false)),
            )
            .batch_size(8)
            .embedding_batch_size(20)
            .embedding_mini_batch_size(10)
    }

    fn buffer(tasks: &[usize]) -> Result<MultiTaskReplayBuffer> {
        let config = TransitionStoreConfig::default()
            .capacity(200)
            .obs_dim(2)
            .act_dim(2);
        let mut buffer = MultiTaskReplayBuffer::build(&config, tasks)?;
        for &task in tasks {
            for i in 0..50 {
                let x = (i as f32 * 0.1 + task as f32).sin();
                buffer.add_sample(
                    task,
                    &Transition {
                        obs: vec![x, -x],
                        act: vec![0.5 * x, 0.1],
                        reward: -x.abs(),
                        next_obs: vec![x + 0.1, -x],
                        terminal: false,
                    },
                )?;
                if i % 10 == 9 {
                    buffer.terminate_episode(task)?;
                }
            }
        }
        Ok(buffer)
    }

    #[test]
    fn test_mini_batches() -> Result<()> {
        let mut sac = PearlSac::build(sac_config(false))?;
        let mut replay = buffer(&[0, 1])?;
        let mut context = buffer(&[0, 1])?;

        let record = sac.do_training_with_record(&[0, 1], &mut replay, &mut context)?;
        assert_eq!(sac.n_opts(), 2);
        assert_eq!(sac.agent().n_detach(), 2);

        for key in [
            "QF1 Loss",
            "QF2 Loss",
            "Policy Loss",
            "Alpha",
            "Alpha Loss",
            "Z mean train",
            "Z variance train",
            "KL Divergence",
            "KL Loss",
            "Q Targets Mean",
            "Log Pis Std",
        ] {
            assert!(record.get_scalar(key)?.is_finite(), "{}", key);
        }
        Ok(())
    }

    #[test]
    fn test_recurrent_training() -> Result<()> {
        let mut sac = PearlSac::build(sac_config(true).ent_coef_mode(EntCoefMode::Fix(1.0)))?;
        assert!(sac.embedding_sequential());
        let mut replay = buffer(&[3])?;
        let mut context = buffer(&[3])?;

        let record = sac.do_training_with_record(&[3], &mut replay, &mut context)?;
        assert_eq!(sac.n_opts(), 2);
        assert!(record.get("Alpha").is_none());
        assert!(record.get_scalar("QF1 Loss")?.is_finite());
        Ok(())
    }

    #[test]
    fn test_point_estimate_training() -> Result<()> {
        let mut config = sac_config(false);
        config.agent_config.use_information_bottleneck = false;
        let mut sac = PearlSac::build(config)?;
        let mut replay = buffer(&[0])?;
        let mut context = buffer(&[0])?;

        let record = sac.do_training_with_record(&[0], &mut replay, &mut context)?;
        assert!(record.get("KL Loss").is_none());
        assert!(sac.latent_record("train")?.is_empty());
        Ok(())
    }

    #[test]
    fn test_empty_context_fails() -> Result<()> {
        let mut sac = PearlSac::build(sac_config(false))?;
        let mut replay = buffer(&[0])?;
        let config = TransitionStoreConfig::default().obs_dim(2).act_dim(2);
        let mut context = MultiTaskReplayBuffer::build(&config, &[0])?;
        assert!(sac
            .do_training_with_record(&[0], &mut replay, &mut context)
            .is_err());
        Ok(())
    }

    #[test]
    fn test_save_load_params() -> Result<()> {
        let mut sac = PearlSac::build(sac_config(false))?;
        let mut sac_ = PearlSac::build(sac_config(false))?;
        let dir = TempDir::new("pearl_sac")?;
        sac.save_params(dir.path())?;
        sac_.load_params(dir.path())?;

        // Same weights and same prior sample give the same action
        sac.clear_z(1)?;
        sac_.clear_z(1)?;
        let obs = [0.1f32, 0.2];
        assert_eq!(sac.sample(&obs, true)?, sac_.sample(&obs, true)?);
        Ok(())
    }
}
