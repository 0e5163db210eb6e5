//! A [`MetaAgent`] without networks, used for tests.
use crate::{
    record::{Record, RecordValue},
    replay_buffer::{MultiTaskReplayBuffer, TransitionBatch},
    MetaAgent, MetaPolicy,
};
use anyhow::Result;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{fs, path::Path};

/// Agent taking uniformly random actions and counting the calls it receives.
pub struct DummyAgent {
    act_dim: usize,
    train: bool,
    rows: usize,
    sequential: bool,
    rng: StdRng,

    /// Number of calls to [`MetaAgent::clear_z`].
    pub n_clear_z: usize,

    /// Number of calls to [`MetaAgent::sample_z`].
    pub n_sample_z: usize,

    /// Number of calls to [`MetaAgent::infer_posterior`].
    pub n_infer_posterior: usize,

    /// Number of calls to [`MetaAgent::detach_z`].
    pub n_detach_z: usize,

    /// Task ids of every meta-update.
    pub trained_indices: Vec<Vec<usize>>,

    /// Length of the first context batch of the last posterior inference.
    pub last_context_len: usize,
}

impl DummyAgent {
    /// Creates the agent.
    pub fn new(act_dim: usize) -> Self {
        Self {
            act_dim,
            train: true,
            rows: 0,
            sequential: false,
            rng: StdRng::seed_from_u64(0),
            n_clear_z: 0,
            n_sample_z: 0,
            n_infer_posterior: 0,
            n_detach_z: 0,
            trained_indices: vec![],
            last_context_len: 0,
        }
    }

    /// Makes the agent sample context by whole episodes, as a recurrent
    /// encoder does.
    pub fn sequential(mut self, v: bool) -> Self {
        self.sequential = v;
        self
    }
}

impl MetaPolicy for DummyAgent {
    fn sample(&mut self, _obs: &[f32], deterministic: bool) -> Result<Vec<f32>> {
        if self.rows == 0 {
            return Err(crate::error::PearlError::LatentUndefined.into());
        }
        Ok((0..self.act_dim)
            .map(|_| match deterministic {
                true => 0.0,
                false => self.rng.gen_range(-1.0..1.0),
            })
            .collect())
    }
}

impl MetaAgent for DummyAgent {
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
        self.rows = num_tasks;
        self.n_clear_z += 1;
        Ok(())
    }

    fn sample_z(&mut self) -> Result<()> {
        self.n_sample_z += 1;
        Ok(())
    }

    fn infer_posterior(&mut self, context: &[TransitionBatch]) -> Result<()> {
        self.rows = context.len();
        self.last_context_len = context.first().map(|c| c.len()).unwrap_or(0);
        self.n_infer_posterior += 1;
        Ok(())
    }

    fn detach_z(&mut self) -> Result<()> {
        self.n_detach_z += 1;
        Ok(())
    }

    fn embedding_sequential(&self) -> bool {
        self.sequential
    }

    fn latent_record(&self, _suffix: &str) -> Result<Record> {
        Ok(Record::empty())
    }

    fn do_training_with_record(
        &mut self,
        indices: &[usize],
        replay_buffer: &mut MultiTaskReplayBuffer,
        context_buffer: &mut MultiTaskReplayBuffer,
    ) -> Result<Record> {
        for &task in indices.iter() {
            replay_buffer.random_batch(task, 1, false)?;
            context_buffer.random_batch(task, 1, self.sequential)?;
        }
        self.trained_indices.push(indices.to_vec());
        Ok(Record::from_slice(&[(
            "QF1 Loss",
            RecordValue::Scalar(self.trained_indices.len() as f32),
        )]))
    }

    fn save_params(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)?;
        fs::write(
            path.join("dummy.yaml"),
            serde_yaml::to_string(&self.trained_indices.len())?,
        )?;
        Ok(())
    }

    fn load_params(&mut self, path: &Path) -> Result<()> {
        let s = fs::read_to_string(path.join("dummy.yaml"))?;
        let n: usize = serde_yaml::from_str(&s)?;
        self.trained_indices = vec![vec![]; n];
        Ok(())
    }
}
