//! Agent.
use super::MetaPolicy;
use crate::{
    record::Record,
    replay_buffer::{MultiTaskReplayBuffer, TransitionBatch},
};
use anyhow::Result;
use std::path::Path;

/// A trainable task-conditioned policy with a context encoder.
///
/// The agent holds one latent task variable per task row. Acting through
/// [`MetaPolicy::sample`] requires a single row.
pub trait MetaAgent: MetaPolicy {
    /// Sets the agent to training mode.
    fn train(&mut self);

    /// Sets the agent to evaluation mode.
    fn eval(&mut self);

    /// Returns `true` in training mode.
    fn is_train(&self) -> bool;

    /// Resets the latent state of `num_tasks` rows to the prior and draws
    /// `z` from it.
    fn clear_z(&mut self, num_tasks: usize) -> Result<()>;

    /// Redraws `z` from the current distribution of every row.
    fn sample_z(&mut self) -> Result<()>;

    /// Encodes one context batch per task row and draws `z` from the
    /// resulting posterior.
    fn infer_posterior(&mut self, context: &[TransitionBatch]) -> Result<()>;

    /// Cuts the gradient path of the latent state without changing its value.
    fn detach_z(&mut self) -> Result<()>;

    /// Returns `true` if the context encoder is order-sensitive, in which case
    /// context must be sampled as whole episodes.
    fn embedding_sequential(&self) -> bool;

    /// Summary of the latent distribution of the first task row,
    /// `"Z mean <suffix>"` and `"Z variance <suffix>"`. Empty for point
    /// estimates.
    fn latent_record(&self, suffix: &str) -> Result<Record>;

    /// Performs a meta-update on the given task ids.
    ///
    /// Context is drawn from `context_buffer`, RL batches from `replay_buffer`.
    fn do_training(
        &mut self,
        indices: &[usize],
        replay_buffer: &mut MultiTaskReplayBuffer,
        context_buffer: &mut MultiTaskReplayBuffer,
    ) -> Result<()> {
        self.do_training_with_record(indices, replay_buffer, context_buffer)
            .map(|_| ())
    }

    /// Performs a meta-update and returns training statistics.
    fn do_training_with_record(
        &mut self,
        indices: &[usize],
        replay_buffer: &mut MultiTaskReplayBuffer,
        context_buffer: &mut MultiTaskReplayBuffer,
    ) -> Result<Record>;

    /// Saves the parameters of the agent in the given directory.
    fn save_params(&self, path: &Path) -> Result<()>;

    /// Loads the parameters of the agent from the given directory.
    fn load_params(&mut self, path: &Path) -> Result<()>;
}
