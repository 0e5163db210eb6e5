//! Environment.
use crate::record::Record;
use anyhow::Result;

/// Outcome of an environment step.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    /// Observation after the step.
    pub obs: Vec<f32>,

    /// Reward.
    pub reward: f32,

    /// `true` if the episode terminated at this step.
    pub terminal: bool,
}

/// A family of MDPs sharing observation and action spaces.
///
/// The active task is switched with [`TaskEnv::reset_task`]; [`TaskEnv::reset`]
/// and [`TaskEnv::step`] act on the active task.
pub trait TaskEnv {
    /// Configurations.
    type Config: Clone;

    /// Builds an environment with a given random seed.
    fn build(config: &Self::Config, seed: i64) -> Result<Self>
    where
        Self: Sized;

    /// Dimension of observations.
    fn obs_dim(&self) -> usize;

    /// Dimension of actions.
    fn act_dim(&self) -> usize;

    /// Resets the active task and returns the initial observation.
    fn reset(&mut self) -> Result<Vec<f32>>;

    /// Performs an environment step. The record carries environment-specific
    /// information and may be empty.
    fn step(&mut self, act: &[f32]) -> Result<(Step, Record)>;

    /// Ids of all tasks of the family.
    fn all_task_ids(&self) -> Vec<usize>;

    /// Switches the active task.
    fn reset_task(&mut self, task: usize) -> Result<()>;
}
