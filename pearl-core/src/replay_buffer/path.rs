//! Rollouts.
use super::Transition;
use serde::{Deserialize, Serialize};

/// A rollout of a single episode (possibly truncated at the maximum path length).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Path {
    /// Task the rollout was collected on.
    pub task: usize,

    /// Observations.
    pub observations: Vec<Vec<f32>>,

    /// Actions.
    pub actions: Vec<Vec<f32>>,

    /// Rewards.
    pub rewards: Vec<f32>,

    /// Next observations.
    pub next_observations: Vec<Vec<f32>>,

    /// Terminal flags.
    pub terminals: Vec<bool>,
}

impl Path {
    /// Creates an empty path for the given task.
    pub fn new(task: usize) -> Self {
        Self {
            task,
            ..Default::default()
        }
    }

    /// Appends a transition.
    pub fn push(&mut self, tr: Transition) {
        self.observations.push(tr.obs);
        self.actions.push(tr.act);
        self.rewards.push(tr.reward);
        self.next_observations.push(tr.next_obs);
        self.terminals.push(tr.terminal);
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    /// Returns `true` if the path has no steps.
    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    /// Undiscounted return.
    pub fn returns(&self) -> f32 {
        self.rewards.iter().sum()
    }

    /// Iterates over the transitions of the path.
    pub fn transitions(&self) -> impl Iterator<Item = Transition> + '_ {
        (0..self.len()).map(move |i| Transition {
            obs: self.observations[i].clone(),
            act: self.actions[i].clone(),
            reward: self.rewards[i],
            next_obs: self.next_observations[i].clone(),
            terminal: self.terminals[i],
        })
    }
}
