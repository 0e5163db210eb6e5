//! A batch of transitions sampled from a single task.

/// A batch of transitions sampled from the store of a single task.
///
/// Observations and actions are stored row-major, i.e., `obs` has
/// `len() * obs_dim` elements.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TransitionBatch {
    /// Observations.
    pub obs: Vec<f32>,

    /// Actions.
    pub act: Vec<f32>,

    /// Rewards.
    pub reward: Vec<f32>,

    /// Next observations.
    pub next_obs: Vec<f32>,

    /// Terminal flags, `1` for terminal transitions.
    pub terminal: Vec<i8>,

    /// Dimension of observations.
    pub obs_dim: usize,

    /// Dimension of actions.
    pub act_dim: usize,

    /// Rows of the store the transitions were taken from.
    pub ix_sample: Vec<usize>,
}

impl TransitionBatch {
    /// Creates an empty batch with the given dimensions.
    pub fn empty(obs_dim: usize, act_dim: usize) -> Self {
        Self {
            obs_dim,
            act_dim,
            ..Default::default()
        }
    }

    /// Number of transitions.
    pub fn len(&self) -> usize {
        self.reward.len()
    }

    /// Returns `true` if the batch has no transitions.
    pub fn is_empty(&self) -> bool {
        self.reward.is_empty()
    }

    /// Width of a context tuple built from this batch.
    pub fn context_dim(&self, use_next_obs: bool) -> usize {
        context_dim(self.obs_dim, self.act_dim, use_next_obs)
    }

    /// Flattens the batch into context tuples `(obs, act, reward[, next_obs])`.
    ///
    /// Terminal flags are not part of the context.
    pub fn to_context(&self, use_next_obs: bool) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.len() * self.context_dim(use_next_obs));
        for i in 0..self.len() {
            out.extend_from_slice(&self.obs[i * self.obs_dim..(i + 1) * self.obs_dim]);
            out.extend_from_slice(&self.act[i * self.act_dim..(i + 1) * self.act_dim]);
            out.push(self.reward[i]);
            if use_next_obs {
                out.extend_from_slice(&self.next_obs[i * self.obs_dim..(i + 1) * self.obs_dim]);
            }
        }
        out
    }

    /// Returns the rows `[start, start + len)` of the batch as a new batch.
    pub fn slice(&self, start: usize, len: usize) -> Self {
        let end = (start + len).min(self.len());
        let (od, ad) = (self.obs_dim, self.act_dim);
        Self {
            obs: self.obs[start * od..end * od].to_vec(),
            act: self.act[start * ad..end * ad].to_vec(),
            reward: self.reward[start..end].to_vec(),
            next_obs: self.next_obs[start * od..end * od].to_vec(),
            terminal: self.terminal[start..end].to_vec(),
            obs_dim: od,
            act_dim: ad,
            ix_sample: self.ix_sample[start..end].to_vec(),
        }
    }
}

/// Width of a context tuple `(obs, act, reward[, next_obs])`.
pub fn context_dim(obs_dim: usize, act_dim: usize, use_next_obs: bool) -> usize {
    if use_next_obs {
        2 * obs_dim + act_dim + 1
    } else {
        obs_dim + act_dim + 1
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn batch() -> TransitionBatch {
        TransitionBatch {
            obs: vec![0.0, 1.0, 2.0, 3.0],
            act: vec![10.0, 11.0],
            reward: vec![-1.0, -2.0],
            next_obs: vec![2.0, 3.0, 4.0, 5.0],
            terminal: vec![0, 1],
            obs_dim: 2,
            act_dim: 1,
            ix_sample: vec![7, 8],
        }
    }

    #[test]
    fn test_context_without_next_obs() {
        let b = batch();
        assert_eq!(b.context_dim(false), 4);
        assert_eq!(
            b.to_context(false),
            vec![0.0, 1.0, 10.0, -1.0, 2.0, 3.0, 11.0, -2.0]
        );
    }

    #[test]
    fn test_context_with_next_obs() {
        let b = batch();
        assert_eq!(b.context_dim(true), 6);
        assert_eq!(
            &b.to_context(true)[..6],
            &[0.0, 1.0, 10.0, -1.0, 2.0, 3.0]
        );
    }

    #[test]
    fn test_slice() {
        let b = batch().slice(1, 5);
        assert_eq!(b.len(), 1);
        assert_eq!(b.obs, vec![2.0, 3.0]);
        assert_eq!(b.terminal, vec![1]);
        assert_eq!(b.ix_sample, vec![8]);
    }
}
