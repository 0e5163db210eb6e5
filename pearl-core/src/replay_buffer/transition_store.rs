//! Fixed-capacity circular store of single-step transitions.
use super::{TransitionBatch, TransitionStoreConfig};
use crate::error::PearlError;
use anyhow::Result;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::collections::VecDeque;

/// A single-step transition.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Observation.
    pub obs: Vec<f32>,

    /// Action.
    pub act: Vec<f32>,

    /// Reward.
    pub reward: f32,

    /// Next observation.
    pub next_obs: Vec<f32>,

    /// Terminal flag.
    pub terminal: bool,
}

/// A circular buffer of transitions of a single task.
///
/// When the store is full, a new transition overwrites the oldest one.
/// Completed episodes are tracked as `(start, len)` spans in insertion order.
/// Overwriting the first row of the oldest completed episode drops that
/// episode, so every tracked span refers to rows still held by the store.
/// An open episode longer than the capacity is trimmed from the front.
pub struct TransitionStore {
    task: usize,
    capacity: usize,
    obs_dim: usize,
    act_dim: usize,
    top: usize,
    size: usize,
    obs: Vec<f32>,
    act: Vec<f32>,
    reward: Vec<f32>,
    next_obs: Vec<f32>,
    terminal: Vec<i8>,
    episodes: VecDeque<(usize, usize)>,
    cur_start: usize,
    cur_len: usize,
    rng: StdRng,
}

impl TransitionStore {
    /// Builds a store for the given task.
    ///
    /// The random generator is seeded with `config.seed + task`.
    pub fn build(config: &TransitionStoreConfig, task: usize) -> Result<Self> {
        if config.capacity == 0 {
            return Err(PearlError::InvalidConfig("capacity must be positive".into()).into());
        }
        let capacity = config.capacity;
        Ok(Self {
            task,
            capacity,
            obs_dim: config.obs_dim,
            act_dim: config.act_dim,
            top: 0,
            size: 0,
            obs: vec![0.; capacity * config.obs_dim],
            act: vec![0.; capacity * config.act_dim],
            reward: vec![0.; capacity],
            next_obs: vec![0.; capacity * config.obs_dim],
            terminal: vec![0; capacity],
            episodes: VecDeque::new(),
            cur_start: 0,
            cur_len: 0,
            rng: StdRng::seed_from_u64(config.seed.wrapping_add(task as u64)),
        })
    }

    /// Task id of the store.
    pub fn task(&self) -> usize {
        self.task
    }

    /// Capacity of the store.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of transitions held by the store.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Start rows of the completed episodes, oldest first.
    pub fn episode_starts(&self) -> Vec<usize> {
        self.episodes.iter().map(|(s, _)| *s).collect()
    }

    /// Number of completed episodes.
    pub fn num_episodes(&self) -> usize {
        self.episodes.len()
    }

    fn evict_oldest(&mut self) {
        // The row at `top` is the oldest one when the store is full.
        if let Some(&(start, _)) = self.episodes.front() {
            if start == self.top {
                self.episodes.pop_front();
                return;
            }
        }
        if self.cur_len > 0 && self.cur_start == self.top {
            self.cur_start = (self.cur_start + 1) % self.capacity;
            self.cur_len -= 1;
        }
    }

    /// Writes a transition at the cursor and advances it.
    pub fn add(&mut self, tr: &Transition) -> Result<()> {
        if tr.obs.len() != self.obs_dim
            || tr.next_obs.len() != self.obs_dim
            || tr.act.len() != self.act_dim
        {
            return Err(PearlError::InvalidConfig(format!(
                "transition dims (obs {}, act {}) do not match store dims (obs {}, act {})",
                tr.obs.len(),
                tr.act.len(),
                self.obs_dim,
                self.act_dim
            ))
            .into());
        }

        if self.size == self.capacity {
            self.evict_oldest();
        }

        let i = self.top;
        let (od, ad) = (self.obs_dim, self.act_dim);
        self.obs[i * od..(i + 1) * od].copy_from_slice(&tr.obs);
        self.act[i * ad..(i + 1) * ad].copy_from_slice(&tr.act);
        self.next_obs[i * od..(i + 1) * od].copy_from_slice(&tr.next_obs);
        self.reward[i] = tr.reward;
        self.terminal[i] = tr.terminal as i8;

        if self.cur_len == 0 {
            self.cur_start = i;
        }
        self.cur_len += 1;

        self.top = (self.top + 1) % self.capacity;
        self.size = (self.size + 1).min(self.capacity);
        Ok(())
    }

    /// Closes the open episode. Does nothing if no transition was added since
    /// the last boundary.
    pub fn mark_episode_boundary(&mut self) {
        if self.cur_len > 0 {
            self.episodes.push_back((self.cur_start, self.cur_len));
            self.cur_len = 0;
        }
    }

    fn gather(&self, ixs: Vec<usize>) -> TransitionBatch {
        let (od, ad) = (self.obs_dim, self.act_dim);
        let mut batch = TransitionBatch::empty(od, ad);
        for &i in ixs.iter() {
            batch.obs.extend_from_slice(&self.obs[i * od..(i + 1) * od]);
            batch.act.extend_from_slice(&self.act[i * ad..(i + 1) * ad]);
            batch.next_obs.extend_from_slice(&self.next_obs[i * od..(i + 1) * od]);
            batch.reward.push(self.reward[i]);
            batch.terminal.push(self.terminal[i]);
        }
        batch.ix_sample = ixs;
        batch
    }

    /// Draws `k` rows uniformly from `[0, size)` with replacement.
    pub fn sample_random(&mut self, k: usize) -> Result<TransitionBatch> {
        if self.size == 0 {
            return Err(PearlError::InsufficientData {
                task: self.task,
                requested: k,
                available: 0,
            }
            .into());
        }
        let ixs = (0..k)
            .map(|_| self.rng.gen_range(0..self.size))
            .collect::<Vec<_>>();
        Ok(self.gather(ixs))
    }

    /// Episodes legal for sequential sampling.
    ///
    /// Episodes wrapping around the end of the storage are excluded, as is
    /// the most recent episode when an older one is available. A single
    /// tracked episode is always legal.
    fn sequential_candidates(&self) -> Vec<(usize, usize)> {
        if self.episodes.len() == 1 {
            return vec![self.episodes[0]];
        }
        let last = self.episodes.len().saturating_sub(1);
        let non_wrapping = self
            .episodes
            .iter()
            .enumerate()
            .filter(|(_, (start, len))| start + len <= self.capacity)
            .map(|(i, ep)| (i, *ep))
            .collect::<Vec<_>>();
        let older = non_wrapping
            .iter()
            .filter(|(i, _)| *i != last)
            .map(|(_, ep)| *ep)
            .collect::<Vec<_>>();
        if older.is_empty() {
            non_wrapping.into_iter().map(|(_, ep)| ep).collect()
        } else {
            older
        }
    }

    /// Concatenates uniformly drawn whole episodes until `k` transitions are
    /// collected, then truncates to exactly `k`.
    pub fn sample_sequential(&mut self, k: usize) -> Result<TransitionBatch> {
        let candidates = self.sequential_candidates();
        if candidates.is_empty() {
            return Err(PearlError::NoCompleteEpisode { task: self.task }.into());
        }

        let mut ixs = Vec::with_capacity(k);
        while ixs.len() < k {
            let (start, len) = candidates[self.rng.gen_range(0..candidates.len())];
            ixs.extend((0..len).map(|j| (start + j) % self.capacity));
        }
        ixs.truncate(k);
        Ok(self.gather(ixs))
    }

    /// Removes all transitions and episodes.
    pub fn clear(&mut self) {
        self.top = 0;
        self.size = 0;
        self.episodes.clear();
        self.cur_start = 0;
        self.cur_len = 0;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn store(capacity: usize) -> TransitionStore {
        let config = TransitionStoreConfig::default()
            .capacity(capacity)
            .obs_dim(1)
            .act_dim(1)
            .seed(0);
        TransitionStore::build(&config, 0).unwrap()
    }

    fn tr(v: f32, terminal: bool) -> Transition {
        Transition {
            obs: vec![v],
            act: vec![-v],
            reward: v,
            next_obs: vec![v + 1.0],
            terminal,
        }
    }

    fn fill(s: &mut TransitionStore, n: usize, ep_len: usize) {
        for i in 0..n {
            let terminal = (i + 1) % ep_len == 0;
            s.add(&tr(i as f32, terminal)).unwrap();
            if terminal {
                s.mark_episode_boundary();
            }
        }
    }

    #[test]
    fn test_size_below_capacity() {
        let mut s = store(100);
        for n in 1..=100 {
            s.add(&tr(n as f32, false)).unwrap();
            assert_eq!(s.size(), n);
        }
    }

    #[test]
    fn test_eviction_prunes_boundaries() {
        let mut s = store(100);
        fill(&mut s, 150, 10);
        assert_eq!(s.size(), 100);
        // Episodes starting at global steps 50, 60, ..., 140 survive.
        assert_eq!(s.num_episodes(), 10);
        assert_eq!(
            s.episode_starts(),
            vec![50, 60, 70, 80, 90, 0, 10, 20, 30, 40]
        );
        // The oldest retained reward is that of global step 50.
        let b = s.sample_random(1000).unwrap();
        assert!(b.reward.iter().all(|r| *r >= 50.0));
    }

    #[test]
    fn test_long_open_episode_is_trimmed() {
        let mut s = store(10);
        fill(&mut s, 25, 1000);
        s.mark_episode_boundary();
        assert_eq!(s.episode_starts(), vec![5]);
        let b = s.sample_sequential(10).unwrap();
        assert_eq!(b.reward, (15..25).map(|v| v as f32).collect::<Vec<_>>());
    }

    #[test]
    fn test_sample_random() {
        let mut s = store(100);
        fill(&mut s, 30, 10);
        let b = s.sample_random(64).unwrap();
        assert_eq!(b.len(), 64);
        assert!(b.ix_sample.iter().all(|&i| i < s.size()));
        assert_eq!(b.obs.len(), 64);
    }

    #[test]
    fn test_sample_random_empty() {
        let mut s = store(10);
        let err = s.sample_random(4).unwrap_err();
        assert_eq!(
            err.downcast_ref::<PearlError>(),
            Some(&PearlError::InsufficientData {
                task: 0,
                requested: 4,
                available: 0
            })
        );
    }

    #[test]
    fn test_sample_sequential_respects_episodes() {
        let mut s = store(100);
        fill(&mut s, 40, 10);
        let b = s.sample_sequential(25).unwrap();
        assert_eq!(b.len(), 25);
        // Each chunk of 10 is one whole episode in order, and the most recent
        // episode (rows 30..40) never appears.
        for chunk in b.ix_sample.chunks(10) {
            assert_eq!(chunk[0] % 10, 0);
            for w in chunk.windows(2) {
                assert_eq!(w[1], w[0] + 1);
            }
            assert!(chunk[0] < 30);
        }
    }

    #[test]
    fn test_sample_sequential_skips_wrapping_episode() {
        let mut s = store(25);
        fill(&mut s, 40, 10);
        // Steps 20..30 occupy rows 20..25 and 0..5, steps 30..40 rows 5..15.
        assert_eq!(s.episode_starts(), vec![20, 5]);
        for _ in 0..20 {
            let b = s.sample_sequential(10).unwrap();
            assert_eq!(b.ix_sample, (5..15).collect::<Vec<_>>());
            assert_eq!(b.reward[0], 30.0);
        }
    }

    #[test]
    fn test_sample_sequential_without_episode() {
        let mut s = store(10);
        s.add(&tr(0.0, false)).unwrap();
        assert!(s.sample_sequential(1).is_err());
        s.mark_episode_boundary();
        assert_eq!(s.sample_sequential(3).unwrap().reward, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_clear() {
        let mut s = store(10);
        fill(&mut s, 10, 5);
        s.clear();
        assert_eq!(s.size(), 0);
        assert_eq!(s.num_episodes(), 0);
        assert!(s.sample_random(1).is_err());
    }
}
