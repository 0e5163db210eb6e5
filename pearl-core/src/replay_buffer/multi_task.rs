//! Task-indexed pool of transition stores.
use super::{Path, Transition, TransitionBatch, TransitionStore, TransitionStoreConfig};
use crate::error::PearlError;
use anyhow::Result;
use std::collections::BTreeMap;

/// One [`TransitionStore`] per task id.
///
/// Data of different tasks are never mixed: every operation addresses a
/// single task, and an unregistered task id is an error.
pub struct MultiTaskReplayBuffer {
    stores: BTreeMap<usize, TransitionStore>,
}

impl MultiTaskReplayBuffer {
    /// Builds a store for each of the given tasks.
    pub fn build(config: &TransitionStoreConfig, tasks: &[usize]) -> Result<Self> {
        let stores = tasks
            .iter()
            .map(|&task| Ok((task, TransitionStore::build(config, task)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        Ok(Self { stores })
    }

    /// Registered task ids.
    pub fn task_ids(&self) -> Vec<usize> {
        self.stores.keys().copied().collect()
    }

    /// Returns the store of a task.
    pub fn store(&self, task: usize) -> Result<&TransitionStore> {
        Ok(self.stores.get(&task).ok_or(PearlError::UnknownTask(task))?)
    }

    fn store_mut(&mut self, task: usize) -> Result<&mut TransitionStore> {
        Ok(self
            .stores
            .get_mut(&task)
            .ok_or(PearlError::UnknownTask(task))?)
    }

    /// Adds a single transition to the store of a task.
    pub fn add_sample(&mut self, task: usize, tr: &Transition) -> Result<()> {
        self.store_mut(task)?.add(tr)
    }

    /// Closes the open episode of a task.
    pub fn terminate_episode(&mut self, task: usize) -> Result<()> {
        self.store_mut(task)?.mark_episode_boundary();
        Ok(())
    }

    /// Adds every transition of a path and closes the episode.
    pub fn add_path(&mut self, task: usize, path: &Path) -> Result<()> {
        let store = self.store_mut(task)?;
        for tr in path.transitions() {
            store.add(&tr)?;
        }
        store.mark_episode_boundary();
        Ok(())
    }

    /// Adds several paths.
    pub fn add_paths(&mut self, task: usize, paths: &[Path]) -> Result<()> {
        for path in paths.iter() {
            self.add_path(task, path)?;
        }
        Ok(())
    }

    /// Samples a batch of the given task, whole episodes in order if
    /// `sequential` is `true`.
    pub fn random_batch(
        &mut self,
        task: usize,
        batch_size: usize,
        sequential: bool,
    ) -> Result<TransitionBatch> {
        let store = self.store_mut(task)?;
        if sequential {
            store.sample_sequential(batch_size)
        } else {
            store.sample_random(batch_size)
        }
    }

    /// Removes all data of a task. The store itself is kept.
    pub fn clear(&mut self, task: usize) -> Result<()> {
        self.store_mut(task)?.clear();
        Ok(())
    }

    /// Number of transitions held for a task.
    pub fn size(&self, task: usize) -> Result<usize> {
        Ok(self.store(task)?.size())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn path(task: usize, len: usize, base: f32) -> Path {
        let mut p = Path::new(task);
        for i in 0..len {
            let v = base + i as f32;
            p.push(Transition {
                obs: vec![v, v],
                act: vec![v],
                reward: v,
                next_obs: vec![v + 1.0, v + 1.0],
                terminal: i + 1 == len,
            });
        }
        p
    }

    fn pool(seed: u64) -> MultiTaskReplayBuffer {
        let config = TransitionStoreConfig::default()
            .capacity(1000)
            .obs_dim(2)
            .act_dim(1)
            .seed(seed);
        MultiTaskReplayBuffer::build(&config, &[0, 1]).unwrap()
    }

    #[test]
    fn test_tasks_are_isolated() -> Result<()> {
        let mut buf = pool(0);
        buf.add_path(0, &path(0, 10, 0.0))?;
        buf.add_path(1, &path(1, 10, 100.0))?;
        assert_eq!(buf.size(0)?, 10);
        assert_eq!(buf.size(1)?, 10);

        let b0 = buf.random_batch(0, 50, false)?;
        let b1 = buf.random_batch(1, 50, true)?;
        assert!(b0.reward.iter().all(|r| *r < 10.0));
        assert!(b1.reward.iter().all(|r| *r >= 100.0));

        buf.clear(0)?;
        assert_eq!(buf.size(0)?, 0);
        assert_eq!(buf.size(1)?, 10);
        Ok(())
    }

    #[test]
    fn test_unknown_task() {
        let mut buf = pool(0);
        let err = buf.random_batch(7, 1, false).unwrap_err();
        assert_eq!(
            err.downcast_ref::<PearlError>(),
            Some(&PearlError::UnknownTask(7))
        );
        assert!(buf.size(7).is_err());
    }

    #[test]
    fn test_pools_sample_independently() -> Result<()> {
        let mut rl = pool(1);
        let mut ctx = pool(2);
        for buf in [&mut rl, &mut ctx] {
            for k in 0..10 {
                buf.add_path(0, &path(0, 20, 20.0 * k as f32))?;
            }
        }
        let a = rl.random_batch(0, 64, false)?.ix_sample;
        let b = ctx.random_batch(0, 64, false)?.ix_sample;
        assert_eq!(a.len(), 64);
        assert_eq!(b.len(), 64);
        assert_ne!(a, b);
        Ok(())
    }
}
