//! 2-D point navigating to a goal on the unit half circle.
use crate::{error::PearlError, record::Record, Step, TaskEnv};
use anyhow::Result;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::{
    f32::consts::PI,
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`PointRobotEnv`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct PointRobotConfig {
    /// Number of tasks. Each task has its own goal.
    pub n_tasks: usize,

    /// Seed of the goal positions.
    pub goal_seed: u64,

    /// Displacement per step for an action of magnitude one.
    pub action_scale: f32,
}

impl Default for PointRobotConfig {
    fn default() -> Self {
        Self {
            n_tasks: 2,
            goal_seed: 1337,
            action_scale: 0.1,
        }
    }
}

impl PointRobotConfig {
    /// Sets the number of tasks.
    pub fn n_tasks(mut self, v: usize) -> Self {
        self.n_tasks = v;
        self
    }

    /// Sets the seed of the goal positions.
    pub fn goal_seed(mut self, v: u64) -> Self {
        self.goal_seed = v;
        self
    }

    /// Sets the action scale.
    pub fn action_scale(mut self, v: f32) -> Self {
        self.action_scale = v;
        self
    }

    /// Loads the configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let rdr = BufReader::new(File::open(path)?);
        Ok(serde_yaml::from_reader(rdr)?)
    }

    /// Saves the configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

/// A point in the plane starting at the origin; the reward is the negative
/// distance to the goal of the active task. Episodes never terminate.
pub struct PointRobotEnv {
    goals: Vec<[f32; 2]>,
    goal: [f32; 2],
    state: [f32; 2],
    action_scale: f32,
}

impl PointRobotEnv {
    /// Goal of the active task.
    pub fn goal(&self) -> [f32; 2] {
        self.goal
    }

    /// Current position.
    pub fn state(&self) -> [f32; 2] {
        self.state
    }
}

impl TaskEnv for PointRobotEnv {
    type Config = PointRobotConfig;

    fn build(config: &Self::Config, _seed: i64) -> Result<Self> {
        if config.n_tasks == 0 {
            return Err(PearlError::InvalidConfig("n_tasks must be positive".into()).into());
        }
        let mut rng = StdRng::seed_from_u64(config.goal_seed);
        let goals = (0..config.n_tasks)
            .map(|_| {
                let angle = rng.gen_range(0.0..PI);
                [angle.cos(), angle.sin()]
            })
            .collect::<Vec<_>>();
        let goal = goals[0];
        Ok(Self {
            goals,
            goal,
            state: [0.0, 0.0],
            action_scale: config.action_scale,
        })
    }

    fn obs_dim(&self) -> usize {
        2
    }

    fn act_dim(&self) -> usize {
        2
    }

    fn reset(&mut self) -> Result<Vec<f32>> {
        self.state = [0.0, 0.0];
        Ok(self.state.to_vec())
    }

    fn step(&mut self, act: &[f32]) -> Result<(Step, Record)> {
        if act.len() != 2 {
            return Err(PearlError::InvalidConfig(format!(
                "expected a 2-dimensional action, got {}",
                act.len()
            ))
            .into());
        }
        for (s, a) in self.state.iter_mut().zip(act.iter()) {
            *s += self.action_scale * a.clamp(-1.0, 1.0);
        }
        let dx = self.state[0] - self.goal[0];
        let dy = self.state[1] - self.goal[1];
        let step = Step {
            obs: self.state.to_vec(),
            reward: -(dx * dx + dy * dy).sqrt(),
            terminal: false,
        };
        Ok((step, Record::empty()))
    }

    fn all_task_ids(&self) -> Vec<usize> {
        (0..self.goals.len()).collect()
    }

    fn reset_task(&mut self, task: usize) -> Result<()> {
        self.goal = *self.goals.get(task).ok_or(PearlError::UnknownTask(task))?;
        self.reset()?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_goals_on_half_circle() -> Result<()> {
        let config = PointRobotConfig::default().n_tasks(5);
        let mut env = PointRobotEnv::build(&config, 0)?;
        assert_eq!(env.all_task_ids(), vec![0, 1, 2, 3, 4]);
        for task in env.all_task_ids() {
            env.reset_task(task)?;
            let [x, y] = env.goal();
            assert!(((x * x + y * y).sqrt() - 1.0).abs() < 1e-5);
            assert!(y >= 0.0);
        }
        assert!(env.reset_task(5).is_err());
        Ok(())
    }

    #[test]
    fn test_step_towards_goal() -> Result<()> {
        let config = PointRobotConfig::default();
        let mut env = PointRobotEnv::build(&config, 0)?;
        env.reset_task(1)?;
        env.reset()?;
        let [gx, gy] = env.goal();
        let (step0, _) = env.step(&[gx, gy])?;
        let (step1, _) = env.step(&[gx, gy])?;
        assert!(step1.reward > step0.reward);
        assert!(!step1.terminal);
        // Actions are clipped to [-1, 1].
        env.reset()?;
        let (step, _) = env.step(&[5.0, -5.0])?;
        assert_eq!(step.obs, vec![0.1, -0.1]);
        Ok(())
    }
}
