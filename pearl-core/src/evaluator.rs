//! Evaluation of a task-conditioned agent under three context regimes.
mod config;
use crate::{
    error::PearlError,
    record::{Record, RecordValue},
    replay_buffer::{MultiTaskReplayBuffer, Path as Rollout, TransitionStoreConfig},
    sampler::{rollout, sample_z_from_posterior},
    EmbeddingSource, MetaAgent, TaskEnv,
};
use anyhow::Result;
pub use config::MetaEvaluatorConfig;
use log::{debug, info};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{fs, fs::File, io::BufWriter, path::Path};

/// Number of final online rollouts averaged into the score of a task.
const NUM_SCORED_ROLLOUTS: usize = 5;

/// Returns of a task averaged over evaluation runs.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskEvaluation {
    /// Task id.
    pub task: usize,

    /// Mean return of the prior regime.
    pub prior_return: f32,

    /// Mean return of the fixed-posterior regime.
    pub posterior_return: f32,

    /// Return of the n-th rollout of the online-adaptation regime.
    pub online_returns: Vec<f32>,
}

impl TaskEvaluation {
    /// Mean return of the last five online rollouts.
    pub fn score(&self) -> f32 {
        let n = self.online_returns.len().min(NUM_SCORED_ROLLOUTS);
        let tail = &self.online_returns[self.online_returns.len() - n..];
        tail.iter().sum::<f32>() / n.max(1) as f32
    }
}

fn mean(vs: &[f32]) -> f32 {
    vs.iter().sum::<f32>() / vs.len().max(1) as f32
}

/// Evaluates an agent on training and evaluation tasks.
///
/// Every evaluated task runs `num_evals` times through:
///
/// 1. the prior regime, `num_prior_paths` rollouts with `z` from the prior,
/// 2. the fixed-posterior regime, where a context is assembled according to
///    [`MetaEvaluatorConfig::eval_embedding_source`], `z` is drawn once from
///    the posterior, and `num_posterior_paths` rollouts follow,
/// 3. the online-adaptation regime, where the context store of the task is
///    cleared and each of the `num_online_paths` rollouts is preceded by a
///    posterior sample from the store and followed by adding the rollout to it.
///
/// The score of a task is the mean return of its last five online rollouts.
pub struct MetaEvaluator {
    config: MetaEvaluatorConfig,
    context_buffer: MultiTaskReplayBuffer,
    rng: StdRng,
}

impl MetaEvaluator {
    /// Builds an evaluator with a context store for each of `tasks`.
    pub fn build(
        config: &MetaEvaluatorConfig,
        tasks: &[usize],
        obs_dim: usize,
        act_dim: usize,
    ) -> Result<Self> {
        if config.num_online_paths == 0 || config.num_evals == 0 {
            return Err(PearlError::InvalidConfig(
                "num_online_paths and num_evals must be positive".into(),
            )
            .into());
        }
        let store_config = TransitionStoreConfig::default()
            .capacity(config.replay_buffer_size)
            .obs_dim(obs_dim)
            .act_dim(act_dim)
            .seed(config.seed);
        Ok(Self {
            config: config.clone(),
            context_buffer: MultiTaskReplayBuffer::build(&store_config, tasks)?,
            rng: StdRng::seed_from_u64(config.seed),
        })
    }

    /// Context stores of the evaluator.
    pub fn context_buffer(&mut self) -> &mut MultiTaskReplayBuffer {
        &mut self.context_buffer
    }

    fn collect_prior_context<E, A>(
        &mut self,
        env: &mut E,
        agent: &mut A,
        task: usize,
        num_steps: usize,
    ) -> Result<()>
    where
        E: TaskEnv,
        A: MetaAgent,
    {
        let mut n = 0;
        while n < num_steps {
            agent.clear_z(1)?;
            let path = rollout(env, agent, task, self.config.max_path_length, false)?;
            n += path.len().max(1);
            self.context_buffer.add_path(task, &path)?;
        }
        Ok(())
    }

    fn collect_posterior_context<E, A>(
        &mut self,
        env: &mut E,
        agent: &mut A,
        task: usize,
        num_steps: usize,
    ) -> Result<()>
    where
        E: TaskEnv,
        A: MetaAgent,
    {
        let mut n = 0;
        while n < num_steps {
            let batch_size = self.config.embedding_batch_size;
            sample_z_from_posterior(agent, &mut self.context_buffer, task, batch_size)?;
            let path = rollout(env, agent, task, self.config.max_path_length, false)?;
            n += path.len().max(1);
            self.context_buffer.add_path(task, &path)?;
        }
        Ok(())
    }

    /// Assembles the fixed context of a task and draws `z` from its posterior.
    fn sample_fixed_posterior<E, A>(
        &mut self,
        env: &mut E,
        agent: &mut A,
        task: usize,
        train_context: Option<&mut MultiTaskReplayBuffer>,
    ) -> Result<()>
    where
        E: TaskEnv,
        A: MetaAgent,
    {
        let batch_size = self.config.embedding_batch_size;
        let num_steps = self.config.num_steps_per_task;
        match self.config.eval_embedding_source {
            EmbeddingSource::InitialPool => {
                return match train_context {
                    Some(buffer) => sample_z_from_posterior(agent, buffer, task, batch_size),
                    None => {
                        sample_z_from_posterior(agent, &mut self.context_buffer, task, batch_size)
                    }
                };
            }
            EmbeddingSource::Online => {
                self.context_buffer.clear(task)?;
            }
            EmbeddingSource::OnlineExplorationTrajectories => {
                self.context_buffer.clear(task)?;
                self.collect_prior_context(env, agent, task, num_steps)?;
            }
            EmbeddingSource::OnlineOnPolicyTrajectories => {
                self.context_buffer.clear(task)?;
                self.collect_prior_context(env, agent, task, num_steps / 2)?;
                self.collect_posterior_context(env, agent, task, num_steps - num_steps / 2)?;
            }
        }
        sample_z_from_posterior(agent, &mut self.context_buffer, task, batch_size)
    }

    fn dump_paths(
        model_dir: &Path,
        task: usize,
        epoch: usize,
        run: usize,
        paths: &[Rollout],
    ) -> Result<()> {
        let dir = model_dir.join("eval_trajectories");
        fs::create_dir_all(&dir)?;
        let file = File::create(dir.join(format!("task{}-epoch{}-run{}.json", task, epoch, run)))?;
        serde_json::to_writer(BufWriter::new(file), paths)?;
        Ok(())
    }

    /// Evaluates a single task over `num_evals` runs.
    #[allow(clippy::too_many_arguments)]
    pub fn evaluate_task<E, A>(
        &mut self,
        env: &mut E,
        agent: &mut A,
        task: usize,
        mut train_context: Option<&mut MultiTaskReplayBuffer>,
        epoch: usize,
        model_dir: Option<&Path>,
    ) -> Result<TaskEvaluation>
    where
        E: TaskEnv,
        A: MetaAgent,
    {
        let det = self.config.eval_deterministic;
        let max_len = self.config.max_path_length;
        let batch_size = self.config.embedding_batch_size;
        let mut prior = vec![];
        let mut posterior = vec![];
        let mut online = vec![0f32; self.config.num_online_paths];

        for run in 0..self.config.num_evals {
            env.reset_task(task)?;
            let mut paths = vec![];

            for _ in 0..self.config.num_prior_paths {
                agent.clear_z(1)?;
                let path = rollout(env, agent, task, max_len, det)?;
                prior.push(path.returns());
                paths.push(path);
            }

            self.sample_fixed_posterior(env, agent, task, train_context.as_deref_mut())?;
            for _ in 0..self.config.num_posterior_paths {
                let path = rollout(env, agent, task, max_len, det)?;
                posterior.push(path.returns());
                paths.push(path);
            }

            self.context_buffer.clear(task)?;
            for ret in online.iter_mut() {
                sample_z_from_posterior(agent, &mut self.context_buffer, task, batch_size)?;
                let path = rollout(env, agent, task, max_len, det)?;
                self.context_buffer.add_path(task, &path)?;
                *ret += path.returns() / self.config.num_evals as f32;
                paths.push(path);
            }

            if let (true, Some(dir)) = (self.config.dump_eval_paths, model_dir) {
                Self::dump_paths(dir, task, epoch, run, &paths)?;
            }
        }

        let result = TaskEvaluation {
            task,
            prior_return: mean(&prior),
            posterior_return: mean(&posterior),
            online_returns: online,
        };
        debug!("Evaluated task {}: score {}", task, result.score());
        Ok(result)
    }

    fn summarize(evals: &[TaskEvaluation], split: &str) -> Record {
        let scores = evals.iter().map(|e| e.score()).collect::<Vec<_>>();
        let prior = evals.iter().map(|e| e.prior_return).collect::<Vec<_>>();
        let posterior = evals.iter().map(|e| e.posterior_return).collect::<Vec<_>>();
        let n = evals.first().map(|e| e.online_returns.len()).unwrap_or(0);
        let curve = (0..n)
            .map(|i| mean(&evals.iter().map(|e| e.online_returns[i]).collect::<Vec<_>>()))
            .collect::<Vec<_>>();
        Record::from_slice(&[
            (format!("AverageReturn_all_{}", split), RecordValue::Scalar(mean(&scores))),
            (format!("PriorReturn_{}", split), RecordValue::Scalar(mean(&prior))),
            (format!("PosteriorReturn_{}", split), RecordValue::Scalar(mean(&posterior))),
            (format!("OnlineReturns_{}", split), RecordValue::Array1(curve)),
        ])
    }

    /// Evaluates the agent on a sample of `train_tasks` and on all `eval_tasks`.
    ///
    /// Context of training tasks under the `initial_pool` source is taken
    /// from `train_context`.
    #[allow(clippy::too_many_arguments)]
    pub fn evaluate<E, A>(
        &mut self,
        env: &mut E,
        agent: &mut A,
        train_context: &mut MultiTaskReplayBuffer,
        train_tasks: &[usize],
        eval_tasks: &[usize],
        epoch: usize,
        model_dir: Option<&Path>,
    ) -> Result<Record>
    where
        E: TaskEnv,
        A: MetaAgent,
    {
        let mut record = Record::empty();

        let n_train = self.config.num_train_tasks_eval.unwrap_or(eval_tasks.len());
        if !train_tasks.is_empty() && n_train > 0 {
            let indices = (0..n_train)
                .map(|_| train_tasks[self.rng.gen_range(0..train_tasks.len())])
                .collect::<Vec<_>>();
            let mut evals = vec![];
            for &task in indices.iter() {
                evals.push(self.evaluate_task(
                    env,
                    agent,
                    task,
                    Some(&mut *train_context),
                    epoch,
                    model_dir,
                )?);
            }
            record.merge_inplace(Self::summarize(&evals, "train_tasks"));
        }

        if !eval_tasks.is_empty() {
            let mut evals = vec![];
            for &task in eval_tasks.iter() {
                evals.push(self.evaluate_task(env, agent, task, None, epoch, model_dir)?);
            }
            record.merge_inplace(Self::summarize(&evals, "test_tasks"));
            record.merge_inplace(agent.latent_record("eval")?);
        }

        info!(
            "Evaluation at epoch {}: train {:?}, test {:?}",
            epoch,
            record.get_scalar("AverageReturn_all_train_tasks").ok(),
            record.get_scalar("AverageReturn_all_test_tasks").ok()
        );
        Ok(record)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        dummy::DummyAgent,
        env::{PointRobotConfig, PointRobotEnv},
    };
    use tempdir::TempDir;

    fn setup(source: EmbeddingSource) -> Result<(PointRobotEnv, MetaEvaluator)> {
        let env = PointRobotEnv::build(&PointRobotConfig::default().n_tasks(3), 0)?;
        let config = MetaEvaluatorConfig::default()
            .num_evals(2)
            .num_online_paths(7)
            .num_posterior_paths(2)
            .max_path_length(5)
            .num_steps_per_task(10)
            .embedding_batch_size(8)
            .eval_embedding_source(source)
            .dump_eval_paths(true);
        let evaluator = MetaEvaluator::build(&config, &[0, 1, 2], 2, 2)?;
        Ok((env, evaluator))
    }

    #[test]
    fn test_score_uses_last_five() {
        let e = TaskEvaluation {
            task: 0,
            prior_return: 0.0,
            posterior_return: 0.0,
            online_returns: vec![-100.0, -100.0, -1.0, -2.0, -3.0, -4.0, -5.0],
        };
        assert_eq!(e.score(), -3.0);
    }

    #[test]
    fn test_online_regime() -> Result<()> {
        let (mut env, mut evaluator) = setup(EmbeddingSource::Online)?;
        let mut agent = DummyAgent::new(2);
        let result = evaluator.evaluate_task(&mut env, &mut agent, 2, None, 0, None)?;
        assert_eq!(result.online_returns.len(), 7);
        // The first online rollout of each run uses the prior, the other six
        // a posterior from the store.
        assert_eq!(agent.n_infer_posterior, 2 * 6);
        assert_eq!(evaluator.context_buffer().size(2)?, 7 * 5);
        Ok(())
    }

    #[test]
    fn test_records_and_dumps() -> Result<()> {
        let dir = TempDir::new("pearl_eval")?;
        let (mut env, mut evaluator) = setup(EmbeddingSource::OnlineOnPolicyTrajectories)?;
        let mut agent = DummyAgent::new(2);
        let store_config = TransitionStoreConfig::default().capacity(100).obs_dim(2).act_dim(2);
        let mut train_context = MultiTaskReplayBuffer::build(&store_config, &[0, 1])?;

        let record = evaluator.evaluate(
            &mut env,
            &mut agent,
            &mut train_context,
            &[0, 1],
            &[2],
            3,
            Some(dir.path()),
        )?;
        for key in [
            "AverageReturn_all_train_tasks",
            "AverageReturn_all_test_tasks",
            "PriorReturn_test_tasks",
            "PosteriorReturn_train_tasks",
        ] {
            assert!(record.get_scalar(key)?.is_finite());
        }
        assert_eq!(record.get_array1("OnlineReturns_test_tasks")?.len(), 7);
        let dump = dir.path().join("eval_trajectories").join("task2-epoch3-run1.json");
        let paths: Vec<Rollout> = serde_json::from_reader(File::open(dump)?)?;
        assert_eq!(paths.len(), 1 + 2 + 7);
        Ok(())
    }
}
