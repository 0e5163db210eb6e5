//! Meta-training loop.
mod collector;
mod config;
use crate::{
    error::PearlError,
    evaluator::MetaEvaluator,
    record::{AggregateRecorder, Record, RecordValue::Scalar},
    replay_buffer::{MultiTaskReplayBuffer, TransitionStoreConfig},
    EmbeddingSource, MetaAgent, TaskEnv,
};
use anyhow::Result;
pub use collector::Collector;
pub use config::MetaTrainerConfig;
use log::info;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{path::PathBuf, time::SystemTime};

/// Offset between the seeds of the RL replay pool and the context pool.
const CONTEXT_SEED_OFFSET: u64 = 10_000;

#[cfg_attr(doc, aquamarine::aquamarine)]
/// Manages the meta-training loop.
///
/// # Training loop
///
/// 0. Build the environment, the RL replay pool and the context pool, each
///    with one store per training task. Save the initial parameters of the
///    agent in `(model_dir)/init`.
/// 1. For each iteration `it`:
///     1. If `it == 0`, collect `num_initial_steps` transitions for every
///        training task with `z` from the prior into both pools.
///     2. Visit `num_tasks_sample` training tasks drawn at random and collect
///        `num_steps_per_task` transitions according to
///        [`MetaTrainerConfig::train_embedding_source`]:
///         * `initial_pool`: posterior sampling into the RL pool only.
///         * `online_exploration_trajectories`: clear the context store of the
///           task, collect with the prior into both pools, then collect with
///           posterior updates into the RL pool only.
///         * `online_on_policy_trajectories`: clear the context store of the
///           task and collect with posterior updates into both pools.
///     3. Perform `num_train_steps_per_itr` meta-updates, each on `meta_batch`
///        task ids drawn with replacement.
///     4. Every `eval_interval` iterations, evaluate the agent with
///        [`MetaEvaluator`] and save its parameters in `(model_dir)/(it)`.
///     5. Store bookkeeping records and flush the recorder.
///
/// ```mermaid
/// graph LR
///     A[MetaAgent]-->|action|B[TaskEnv]
///     B -->|observation, reward|A
///     B -->|transition|C[RL pool]
///     B -->|transition|D[context pool]
///     D -->|context|A
///     C -->|RL batch|A
/// ```
pub struct MetaTrainer<E: TaskEnv> {
    config: MetaTrainerConfig,
    env_config: E::Config,
    train_tasks: Vec<usize>,
    eval_tasks: Vec<usize>,
}

impl<E: TaskEnv> MetaTrainer<E> {
    /// Constructs a trainer.
    pub fn build(
        config: MetaTrainerConfig,
        env_config: E::Config,
        train_tasks: Vec<usize>,
        eval_tasks: Vec<usize>,
    ) -> Result<Self> {
        config.validate()?;
        if train_tasks.is_empty() {
            return Err(PearlError::InvalidConfig("no training task".into()).into());
        }
        Ok(Self {
            config,
            env_config,
            train_tasks,
            eval_tasks,
        })
    }

    fn save_params<A: MetaAgent>(&self, agent: &A, name: &str) -> Result<()> {
        if let Some(model_dir) = &self.config.model_dir {
            let path = PathBuf::from(model_dir).join(name);
            agent.save_params(&path)?;
            info!("Saved the model in {:?}", &path);
        }
        Ok(())
    }

    fn sample_task(&self, rng: &mut StdRng) -> usize {
        self.train_tasks[rng.gen_range(0..self.train_tasks.len())]
    }

    /// Collects data of the visited tasks of an iteration.
    #[allow(clippy::too_many_arguments)]
    fn collect<A: MetaAgent>(
        &self,
        it: usize,
        env: &mut E,
        agent: &mut A,
        collector: &mut Collector,
        replay: &mut MultiTaskReplayBuffer,
        context: &mut MultiTaskReplayBuffer,
        rng: &mut StdRng,
    ) -> Result<()> {
        let c = &self.config;

        if it == 0 {
            info!("Collecting the initial pool of data for train tasks");
            for &task in self.train_tasks.iter() {
                collector.set_task(env, task, replay, context)?;
                collector.collect_data(
                    env,
                    agent,
                    replay,
                    context,
                    c.num_initial_steps,
                    c.max_path_length,
                    None,
                    true,
                )?;
            }
        }

        for _ in 0..c.num_tasks_sample {
            let task = self.sample_task(rng);
            collector.set_task(env, task, replay, context)?;
            let n = c.num_steps_per_task;
            let rate = c.resample_z_rate;
            let update = Some(c.update_post_train);
            match c.train_embedding_source {
                EmbeddingSource::InitialPool => {
                    collector.collect_data(env, agent, replay, context, n, rate, update, false)?;
                }
                EmbeddingSource::OnlineExplorationTrajectories => {
                    context.clear(task)?;
                    collector.collect_data(env, agent, replay, context, n, rate, None, true)?;
                    collector.collect_data(env, agent, replay, context, n, rate, update, false)?;
                }
                EmbeddingSource::OnlineOnPolicyTrajectories => {
                    context.clear(task)?;
                    collector.collect_data(env, agent, replay, context, n, rate, update, true)?;
                }
                EmbeddingSource::Online => {
                    return Err(PearlError::InvalidEmbeddingSource(
                        c.train_embedding_source.to_string(),
                    )
                    .into());
                }
            }
        }
        Ok(())
    }

    /// Trains the agent.
    pub fn train<A: MetaAgent>(
        &mut self,
        agent: &mut A,
        recorder: &mut dyn AggregateRecorder,
        evaluator: &mut MetaEvaluator,
    ) -> Result<()> {
        let c = self.config.clone();
        if agent.embedding_sequential() {
            c.validate_for_sequential_context()?;
        }
        let mut env = E::build(&self.env_config, c.seed as i64)?;
        let mut eval_env = E::build(&self.env_config, c.seed as i64 + 1)?;
        let store_config = TransitionStoreConfig::default()
            .capacity(c.replay_buffer_size)
            .obs_dim(env.obs_dim())
            .act_dim(env.act_dim())
            .seed(c.seed);
        let mut replay = MultiTaskReplayBuffer::build(&store_config, &self.train_tasks)?;
        let mut context = MultiTaskReplayBuffer::build(
            &store_config.clone().seed(c.seed + CONTEXT_SEED_OFFSET),
            &self.train_tasks,
        )?;
        let mut collector = Collector::new(c.max_path_length, c.embedding_batch_size);
        let mut rng = StdRng::seed_from_u64(c.seed);
        let mut n_train_steps_total = 0usize;
        let model_dir = c.model_dir.as_ref().map(PathBuf::from);

        self.save_params(agent, "init")?;

        for it in 0..c.num_iterations {
            info!("Iteration #{}", it);
            let epoch_timer = SystemTime::now();
            agent.train();

            let timer = SystemTime::now();
            self.collect(it, &mut env, agent, &mut collector, &mut replay, &mut context, &mut rng)?;
            let sample_time = timer.elapsed()?.as_secs_f32();

            let timer = SystemTime::now();
            let mut record = Record::empty();
            for step in 0..c.num_train_steps_per_itr {
                let indices = (0..c.meta_batch)
                    .map(|_| self.sample_task(&mut rng))
                    .collect::<Vec<_>>();
                if step == 0 {
                    record = agent.do_training_with_record(&indices, &mut replay, &mut context)?;
                } else {
                    agent.do_training(&indices, &mut replay, &mut context)?;
                }
                n_train_steps_total += 1;
            }
            let train_time = timer.elapsed()?.as_secs_f32();

            let timer = SystemTime::now();
            if it % c.eval_interval == 0 {
                agent.eval();
                let eval_record = evaluator.evaluate(
                    &mut eval_env,
                    agent,
                    &mut context,
                    &self.train_tasks,
                    &self.eval_tasks,
                    it,
                    model_dir.as_deref(),
                )?;
                agent.train();
                record.merge_inplace(eval_record);
                self.save_params(agent, &it.to_string())?;
            }
            let eval_time = timer.elapsed()?.as_secs_f32();

            record.insert("Number of train steps total", Scalar(n_train_steps_total as f32));
            record.insert("Number of env steps total", Scalar(collector.n_env_steps() as f32));
            record.insert("Number of rollouts total", Scalar(collector.n_rollouts() as f32));
            record.insert("Train Time (s)", Scalar(train_time));
            record.insert("Sample Time (s)", Scalar(sample_time));
            record.insert("Eval Time (s)", Scalar(eval_time));
            record.insert("Epoch Time (s)", Scalar(epoch_timer.elapsed()?.as_secs_f32()));
            record.insert("Epoch", Scalar(it as f32));
            recorder.store(record);
            recorder.flush(it as i64);
        }

        Ok(())
    }
}
