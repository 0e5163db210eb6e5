use anyhow::Result;
use clap::Parser;
use log::info;
use pearl_candle_agent::{
    encoder::{EncoderConfig, EncoderKind},
    mlp::MlpConfig,
    opt::OptimizerConfig,
    policy::PolicyConfig,
    sac::TwinCriticConfig,
    PearlAgentConfig, PearlSac, PearlSacConfig,
};
use pearl_core::{
    env::{PointRobotConfig, PointRobotEnv},
    EmbeddingSource, MetaAgent, MetaEvaluator, MetaEvaluatorConfig, MetaTrainer,
    MetaTrainerConfig, TaskEnv,
};
use pearl_tensorboard::TensorboardRecorder;
use std::path::Path;

const DIM_OBS: usize = 2;
const DIM_ACT: usize = 2;
const LATENT_DIM: usize = 5;
const LR: f64 = 3e-4;
const MAX_PATH_LENGTH: usize = 20;
const MODEL_DIR: &str = "./pearl/examples/model/pearl_point_robot";

/// Meta-train/eval a PEARL agent on point robot navigation tasks
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Evaluate a trained agent, not train
    #[arg(short, long, default_value_t = false)]
    eval: bool,

    /// Use the recurrent context encoder
    #[arg(short, long, default_value_t = false)]
    recurrent: bool,

    /// Number of training iterations
    #[arg(long, default_value_t = 100)]
    num_iterations: usize,

    /// Number of training tasks; as many tasks are held out for evaluation
    #[arg(long, default_value_t = 40)]
    num_train_tasks: usize,

    /// Directory of snapshots and logs
    #[arg(long, default_value_t = MODEL_DIR.to_string())]
    model_dir: String,
}

fn create_agent(recurrent: bool) -> Result<PearlSac> {
    let encoder_config = match recurrent {
        true => EncoderConfig::default()
            .units(vec![200, 200])
            .kind(EncoderKind::Recurrent { hidden_dim: 200 }),
        false => EncoderConfig::default().units(vec![200, 200, 200]),
    };
    let agent_config = PearlAgentConfig::new(DIM_OBS, DIM_ACT)
        .latent_dim(LATENT_DIM)
        .encoder_config(encoder_config)
        .policy_config(PolicyConfig::default().units(vec![300, 300, 300]));
    let critic_config = TwinCriticConfig::default()
        .opt_config(OptimizerConfig::default().learning_rate(LR))
        .q_config(MlpConfig::new(0, vec![300, 300, 300], 1, false));
    let config = PearlSacConfig::default()
        .agent_config(agent_config)
        .critic_config(critic_config)
        .policy_opt_config(OptimizerConfig::default().learning_rate(LR))
        .context_opt_config(OptimizerConfig::default().learning_rate(LR))
        .batch_size(256)
        .embedding_batch_size(64)
        .embedding_mini_batch_size(64)
        .reward_scale(5.0)
        .kl_lambda(0.1);
    PearlSac::build(config)
}

fn trainer_config(num_iterations: usize, model_dir: &str) -> MetaTrainerConfig {
    MetaTrainerConfig::default()
        .num_iterations(num_iterations)
        .num_train_steps_per_itr(1000)
        .num_initial_steps(1000)
        .num_tasks_sample(5)
        .num_steps_per_task(400)
        .meta_batch(16)
        .embedding_batch_size(64)
        .max_path_length(MAX_PATH_LENGTH)
        .train_embedding_source(EmbeddingSource::OnlineExplorationTrajectories)
        .model_dir(model_dir)
}

fn evaluator_config() -> MetaEvaluatorConfig {
    MetaEvaluatorConfig::default()
        .num_online_paths(10)
        .num_steps_per_task(2 * MAX_PATH_LENGTH)
        .embedding_batch_size(64)
        .max_path_length(MAX_PATH_LENGTH)
}

fn tasks(num_train_tasks: usize) -> (Vec<usize>, Vec<usize>) {
    let train_tasks = (0..num_train_tasks).collect();
    let eval_tasks = (num_train_tasks..2 * num_train_tasks).collect();
    (train_tasks, eval_tasks)
}

fn train(
    num_iterations: usize,
    num_train_tasks: usize,
    recurrent: bool,
    model_dir: &str,
) -> Result<()> {
    let env_config = PointRobotConfig::default().n_tasks(2 * num_train_tasks);
    let (train_tasks, eval_tasks) = tasks(num_train_tasks);
    let all_tasks: Vec<usize> = train_tasks.iter().chain(eval_tasks.iter()).copied().collect();

    let mut trainer = MetaTrainer::<PointRobotEnv>::build(
        trainer_config(num_iterations, model_dir),
        env_config,
        train_tasks,
        eval_tasks,
    )?;
    let mut evaluator = MetaEvaluator::build(&evaluator_config(), &all_tasks, DIM_OBS, DIM_ACT)?;
    let mut agent = create_agent(recurrent)?;
    let mut recorder = TensorboardRecorder::new(model_dir);

    trainer.train(&mut agent, &mut recorder, &mut evaluator)
}

fn eval(num_train_tasks: usize, recurrent: bool, snapshot_dir: &Path) -> Result<()> {
    let env_config = PointRobotConfig::default().n_tasks(2 * num_train_tasks);
    let (_, eval_tasks) = tasks(num_train_tasks);
    let mut env = PointRobotEnv::build(&env_config, 0)?;
    let mut evaluator = MetaEvaluator::build(&evaluator_config(), &eval_tasks, DIM_OBS, DIM_ACT)?;
    let mut agent = create_agent(recurrent)?;
    agent.load_params(snapshot_dir)?;
    agent.eval();

    for &task in eval_tasks.iter() {
        let result = evaluator.evaluate_task(&mut env, &mut agent, task, None, 0, None)?;
        info!(
            "task {}: prior {:.3}, posterior {:.3}, online {:.3}",
            task,
            result.prior_return,
            result.posterior_return,
            result.score()
        );
    }

    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let snapshot_dir =
        Path::new(&args.model_dir).join(args.num_iterations.saturating_sub(1).to_string());

    if !args.eval {
        train(
            args.num_iterations,
            args.num_train_tasks,
            args.recurrent,
            &args.model_dir,
        )?;
    }
    eval(args.num_train_tasks, args.recurrent, &snapshot_dir)?;

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_pearl_point_robot() -> Result<()> {
        let model_dir = TempDir::new("pearl_point_robot")?;
        let model_dir = model_dir.path().to_str().unwrap();
        let env_config = PointRobotConfig::default().n_tasks(4);
        let config = trainer_config(1, model_dir)
            .num_train_steps_per_itr(2)
            .num_initial_steps(40)
            .num_tasks_sample(1)
            .num_steps_per_task(20)
            .meta_batch(2)
            .replay_buffer_size(1000);
        let mut trainer =
            MetaTrainer::<PointRobotEnv>::build(config, env_config, vec![0, 1], vec![2, 3])?;
        let mut evaluator = MetaEvaluator::build(
            &evaluator_config().num_online_paths(5),
            &[0, 1, 2, 3],
            DIM_OBS,
            DIM_ACT,
        )?;
        let mut agent = create_agent(false)?;
        let mut recorder = TensorboardRecorder::new(model_dir);
        trainer.train(&mut agent, &mut recorder, &mut evaluator)?;

        eval(2, false, &Path::new(model_dir).join("0"))?;
        Ok(())
    }
}
