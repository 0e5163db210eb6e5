use anyhow::Result;
use pearl_candle_agent::{
    encoder::{EncoderConfig, EncoderKind},
    mlp::MlpConfig,
    policy::PolicyConfig,
    sac::TwinCriticConfig,
    PearlAgentConfig, PearlSac, PearlSacConfig,
};
use pearl_core::{
    env::{PointRobotConfig, PointRobotEnv},
    record::BufferedRecorder,
    EmbeddingSource, MetaAgent, MetaEvaluator, MetaEvaluatorConfig, MetaPolicy, MetaTrainer,
    MetaTrainerConfig,
};
use tempdir::TempDir;

fn sac_config(encoder_kind: EncoderKind) -> PearlSacConfig {
    let agent_config = PearlAgentConfig::new(2, 2)
        .latent_dim(2)
        .encoder_config(EncoderConfig::default().kind(encoder_kind).units(vec![32]))
        .policy_config(PolicyConfig::default().units(vec![32, 32]));
    PearlSacConfig::default()
        .agent_config(agent_config)
        .critic_config(
            TwinCriticConfig::default().q_config(MlpConfig::new(0, vec![32, 32], 1, false)),
        )
        .batch_size(16)
        .embedding_batch_size(16)
        .embedding_mini_batch_size(8)
}

fn trainer_config(source: EmbeddingSource, model_dir: &str) -> MetaTrainerConfig {
    MetaTrainerConfig::default()
        .num_iterations(2)
        .num_train_steps_per_itr(2)
        .num_initial_steps(40)
        .num_tasks_sample(2)
        .num_steps_per_task(20)
        .meta_batch(2)
        .embedding_batch_size(16)
        .max_path_length(10)
        .resample_z_rate(1)
        .update_post_train(1)
        .train_embedding_source(source)
        .replay_buffer_size(500)
        .model_dir(model_dir)
}

fn evaluator_config() -> MetaEvaluatorConfig {
    MetaEvaluatorConfig::default()
        .num_online_paths(5)
        .max_path_length(10)
        .num_steps_per_task(20)
        .embedding_batch_size(16)
}

fn train(encoder_kind: EncoderKind, source: EmbeddingSource) -> Result<()> {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .is_test(true)
        .try_init();

    let dir = TempDir::new("pearl_sac_point_robot")?;
    let model_dir = dir.path().to_string_lossy().to_string();
    let env_config = PointRobotConfig::default().n_tasks(3);
    let mut trainer = MetaTrainer::<PointRobotEnv>::build(
        trainer_config(source, &model_dir),
        env_config,
        vec![0, 1],
        vec![2],
    )?;
    let mut evaluator = MetaEvaluator::build(&evaluator_config(), &[0, 1, 2], 2, 2)?;
    let mut agent = PearlSac::build(sac_config(encoder_kind.clone()))?;
    let mut recorder = BufferedRecorder::new();

    trainer.train(&mut agent, &mut recorder, &mut evaluator)?;

    // Two meta-updates per iteration, two context slices each
    assert_eq!(agent.n_opts(), 8);
    assert_eq!(recorder.len(), 2);
    let last = recorder.iter().last().unwrap();
    assert!(last.get_scalar("QF1 Loss")?.is_finite());
    assert!(last.get_scalar("AverageReturn_all_test_tasks")?.is_finite());
    assert!(last.get_scalar("Z variance eval")? > 0.0);

    for name in [
        "context_encoder.safetensors",
        "policy.safetensors",
        "qf.safetensors",
        "target_qf.safetensors",
        "ent_coef.safetensors",
    ] {
        assert!(dir.path().join("1").join(name).exists(), "{}", name);
    }

    // The last snapshot can be restored into a fresh agent
    let mut restored = PearlSac::build(sac_config(encoder_kind))?;
    restored.load_params(&dir.path().join("1"))?;
    restored.clear_z(1)?;
    let act = restored.sample(&[0.0, 0.0], true)?;
    assert_eq!(act.len(), 2);
    assert!(act.iter().all(|v| v.abs() <= 1.0));
    Ok(())
}

#[test]
fn test_pooling_encoder_exploration() -> Result<()> {
    train(
        EncoderKind::Pooling,
        EmbeddingSource::OnlineExplorationTrajectories,
    )
}

#[test]
fn test_recurrent_encoder_on_policy() -> Result<()> {
    train(
        EncoderKind::Recurrent { hidden_dim: 16 },
        EmbeddingSource::OnlineOnPolicyTrajectories,
    )
}
