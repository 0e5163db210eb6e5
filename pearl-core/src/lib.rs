#![warn(missing_docs)]
//! Core components of meta-reinforcement learning with probabilistic
//! context embeddings.
//!
//! This crate is independent of any neural network backend. It provides
//!
//! * per-task [`TransitionStore`](replay_buffer::TransitionStore)s and the
//!   [`MultiTaskReplayBuffer`](replay_buffer::MultiTaskReplayBuffer) pool,
//!   used both for RL training data and for context data,
//! * the [`TaskEnv`] and [`MetaAgent`] interfaces,
//! * the meta-training loop [`MetaTrainer`] and the [`MetaEvaluator`],
//! * records and recorders for per-epoch statistics.
pub mod dummy;
pub mod env;
pub mod error;
pub mod evaluator;
pub mod record;
pub mod replay_buffer;
pub mod sampler;

mod base;
pub use base::{EmbeddingSource, MetaAgent, MetaPolicy, Step, TaskEnv};

mod trainer;
pub use evaluator::{MetaEvaluator, MetaEvaluatorConfig, TaskEvaluation};
pub use trainer::{Collector, MetaTrainer, MetaTrainerConfig};
