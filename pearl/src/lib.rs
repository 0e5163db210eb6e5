//! Meta-reinforcement learning with probabilistic context embeddings.
//!
//! An agent meta-trained over a family of tasks infers a latent task
//! variable `z` from a few transitions of a new task and acts conditioned on
//! it. The workspace consists of the following crates:
//!
//! * [`pearl_core`] provides per-task replay buffers, the environment and
//!   agent traits, the meta-training loop, the meta-evaluator and records.
//!   It does not depend on any neural network backend.
//! * [`pearl_candle_agent`] implements the agent with
//!   [candle](https://crates.io/crates/candle-core): context encoders
//!   (order-invariant and recurrent), a tanh-Gaussian policy, twin soft
//!   critics and the soft actor-critic trainer.
//! * [`pearl_tensorboard`] has `TensorboardRecorder` to write per-epoch
//!   records shown in Tensorboard.
//!
//! In one training iteration, transitions collected on a few training tasks
//! are added to per-task RL buffers and context buffers. The context encoder
//! turns context of a task into `z`, the critics are trained on RL batches
//! conditioned on `z`, and the policy is trained against the critics.
//!
//! `examples/pearl_point_robot.rs` trains the agent on a family of 2-D
//! navigation tasks.
pub use pearl_candle_agent;
pub use pearl_core;
pub use pearl_tensorboard;
