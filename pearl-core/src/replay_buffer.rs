//! Per-task transition stores and the multi-task buffer pool.
//!
//! Every task owns two independent pools of [`TransitionStore`]s: the RL
//! replay pool feeding the critics and the policy, and the context pool
//! feeding the context encoder. Both are [`MultiTaskReplayBuffer`]s.
mod batch;
mod config;
mod multi_task;
mod path;
mod transition_store;
pub use batch::{context_dim, TransitionBatch};
pub use config::TransitionStoreConfig;
pub use multi_task::MultiTaskReplayBuffer;
pub use path::Path;
pub use transition_store::{Transition, TransitionStore};
