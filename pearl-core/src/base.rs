//! Core traits and types.
mod agent;
mod embedding_source;
mod env;
mod policy;
pub use agent::MetaAgent;
pub use embedding_source::EmbeddingSource;
pub use env::{Step, TaskEnv};
pub use policy::MetaPolicy;
