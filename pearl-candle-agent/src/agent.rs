//! Task-conditioned agent.
mod base;
mod config;
pub use base::PearlAgent;
pub use config::PearlAgentConfig;
