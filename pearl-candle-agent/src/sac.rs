//! Soft actor-critic with probabilistic context embeddings.
mod base;
mod config;
mod critic;
mod ent_coef;
pub use base::PearlSac;
pub use config::PearlSacConfig;
pub use critic::{TwinCritic, TwinCriticConfig};
pub use ent_coef::{EntCoef, EntCoefMode};
