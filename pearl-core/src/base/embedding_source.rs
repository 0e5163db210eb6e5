use crate::error::PearlError;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Where the context used to infer the task embedding comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingSource {
    /// Context collected before training, kept as is.
    InitialPool,

    /// Context accumulated from scratch during evaluation rollouts.
    ///
    /// Not legal for training.
    Online,

    /// Context collected with `z` drawn from the prior.
    OnlineExplorationTrajectories,

    /// Context collected while the posterior is updated.
    OnlineOnPolicyTrajectories,
}

impl EmbeddingSource {
    /// Fails if the source cannot be used for collecting training data.
    pub fn validate_for_training(&self) -> Result<(), PearlError> {
        match self {
            Self::Online => Err(PearlError::InvalidEmbeddingSource(format!(
                "{} is not legal for training",
                self
            ))),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for EmbeddingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InitialPool => "initial_pool",
            Self::Online => "online",
            Self::OnlineExplorationTrajectories => "online_exploration_trajectories",
            Self::OnlineOnPolicyTrajectories => "online_on_policy_trajectories",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for EmbeddingSource {
    type Err = PearlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initial_pool" => Ok(Self::InitialPool),
            "online" => Ok(Self::Online),
            "online_exploration_trajectories" => Ok(Self::OnlineExplorationTrajectories),
            "online_on_policy_trajectories" => Ok(Self::OnlineOnPolicyTrajectories),
            _ => Err(PearlError::InvalidEmbeddingSource(s.to_string())),
        }
    }
}
