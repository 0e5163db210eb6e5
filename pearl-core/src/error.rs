//! Errors in the library.
use thiserror::Error;

/// Errors raised by buffers, latent-state handling, configuration and records.
#[derive(Error, Debug, PartialEq)]
pub enum PearlError {
    /// A batch was requested from a store holding no transitions.
    #[error("insufficient data for task {task}: requested {requested}, available {available}")]
    InsufficientData {
        /// Task id.
        task: usize,
        /// Number of requested transitions.
        requested: usize,
        /// Number of stored transitions.
        available: usize,
    },

    /// Sequential sampling needs at least one complete, non-wrapping episode.
    #[error("no complete episode in the store of task {task}")]
    NoCompleteEpisode {
        /// Task id.
        task: usize,
    },

    /// The task id is not registered in the buffer pool.
    #[error("unknown task id: {0}")]
    UnknownTask(usize),

    /// Unrecognized or illegal embedding source.
    #[error("invalid embedding source: {0}")]
    InvalidEmbeddingSource(String),

    /// Inconsistent configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The agent was asked to act before any latent variable was set.
    #[error("latent variable is undefined; call clear_z() or infer_posterior() first")]
    LatentUndefined,

    /// Record key error.
    #[error("Record key error: {0}")]
    RecordKeyError(String),

    /// Record value type error.
    #[error("Record value type error: {0}")]
    RecordValueTypeError(String),
}
