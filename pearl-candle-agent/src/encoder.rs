//! Context encoders.
//!
//! An encoder maps a batch of context tuples `[T, N, C]`, `T` task rows of
//! `N` tuples each, to parameters `[T, N', K]` of the latent distribution.
//! Under the information bottleneck `K = 2 * latent_dim` (mean and
//! pre-softplus variance), otherwise `K = latent_dim`.
mod config;
mod pooling;
mod recurrent;
use anyhow::Result;
use candle_core::Tensor;
pub use config::{EncoderConfig, EncoderKind};
pub use pooling::PoolingEncoder;
pub use recurrent::RecurrentEncoder;

/// State threaded through successive calls of [`ContextEncoder::encode`].
#[derive(Clone, Debug)]
pub enum EncoderState {
    /// No state, used by order-invariant encoders and for a fresh sequence.
    Stateless,

    /// Hidden and cell states of an LSTM, `[T, hidden_dim]` each.
    Lstm {
        /// Hidden state.
        h: Tensor,
        /// Cell state.
        c: Tensor,
    },
}

impl EncoderState {
    /// Returns the same state with gradient paths cut.
    pub fn detach(&self) -> Self {
        match self {
            Self::Stateless => Self::Stateless,
            Self::Lstm { h, c } => Self::Lstm {
                h: h.detach(),
                c: c.detach(),
            },
        }
    }
}

/// Encodes context into parameters of the latent distribution.
pub trait ContextEncoder {
    /// Encodes context `[T, N, C]` given the state of a previous call.
    ///
    /// Returns parameters `[T, N', K]` and the state for the next call.
    fn encode(&self, context: &Tensor, state: EncoderState) -> Result<(Tensor, EncoderState)>;

    /// Returns `true` if the output depends on the order of context tuples.
    fn is_recurrent(&self) -> bool;
}
