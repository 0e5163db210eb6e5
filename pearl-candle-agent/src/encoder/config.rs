use super::{ContextEncoder, PoolingEncoder, RecurrentEncoder};
use anyhow::Result;
use candle_nn::VarBuilder;
use serde::{Deserialize, Serialize};

/// Kind of context encoder.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub enum EncoderKind {
    /// Order-invariant encoder applying an MLP to every tuple.
    Pooling,

    /// Order-sensitive encoder with an LSTM of the given hidden size.
    Recurrent {
        /// Size of the hidden state of the LSTM.
        hidden_dim: usize,
    },
}

/// Configuration of a context encoder.
///
/// Input and output dimensions are given when the encoder is built.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct EncoderConfig {
    /// Kind of the encoder.
    pub kind: EncoderKind,

    /// Hidden units of the per-tuple MLP.
    pub units: Vec<usize>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            kind: EncoderKind::Pooling,
            units: vec![200, 200, 200],
        }
    }
}

impl EncoderConfig {
    /// Sets the kind of the encoder.
    pub fn kind(mut self, v: EncoderKind) -> Self {
        self.kind = v;
        self
    }

    /// Sets the hidden units.
    pub fn units(mut self, v: Vec<usize>) -> Self {
        self.units = v;
        self
    }

    /// Returns `true` for an order-sensitive encoder.
    pub fn is_recurrent(&self) -> bool {
        matches!(self.kind, EncoderKind::Recurrent { .. })
    }

    /// Builds the encoder.
    pub fn build(
        &self,
        vb: VarBuilder,
        context_dim: usize,
        out_dim: usize,
    ) -> Result<Box<dyn ContextEncoder>> {
        Ok(match self.kind {
            EncoderKind::Pooling => Box::new(PoolingEncoder::build(
                vb,
                context_dim,
                &self.units,
                out_dim,
            )?),
            EncoderKind::Recurrent { hidden_dim } => Box::new(RecurrentEncoder::build(
                vb,
                context_dim,
                &self.units,
                hidden_dim,
                out_dim,
            )?),
        })
    }
}
