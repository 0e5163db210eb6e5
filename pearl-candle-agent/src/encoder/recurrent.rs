use super::{ContextEncoder, EncoderState};
use crate::{
    mlp::{Mlp, MlpConfig},
    model::SubModel1,
};
use anyhow::{bail, Result};
use candle_core::{Module, Tensor};
use candle_nn::{
    linear, lstm,
    rnn::{LSTMState, RNN},
    LSTMConfig, Linear, VarBuilder, LSTM,
};

/// Encodes a sequence of context tuples with an MLP followed by an LSTM.
///
/// The output layer is applied to the last hidden state, so `N' = 1`.
pub struct RecurrentEncoder {
    mlp: Mlp,
    lstm: LSTM,
    out: Linear,
}

impl RecurrentEncoder {
    /// Builds the encoder.
    pub fn build(
        vb: VarBuilder,
        context_dim: usize,
        units: &[usize],
        hidden_dim: usize,
        out_dim: usize,
    ) -> Result<Self> {
        let vb = vb.pp("encoder");
        let config = MlpConfig::new(context_dim, units.to_vec(), hidden_dim, true);
        let mlp = Mlp::build(vb.clone(), config)?;
        let lstm = lstm(hidden_dim, hidden_dim, LSTMConfig::default(), vb.pp("lstm"))?;
        let out = linear(hidden_dim, out_dim, vb.pp("out"))?;
        Ok(Self { mlp, lstm, out })
    }
}

impl ContextEncoder for RecurrentEncoder {
    fn encode(&self, context: &Tensor, state: EncoderState) -> Result<(Tensor, EncoderState)> {
        let (t, n, c) = context.dims3()?;
        if n == 0 {
            bail!("Empty context");
        }
        let xs = self.mlp.forward(&context.reshape((t * n, c))?)?;
        let xs = xs.reshape((t, n, ()))?;

        let mut state = match state {
            EncoderState::Stateless => self.lstm.zero_state(t)?,
            EncoderState::Lstm { h, c } => LSTMState::new(h, c),
        };
        for i in 0..n {
            let x = xs.narrow(1, i, 1)?.squeeze(1)?;
            state = self.lstm.step(&x, &state)?;
        }

        let params = self.out.forward(state.h())?.unsqueeze(1)?;
        let state = EncoderState::Lstm {
            h: state.h().clone(),
            c: state.c().clone(),
        };
        Ok((params, state))
    }

    fn is_recurrent(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    fn max_abs_diff(a: &Tensor, b: &Tensor) -> Result<f32> {
        Ok((a - b)?.abs()?.flatten_all()?.max(0)?.to_scalar::<f32>()?)
    }

    #[test]
    fn test_order_sensitivity() -> Result<()> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let encoder = RecurrentEncoder::build(vb, 3, &[16], 8, 4)?;

        let rows: Vec<f32> = (0..12).map(|i| (i as f32 * 0.7).sin()).collect();
        let context = Tensor::from_slice(&rows, (1, 4, 3), &Device::Cpu)?;
        let reversed: Vec<f32> = rows.chunks(3).rev().flatten().copied().collect();
        let context_rev = Tensor::from_slice(&reversed, (1, 4, 3), &Device::Cpu)?;

        let (p1, _) = encoder.encode(&context, EncoderState::Stateless)?;
        let (p2, _) = encoder.encode(&context_rev, EncoderState::Stateless)?;
        assert_eq!(p1.dims(), &[1, 1, 4]);
        assert!(max_abs_diff(&p1, &p2)? > 1e-6);
        Ok(())
    }

    #[test]
    fn test_state_carried() -> Result<()> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let encoder = RecurrentEncoder::build(vb, 3, &[16], 8, 4)?;

        let rows: Vec<f32> = (0..12).map(|i| (i as f32 * 0.3).cos()).collect();
        let context = Tensor::from_slice(&rows, (2, 2, 3), &Device::Cpu)?;
        let first = context.narrow(1, 0, 1)?;
        let second = context.narrow(1, 1, 1)?;

        // Feeding the sequence in two calls equals feeding it at once
        let (p_all, _) = encoder.encode(&context, EncoderState::Stateless)?;
        let (_, state) = encoder.encode(&first, EncoderState::Stateless)?;
        let (p_split, _) = encoder.encode(&second, state)?;
        assert!(max_abs_diff(&p_all, &p_split)? < 1e-5);

        let (p_fresh, _) = encoder.encode(&second, EncoderState::Stateless)?;
        assert!(max_abs_diff(&p_all, &p_fresh)? > 1e-6);
        Ok(())
    }
}
