use super::{ContextEncoder, EncoderState};
use crate::{
    mlp::{Mlp, MlpConfig},
    model::SubModel1,
};
use anyhow::Result;
use candle_core::Tensor;
use candle_nn::VarBuilder;

/// Encodes every context tuple independently with an MLP.
///
/// Pooling over tuples is done when the latent distribution is formed, so
/// the result does not depend on the order of the tuples.
pub struct PoolingEncoder {
    mlp: Mlp,
}

impl PoolingEncoder {
    /// Builds the encoder.
    pub fn build(
        vb: VarBuilder,
        context_dim: usize,
        units: &[usize],
        out_dim: usize,
    ) -> Result<Self> {
        let config = MlpConfig::new(context_dim, units.to_vec(), out_dim, false);
        let mlp = Mlp::build(vb.pp("encoder"), config)?;
        Ok(Self { mlp })
    }
}

impl ContextEncoder for PoolingEncoder {
    fn encode(&self, context: &Tensor, _state: EncoderState) -> Result<(Tensor, EncoderState)> {
        let (t, n, c) = context.dims3()?;
        let xs = context.reshape((t * n, c))?;
        let params = self.mlp.forward(&xs)?;
        let k = params.dim(1)?;
        Ok((params.reshape((t, n, k))?, EncoderState::Stateless))
    }

    fn is_recurrent(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    #[test]
    fn test_order_invariance() -> Result<()> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let encoder = PoolingEncoder::build(vb, 3, &[16], 4)?;

        let rows: Vec<f32> = (0..12).map(|i| i as f32 * 0.1).collect();
        let context = Tensor::from_slice(&rows, (1, 4, 3), &Device::Cpu)?;
        let reversed: Vec<f32> = rows.chunks(3).rev().flatten().copied().collect();
        let context_rev = Tensor::from_slice(&reversed, (1, 4, 3), &Device::Cpu)?;

        let (p1, _) = encoder.encode(&context, EncoderState::Stateless)?;
        let (p2, _) = encoder.encode(&context_rev, EncoderState::Stateless)?;
        assert_eq!(p1.dims(), &[1, 4, 4]);

        let m1 = p1.mean(1)?.flatten_all()?.to_vec1::<f32>()?;
        let m2 = p2.mean(1)?.flatten_all()?.to_vec1::<f32>()?;
        for (a, b) in m1.iter().zip(m2.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
        Ok(())
    }
}
