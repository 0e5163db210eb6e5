//! Tanh-Gaussian policy conditioned on the latent task variable.
use crate::{
    mlp::{Mlp2, MlpConfig},
    model::SubModel1,
    util::{randn, OutDim},
};
use anyhow::Result;
use candle_core::{Tensor, D};
use candle_nn::VarBuilder;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

const EPS_JACOBIAN: f64 = 1e-6;

/// Configuration of [`TanhGaussianPolicy`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct PolicyConfig {
    /// Hidden units.
    pub units: Vec<usize>,

    /// Lower bound of the log of the standard deviation.
    pub min_lstd: f64,

    /// Upper bound of the log of the standard deviation.
    pub max_lstd: f64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            units: vec![300, 300, 300],
            min_lstd: -20.0,
            max_lstd: 2.0,
        }
    }
}

impl PolicyConfig {
    /// Sets the hidden units.
    pub fn units(mut self, v: Vec<usize>) -> Self {
        self.units = v;
        self
    }
}

/// Outputs of a stochastic forward pass.
pub struct PolicyOutput {
    /// Actions in `[-1, 1]`, `[B, act_dim]`.
    pub action: Tensor,

    /// Log-probabilities of the actions, `[B]`.
    pub log_pi: Tensor,

    /// Means before squashing, `[B, act_dim]`.
    pub mean: Tensor,

    /// Clamped log standard deviations, `[B, act_dim]`.
    pub lstd: Tensor,
}

/// Gaussian policy squashed by `tanh`.
///
/// Inputs are observations concatenated with `z`.
pub struct TanhGaussianPolicy {
    mlp: Mlp2,
    min_lstd: f64,
    max_lstd: f64,
}

impl TanhGaussianPolicy {
    /// Builds the policy.
    pub fn build(
        vb: VarBuilder,
        config: &PolicyConfig,
        in_dim: usize,
        act_dim: usize,
    ) -> Result<Self> {
        let mut mlp_config = MlpConfig::new(in_dim, config.units.clone(), 0, false);
        mlp_config.set_out_dim(act_dim);
        let mlp = Mlp2::build(vb.pp("policy"), mlp_config)?;
        Ok(Self {
            mlp,
            min_lstd: config.min_lstd,
            max_lstd: config.max_lstd,
        })
    }

    fn mean_lstd(&self, xs: &Tensor) -> Result<(Tensor, Tensor)> {
        let (mean, lstd) = self.mlp.forward(xs)?;
        Ok((mean, lstd.clamp(self.min_lstd, self.max_lstd)?))
    }

    /// Mode of the action distribution.
    pub fn mode(&self, xs: &Tensor) -> Result<Tensor> {
        let (mean, _) = self.mean_lstd(xs)?;
        Ok(mean.tanh()?)
    }

    /// Samples actions by reparameterization along with their log-probabilities.
    pub fn sample(&self, xs: &Tensor, rng: &mut StdRng) -> Result<PolicyOutput> {
        let (mean, lstd) = self.mean_lstd(xs)?;
        let eps = randn(rng, mean.dims2()?, mean.device())?;
        let pre_tanh = (&mean + (lstd.exp()? * &eps)?)?;
        let action = pre_tanh.tanh()?;

        // Log-density of the Gaussian with the change of variables by tanh
        let log_normal = ((eps.sqr()? * -0.5)? - &lstd)?
            .affine(1.0, -0.5 * (2.0 * std::f64::consts::PI).ln())?
            .sum(D::Minus1)?;
        let log_jacobian = ((action.sqr()?.neg()? + 1.0)? + EPS_JACOBIAN)?
            .log()?
            .sum(D::Minus1)?;
        let log_pi = (log_normal - log_jacobian)?;

        Ok(PolicyOutput {
            action,
            log_pi,
            mean,
            lstd,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;
    use rand::SeedableRng;

    #[test]
    fn test_sample_bounds() -> Result<()> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let policy = TanhGaussianPolicy::build(vb, &PolicyConfig::default().units(vec![16]), 4, 2)?;
        let mut rng = StdRng::seed_from_u64(0);

        let xs = randn(&mut rng, (8, 4), &Device::Cpu)?;
        let out = policy.sample(&xs, &mut rng)?;
        assert_eq!(out.action.dims(), &[8, 2]);
        assert_eq!(out.log_pi.dims(), &[8]);
        for a in out.action.flatten_all()?.to_vec1::<f32>()? {
            assert!((-1.0..=1.0).contains(&a));
        }
        for l in out.lstd.flatten_all()?.to_vec1::<f32>()? {
            assert!((-20.0..=2.0).contains(&l));
        }

        let mode = policy.mode(&xs)?;
        assert_eq!(mode.dims(), &[8, 2]);
        Ok(())
    }
}
