//! Latent task variable.
//!
//! The latent state of a batch of task rows moves through
//! `Undefined -> Prior | Posterior`. Every transition is a function returning
//! a new state, the agent only stores the result.
use crate::{
    encoder::EncoderState,
    util::{kl_divergence_std_normal, product_of_gaussians, randn, softplus, MIN_VARIANCE},
};
use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use pearl_core::error::PearlError;
use rand::rngs::StdRng;

/// Diagonal Gaussian, `[T, latent_dim]` for both tensors.
#[derive(Clone, Debug)]
pub struct Gaussian {
    /// Mean.
    pub mean: Tensor,

    /// Variance.
    pub var: Tensor,
}

impl Gaussian {
    /// Draws a sample by reparameterization.
    pub fn sample(&self, rng: &mut StdRng) -> Result<Tensor> {
        let eps = randn(rng, self.mean.dims2()?, self.mean.device())?;
        Ok((&self.mean + (self.var.sqrt()? * eps)?)?)
    }

    fn detach(&self) -> Self {
        Self {
            mean: self.mean.detach(),
            var: self.var.detach(),
        }
    }
}

/// Latent state of a batch of task rows.
#[derive(Clone, Debug)]
pub enum LatentState {
    /// No latent variable has been set.
    Undefined,

    /// `z` drawn from the prior. `dist` is `None` for point estimates.
    Prior {
        /// Prior distribution.
        dist: Option<Gaussian>,
        /// Latent variable, `[T, latent_dim]`.
        z: Tensor,
    },

    /// `z` drawn from the posterior given context.
    Posterior {
        /// Posterior distribution.
        dist: Option<Gaussian>,
        /// Latent variable, `[T, latent_dim]`.
        z: Tensor,
        /// State of the encoder after the context seen so far.
        encoder_state: EncoderState,
    },
}

impl LatentState {
    /// Prior of `num_tasks` rows.
    ///
    /// Under the information bottleneck `z` is drawn from the standard normal,
    /// otherwise it is the zero vector.
    pub fn prior(
        num_tasks: usize,
        latent_dim: usize,
        use_ib: bool,
        rng: &mut StdRng,
        device: &Device,
    ) -> Result<Self> {
        let mean = Tensor::zeros((num_tasks, latent_dim), DType::F32, device)?;
        if use_ib {
            let dist = Gaussian {
                var: Tensor::ones((num_tasks, latent_dim), DType::F32, device)?,
                mean,
            };
            let z = dist.sample(rng)?;
            Ok(Self::Prior {
                dist: Some(dist),
                z,
            })
        } else {
            Ok(Self::Prior {
                dist: None,
                z: mean,
            })
        }
    }

    /// Posterior given encoder outputs `[T, N', K]`.
    ///
    /// Under the information bottleneck the first `latent_dim` outputs are
    /// means and the rest are mapped to variances by softplus. Factors of the
    /// `N'` tuples are combined by product of Gaussians. Otherwise `z` is the
    /// mean of the outputs over tuples.
    pub fn posterior(
        params: &Tensor,
        encoder_state: EncoderState,
        latent_dim: usize,
        use_ib: bool,
        rng: &mut StdRng,
    ) -> Result<Self> {
        if use_ib {
            let mus = params.narrow(2, 0, latent_dim)?;
            let vars = softplus(&params.narrow(2, latent_dim, latent_dim)?)?
                .clamp(MIN_VARIANCE, f64::INFINITY)?;
            let (mean, var) = product_of_gaussians(&mus, &vars)?;
            let dist = Gaussian { mean, var };
            let z = dist.sample(rng)?;
            Ok(Self::Posterior {
                dist: Some(dist),
                z,
                encoder_state,
            })
        } else {
            Ok(Self::Posterior {
                dist: None,
                z: params.mean(1)?,
                encoder_state,
            })
        }
    }

    /// Redraws `z` from the current distribution. Point estimates are kept.
    pub fn resample(&self, rng: &mut StdRng) -> Result<Self> {
        Ok(match self {
            Self::Undefined => return Err(PearlError::LatentUndefined.into()),
            Self::Prior { dist: Some(d), .. } => Self::Prior {
                z: d.sample(rng)?,
                dist: Some(d.clone()),
            },
            Self::Posterior {
                dist: Some(d),
                encoder_state,
                ..
            } => Self::Posterior {
                z: d.sample(rng)?,
                dist: Some(d.clone()),
                encoder_state: encoder_state.clone(),
            },
            other => other.clone(),
        })
    }

    /// Same values with every gradient path cut.
    pub fn detach(&self) -> Self {
        match self {
            Self::Undefined => Self::Undefined,
            Self::Prior { dist, z } => Self::Prior {
                dist: dist.as_ref().map(Gaussian::detach),
                z: z.detach(),
            },
            Self::Posterior {
                dist,
                z,
                encoder_state,
            } => Self::Posterior {
                dist: dist.as_ref().map(Gaussian::detach),
                z: z.detach(),
                encoder_state: encoder_state.detach(),
            },
        }
    }

    /// The latent variable, `[T, latent_dim]`.
    pub fn z(&self) -> Result<&Tensor> {
        match self {
            Self::Undefined => Err(PearlError::LatentUndefined.into()),
            Self::Prior { z, .. } | Self::Posterior { z, .. } => Ok(z),
        }
    }

    /// The distribution of `z`, `None` for point estimates.
    pub fn dist(&self) -> Option<&Gaussian> {
        match self {
            Self::Undefined => None,
            Self::Prior { dist, .. } | Self::Posterior { dist, .. } => dist.as_ref(),
        }
    }

    /// Number of task rows, zero when undefined.
    pub fn num_tasks(&self) -> usize {
        self.z().map(|z| z.dims()[0]).unwrap_or(0)
    }

    /// Encoder state to continue from. Only a posterior carries one.
    pub fn encoder_state(&self) -> EncoderState {
        match self {
            Self::Posterior { encoder_state, .. } => encoder_state.clone(),
            _ => EncoderState::Stateless,
        }
    }

    /// KL divergence of the distribution from the standard normal, summed over
    /// task rows. `None` for point estimates.
    pub fn kl_divergence(&self) -> Result<Option<Tensor>> {
        match self.dist() {
            Some(d) => Ok(Some(kl_divergence_std_normal(&d.mean, &d.var)?)),
            None => Ok(None),
        }
    }

    /// Returns `true` for a posterior.
    pub fn is_posterior(&self) -> bool {
        matches!(self, Self::Posterior { .. })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use anyhow::Context;
    use rand::SeedableRng;

    #[test]
    fn test_prior() -> Result<()> {
        let mut rng = StdRng::seed_from_u64(0);
        let dev = Device::Cpu;

        let prior = LatentState::prior(3, 2, false, &mut rng, &dev)?;
        assert_eq!(prior.num_tasks(), 3);
        assert!(prior.dist().is_none());
        assert_eq!(prior.z()?.flatten_all()?.to_vec1::<f32>()?, vec![0f32; 6]);

        let prior = LatentState::prior(3, 2, true, &mut rng, &dev)?;
        let kl = prior.kl_divergence()?.map(|t| t.to_scalar::<f32>()).transpose()?;
        assert_eq!(kl, Some(0.0));
        Ok(())
    }

    #[test]
    fn test_undefined() {
        let mut rng = StdRng::seed_from_u64(0);
        let state = LatentState::Undefined;
        assert_eq!(state.num_tasks(), 0);
        assert!(state.z().is_err());
        assert!(state.resample(&mut rng).is_err());
    }

    #[test]
    fn test_posterior_point_estimate() -> Result<()> {
        let mut rng = StdRng::seed_from_u64(0);
        let params = Tensor::from_slice(&[1f32, 2.0, 3.0, 4.0], (1, 2, 2), &Device::Cpu)?;
        let state = LatentState::posterior(&params, EncoderState::Stateless, 2, false, &mut rng)?;
        assert_eq!(state.z()?.flatten_all()?.to_vec1::<f32>()?, vec![2.0, 3.0]);
        assert!(state.kl_divergence()?.is_none());

        // Point estimates are not resampled
        let resampled = state.resample(&mut rng)?;
        assert_eq!(resampled.z()?.flatten_all()?.to_vec1::<f32>()?, vec![2.0, 3.0]);
        Ok(())
    }

    #[test]
    fn test_posterior_ib() -> Result<()> {
        let mut rng = StdRng::seed_from_u64(0);
        let params = Tensor::zeros((2, 3, 4), DType::F32, &Device::Cpu)?;
        let state = LatentState::posterior(&params, EncoderState::Stateless, 2, true, &mut rng)?;
        assert!(state.is_posterior());
        let var = state
            .dist()
            .context("posterior has a distribution")?
            .var
            .flatten_all()?
            .to_vec1::<f32>()?;

        // softplus(0) / 3 tuples
        for v in var {
            assert!((v - 2f32.ln() / 3.0).abs() < 1e-5);
        }
        assert_eq!(state.z()?.dims(), &[2, 2]);
        Ok(())
    }
}
