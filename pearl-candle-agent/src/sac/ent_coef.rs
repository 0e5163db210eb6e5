//! Entropy coefficient of SAC.
use crate::opt::{Optimizer, OptimizerConfig};
use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use candle_nn::{init::Init, VarBuilder, VarMap};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Mode of the entropy coefficient of SAC.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub enum EntCoefMode {
    /// Use a constant as alpha.
    Fix(f64),
    /// Automatic tuning given `(target_entropy, learning_rate)`.
    Auto(f64, f64),
}

/// The entropy coefficient of SAC.
pub struct EntCoef {
    varmap: VarMap,
    log_alpha: Tensor,
    target_entropy: Option<f64>,
    opt: Option<Optimizer>,
}

impl EntCoef {
    /// Constructs an instance of `EntCoef`.
    pub fn new(mode: EntCoefMode, device: &Device) -> Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let (log_alpha, target_entropy, opt) = match mode {
            EntCoefMode::Fix(alpha) => {
                let init = Init::Const(alpha.ln());
                let log_alpha = vb.get_with_hints(1, "log_alpha", init)?;
                (log_alpha, None, None)
            }
            EntCoefMode::Auto(target_entropy, learning_rate) => {
                let init = Init::Const(0.0);
                let log_alpha = vb.get_with_hints(1, "log_alpha", init)?;
                let opt = OptimizerConfig::default()
                    .learning_rate(learning_rate)
                    .build(varmap.all_vars())?;
                (log_alpha, Some(target_entropy), Some(opt))
            }
        };

        Ok(Self {
            varmap,
            log_alpha,
            opt,
            target_entropy,
        })
    }

    /// Returns the entropy coefficient, `[1]`, without gradient.
    pub fn alpha(&self) -> Result<Tensor> {
        Ok(self.log_alpha.detach().exp()?)
    }

    /// Returns `true` if alpha is tuned.
    pub fn is_auto(&self) -> bool {
        self.target_entropy.is_some()
    }

    /// Updates alpha given log-probabilities of sampled actions.
    ///
    /// Returns the loss, or `None` for a fixed coefficient.
    pub fn update(&mut self, logp: &Tensor) -> Result<Option<f32>> {
        match (&self.target_entropy, &mut self.opt) {
            (Some(target_entropy), Some(opt)) => {
                let loss = {
                    let tmp = (logp.detach() + *target_entropy)?;
                    (self.log_alpha.broadcast_mul(&tmp)? * -1f64)?.mean_all()?
                };
                opt.backward_step(&loss)?;
                Ok(Some(loss.to_scalar::<f32>()?))
            }
            _ => Ok(None),
        }
    }

    /// Save the parameter into a file.
    pub fn save<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        self.varmap.save(&path)?;
        info!("Save entropy coefficient to {:?}", path.as_ref());
        Ok(())
    }

    /// Load the parameter from a file.
    pub fn load<T: AsRef<Path>>(&mut self, path: T) -> Result<()> {
        self.varmap.load(&path)?;
        info!("Load entropy coefficient from {:?}", path.as_ref());
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_fixed_alpha() -> Result<()> {
        let mut ent_coef = EntCoef::new(EntCoefMode::Fix(0.5), &Device::Cpu)?;
        let logp = Tensor::from_slice(&[1f32, 2.0], (2,), &Device::Cpu)?;
        assert_eq!(ent_coef.update(&logp)?, None);
        let alpha = ent_coef.alpha()?.to_vec1::<f32>()?[0];
        assert!((alpha - 0.5).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_auto_alpha_direction() -> Result<()> {
        // Entropy below the target (log-probabilities too high) increases alpha
        let mut ent_coef = EntCoef::new(EntCoefMode::Auto(-1.0, 0.1), &Device::Cpu)?;
        let logp = Tensor::from_slice(&[3f32, 3.0], (2,), &Device::Cpu)?;
        assert!(ent_coef.is_auto());
        assert_eq!(ent_coef.update(&logp)?, Some(0.0));
        assert!(ent_coef.alpha()?.to_vec1::<f32>()?[0] > 1.0);
        Ok(())
    }
}
