//! Optimizers.
use anyhow::Result;
use candle_core::{backprop::GradStore, Tensor, Var};
use candle_nn::{AdamW, Optimizer as _, ParamsAdamW};
use candle_optimisers::adam::{Adam, ParamsAdam};
use serde::{Deserialize, Serialize};

/// Configuration of optimizer for training neural networks in an agent.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub enum OptimizerConfig {
    /// AdamW optimizer.
    AdamW {
        lr: f64,
        #[serde(default = "default_beta1")]
        beta1: f64,
        #[serde(default = "default_beta2")]
        beta2: f64,
        #[serde(default = "default_eps")]
        eps: f64,
        #[serde(default = "default_weight_decay")]
        weight_decay: f64,
    },

    /// Adam optimizer.
    Adam {
        /// Learning rate.
        lr: f64,
    },
}

fn default_beta1() -> f64 {
    ParamsAdamW::default().beta1
}

fn default_beta2() -> f64 {
    ParamsAdamW::default().beta2
}

fn default_eps() -> f64 {
    ParamsAdamW::default().eps
}

fn default_weight_decay() -> f64 {
    ParamsAdamW::default().weight_decay
}

impl OptimizerConfig {
    /// Constructs an optimizer over the given variables.
    pub fn build(&self, vars: Vec<Var>) -> Result<Optimizer> {
        match &self {
            OptimizerConfig::AdamW {
                lr,
                beta1,
                beta2,
                eps,
                weight_decay,
            } => {
                let params = ParamsAdamW {
                    lr: *lr,
                    beta1: *beta1,
                    beta2: *beta2,
                    eps: *eps,
                    weight_decay: *weight_decay,
                };
                let opt = AdamW::new(vars, params)?;
                Ok(Optimizer::AdamW(opt))
            }
            OptimizerConfig::Adam { lr } => {
                let params = ParamsAdam {
                    lr: *lr,
                    ..ParamsAdam::default()
                };
                let opt = Adam::new(vars, params)?;
                Ok(Optimizer::Adam(opt))
            }
        }
    }

    /// Overrides the learning rate.
    pub fn learning_rate(mut self, new_lr: f64) -> Self {
        match &mut self {
            Self::AdamW { lr, .. } | Self::Adam { lr } => *lr = new_lr,
        }
        self
    }

    /// Learning rate.
    pub fn lr(&self) -> f64 {
        match self {
            Self::AdamW { lr, .. } | Self::Adam { lr } => *lr,
        }
    }
}

impl Default for OptimizerConfig {
    /// Adam with learning rate `3e-4`.
    fn default() -> Self {
        Self::Adam { lr: 3e-4 }
    }
}

/// Optimizer over a fixed set of variables.
///
/// The encoder, the policy and the critics each own one, so that a single
/// [`GradStore`] can be applied to some of them and not the others.
pub enum Optimizer {
    /// AdamW optimizer.
    AdamW(AdamW),

    /// Adam optimizer.
    Adam(Adam),
}

impl Optimizer {
    /// Applies a backward step pass.
    pub fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        match self {
            Self::AdamW(opt) => Ok(opt.backward_step(loss)?),
            Self::Adam(opt) => Ok(opt.backward_step(loss)?),
        }
    }

    /// Updates the variables of this optimizer with precomputed gradients.
    ///
    /// Gradients of variables not owned by the optimizer are ignored.
    pub fn step(&mut self, grads: &GradStore) -> Result<()> {
        match self {
            Self::AdamW(opt) => Ok(opt.step(grads)?),
            Self::Adam(opt) => Ok(opt.step(grads)?),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use candle_core::{DType, Device};

    #[test]
    fn test_learning_rate_override() {
        let config = OptimizerConfig::default().learning_rate(1e-3);
        assert_eq!(config.lr(), 1e-3);

        let config = OptimizerConfig::AdamW {
            lr: 0.1,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            weight_decay: 0.0,
        }
        .learning_rate(0.2);
        assert_eq!(config.lr(), 0.2);
    }

    #[test]
    fn test_step_ignores_foreign_vars() -> Result<()> {
        let device = Device::Cpu;
        let a = Var::zeros(3, DType::F32, &device)?;
        let b = Var::zeros(3, DType::F32, &device)?;
        let mut opt = OptimizerConfig::Adam { lr: 0.1 }.build(vec![a.clone()])?;

        let loss_a = (a.as_tensor() - 1.0)?.sqr()?.sum_all()?;
        let loss_b = (b.as_tensor() - 1.0)?.sqr()?.sum_all()?;
        let grads = (loss_a + loss_b)?.backward()?;
        opt.step(&grads)?;

        assert!(a.as_tensor().sum_all()?.to_scalar::<f32>()? > 0.0);
        assert_eq!(b.as_tensor().sum_all()?.to_scalar::<f32>()?, 0.0);
        Ok(())
    }
}
