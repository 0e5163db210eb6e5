//! Utilities.
use anyhow::{anyhow, Context, Result};
use candle_core::{Device, Tensor};
use candle_nn::VarMap;
use log::trace;
use rand::{rngs::StdRng, Rng};
use rand_distr::StandardNormal;

/// Variance floor of Gaussian factors.
pub const MIN_VARIANCE: f64 = 1e-7;

/// Apply soft update on variables.
///
/// Variables are identified by their names.
///
/// dest = tau * src + (1.0 - tau) * dest
pub fn track(dest: &VarMap, src: &VarMap, tau: f64) -> Result<()> {
    trace!("dest");
    let dest = dest.data().lock().map_err(|e| anyhow!("{}", e))?;
    trace!("src");
    let src = src.data().lock().map_err(|e| anyhow!("{}", e))?;

    for (k_dest, v_dest) in dest.iter() {
        let v_src = src
            .get(k_dest)
            .with_context(|| format!("{} is not in the source", k_dest))?;
        let t_src = (tau * v_src.as_tensor())?;
        let t_dest = ((1.0 - tau) * v_dest.as_tensor())?;
        v_dest.set(&(t_src + t_dest)?)?;
    }

    Ok(())
}

/// Interface for handling output dimensions.
pub trait OutDim {
    /// Returns the output dimension.
    fn get_out_dim(&self) -> usize;

    /// Sets the  output dimension.
    fn set_out_dim(&mut self, v: usize);
}

/// Draws a tensor of standard normal samples.
pub fn randn(rng: &mut StdRng, shape: (usize, usize), device: &Device) -> Result<Tensor> {
    let v: Vec<f32> = (0..shape.0 * shape.1)
        .map(|_| rng.sample(StandardNormal))
        .collect();
    Ok(Tensor::from_vec(v, shape, device)?)
}

/// `log(1 + exp(x))` without overflow for large `x`.
pub fn softplus(x: &Tensor) -> Result<Tensor> {
    let t = (x.abs()?.neg()?.exp()? + 1.0)?.log()?;
    Ok((x.relu()? + t)?)
}

/// KL divergence of diagonal Gaussians `N(mean, var)` from the standard
/// normal, summed over all rows and dimensions.
pub fn kl_divergence_std_normal(mean: &Tensor, var: &Tensor) -> Result<Tensor> {
    let t = ((var + mean.sqr()?)? - var.log()?)?;
    Ok(((t - 1.0)?.sum_all()? * 0.5)?)
}

/// Combines Gaussian factors `[T, N, L]` along the second dimension into one
/// Gaussian `[T, L]` per row by product of Gaussians.
pub fn product_of_gaussians(mus: &Tensor, vars: &Tensor) -> Result<(Tensor, Tensor)> {
    let vars = vars.clamp(MIN_VARIANCE, f64::INFINITY)?;
    let precision = vars.recip()?;
    let var = precision.sum(1)?.recip()?;
    let mu = (&var * (mus * &precision)?.sum(1)?)?;
    Ok((mu, var))
}

#[cfg(test)]
mod test {
    use super::*;
    use candle_core::DType;
    use candle_nn::Init;

    fn varmap_with(t: &Tensor) -> Result<VarMap> {
        let vm = VarMap::new();
        let init = Init::Randn {
            mean: 0.0,
            stdev: 1.0,
        };
        vm.get((3,), "var1", init, DType::F32, &Device::Cpu)?;
        {
            let data = vm.data().lock().map_err(|e| anyhow!("{}", e))?;
            data.get("var1").context("var1")?.set(t)?;
        }
        Ok(vm)
    }

    fn value(vm: &VarMap) -> Result<Vec<f32>> {
        let data = vm.data().lock().map_err(|e| anyhow!("{}", e))?;
        Ok(data.get("var1").context("var1")?.as_tensor().to_vec1()?)
    }

    #[test]
    fn test_track() -> Result<()> {
        let t_src = Tensor::from_slice(&[1.0f32, 2.0, 3.0], (3,), &Device::Cpu)?;
        let t_dest = Tensor::from_slice(&[4.0f32, 5.0, 6.0], (3,), &Device::Cpu)?;
        let vm_src = varmap_with(&t_src)?;

        let vm_dest = varmap_with(&t_dest)?;
        track(&vm_dest, &vm_src, 0.0)?;
        assert_eq!(value(&vm_dest)?, vec![4.0, 5.0, 6.0]);

        track(&vm_dest, &vm_src, 1.0)?;
        assert_eq!(value(&vm_dest)?, vec![1.0, 2.0, 3.0]);

        let vm_dest = varmap_with(&t_dest)?;
        track(&vm_dest, &vm_src, 0.5)?;
        assert_eq!(value(&vm_dest)?, vec![2.5, 3.5, 4.5]);
        Ok(())
    }

    #[test]
    fn test_kl_divergence() -> Result<()> {
        let dev = Device::Cpu;
        let mean = Tensor::zeros((2, 3), DType::F32, &dev)?;
        let var = Tensor::ones((2, 3), DType::F32, &dev)?;
        let kl = kl_divergence_std_normal(&mean, &var)?.to_scalar::<f32>()?;
        assert!(kl.abs() < 1e-6);

        // 0.5 * (1 + 1 - 1 - 0) per element
        let mean = Tensor::ones((1, 2), DType::F32, &dev)?;
        let var = Tensor::ones((1, 2), DType::F32, &dev)?;
        let kl = kl_divergence_std_normal(&mean, &var)?.to_scalar::<f32>()?;
        assert!((kl - 1.0).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_product_of_gaussians() -> Result<()> {
        let dev = Device::Cpu;
        let mus = Tensor::from_slice(&[1f32, 3.0], (1, 2, 1), &dev)?;
        let vars = Tensor::from_slice(&[2f32, 2.0], (1, 2, 1), &dev)?;
        let (mu, var) = product_of_gaussians(&mus, &vars)?;
        assert_eq!(mu.dims(), &[1, 1]);
        assert!((mu.flatten_all()?.to_vec1::<f32>()?[0] - 2.0).abs() < 1e-6);
        assert!((var.flatten_all()?.to_vec1::<f32>()?[0] - 1.0).abs() < 1e-6);

        // Zero variance is floored
        let vars = Tensor::zeros((1, 2, 1), DType::F32, &dev)?;
        let (_, var) = product_of_gaussians(&mus, &vars)?;
        assert!(var.flatten_all()?.to_vec1::<f32>()?[0] > 0.0);
        Ok(())
    }

    #[test]
    fn test_softplus() -> Result<()> {
        let x = Tensor::from_slice(&[-100f32, 0.0, 100.0], (3,), &Device::Cpu)?;
        let y = softplus(&x)?.to_vec1::<f32>()?;
        assert!(y[0].abs() < 1e-6);
        assert!((y[1] - 2f32.ln()).abs() < 1e-6);
        assert!((y[2] - 100.0).abs() < 1e-4);
        Ok(())
    }
}
