//! Policy.
use anyhow::Result;

/// A policy conditioned on a latent task variable held by the policy itself.
pub trait MetaPolicy {
    /// Samples an action given an observation.
    ///
    /// The latent task variable is not resampled. With `deterministic`, the
    /// mode of the action distribution is returned.
    fn sample(&mut self, obs: &[f32], deterministic: bool) -> Result<Vec<f32>>;
}
