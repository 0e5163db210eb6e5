//! Agents for meta-reinforcement learning implemented with
//! [candle](https://crates.io/crates/candle-core).
//!
//! [`PearlSac`] trains a task-conditioned soft actor-critic together with a
//! context encoder, which summarizes transitions of a task into a latent
//! variable `z` conditioning the policy and the critics.
pub mod agent;
pub mod encoder;
pub mod latent;
pub mod mlp;
pub mod model;
pub mod opt;
pub mod policy;
pub mod sac;
pub mod util;
use serde::{Deserialize, Serialize};
pub use agent::{PearlAgent, PearlAgentConfig};
pub use sac::{PearlSac, PearlSacConfig};

#[derive(Clone, Debug, Copy, Deserialize, Serialize, PartialEq)]
/// Device for using candle.
///
/// This enum is added because [`candle_core::Device`] does not support serialization.
pub enum Device {
    /// The main CPU device.
    Cpu,

    /// The main GPU device.
    Cuda(usize),
}

impl Default for Device {
    fn default() -> Self {
        Self::Cpu
    }
}

impl TryFrom<Device> for candle_core::Device {
    type Error = candle_core::Error;

    fn try_from(device: Device) -> Result<Self, Self::Error> {
        match device {
            Device::Cpu => Ok(candle_core::Device::Cpu),
            Device::Cuda(n) => candle_core::Device::new_cuda(n),
        }
    }
}
