//! Task families.
mod point_robot;
pub use point_robot::{PointRobotConfig, PointRobotEnv};
