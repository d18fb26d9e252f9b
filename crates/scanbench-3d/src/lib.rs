#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Synthetic scene generation.
pub mod generator;

/// Point cloud container.
pub mod pointcloud;

/// Rigid transforms in 3D.
pub mod pose;
