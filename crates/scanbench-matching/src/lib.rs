#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! # Scan matching
//!
//! Every matcher implements [`ScanMatcher`]: it builds a map from the point cloud at the
//! ground truth pose and aligns the same cloud starting from an initial pose estimate.
//!
//! ```rust
//! use scanbench_3d::{generator::SceneGenerator, pose::Rigid3};
//! use scanbench_matching::{MatcherKind, ScanMatcherConfig};
//!
//! let cloud = SceneGenerator::new(0.1)?.generate_cuboid([1.0, 1.0, 1.0])?;
//! let config = ScanMatcherConfig {
//!     publish_cloud: false,
//!     ..Default::default()
//! };
//!
//! let matcher = MatcherKind::Esdf.build(None);
//! let initial_pose = Rigid3::from_translation([0.05, 0.0, 0.0].into());
//! let result = matcher.evaluate(&cloud, &initial_pose, &config)?;
//! println!("{}", result.summary.brief_report());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

/// Shared matcher configuration.
pub mod config;

/// Interpolated voxel fields and the residuals evaluated on them.
pub mod field;

/// The evaluation contract and the registry of matchers.
pub mod matcher;

/// Visualization sinks for point clouds.
pub mod publish;

/// Nonlinear least squares solvers over a 6-DoF pose.
pub mod solver;

/// Solver reports.
pub mod summary;

/// Occupancy probability grid matcher.
pub mod probability_grid;

/// Truncated signed distance field integration shared by the TSDF matchers.
pub mod tsdf;

/// TSDF matcher backed by one dense volume.
pub mod dense_tsdf;

/// TSDF matcher backed by hashed voxel blocks.
pub mod block_tsdf;

/// Euclidean distance field matcher.
pub mod esdf;

mod volume;

pub use config::{ConfigError, ScanMatcherConfig};
pub use matcher::{MatchResult, MatcherError, MatcherKind, ScanMatcher};
pub use publish::{CloudPublisher, LogPublisher, PublishError};
pub use summary::{SolverSummary, TerminationType};
