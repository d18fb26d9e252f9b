use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use scanbench_3d::{pointcloud::PointCloud, pose::Rigid3};
use thiserror::Error;

use crate::block_tsdf::BlockTsdfScanMatcher;
use crate::config::{ConfigError, ScanMatcherConfig};
use crate::dense_tsdf::DenseTsdfScanMatcher;
use crate::esdf::EsdfScanMatcher;
use crate::probability_grid::ProbabilityGridScanMatcher;
use crate::publish::{publish_best_effort, CloudPublisher};
use crate::solver::SolverError;
use crate::summary::SolverSummary;

/// Frame the input clouds are published in.
pub const WORLD_FRAME: &str = "world";

/// Errors that prevent a matcher from producing an estimate.
#[derive(Debug, Error)]
pub enum MatcherError {
    /// The input cloud has no points.
    #[error("cannot match an empty point cloud")]
    EmptyPointCloud,

    /// The shared configuration is invalid.
    #[error("invalid matcher configuration: {0}")]
    Config(#[from] ConfigError),

    /// The solver could not start.
    #[error("solver error: {0}")]
    Solver(#[from] SolverError),
}

/// Outcome of one matcher evaluation.
#[derive(Debug, Clone)]
pub struct MatchResult {
    /// Refined pose estimate.
    pub pose: Rigid3,
    /// Report of the solver run that produced the estimate.
    pub summary: SolverSummary,
}

/// A scan matcher that can be evaluated against a synthetic scene.
///
/// Implementations build their map from `cloud` at the ground truth pose and align the same
/// cloud starting from `initial_pose`. Neither the cloud nor the configuration can be
/// modified by a matcher.
pub trait ScanMatcher {
    /// Identifier written to result logs.
    fn name(&self) -> &str;

    /// Refine `initial_pose`.
    fn evaluate(
        &self,
        cloud: &PointCloud,
        initial_pose: &Rigid3,
        config: &ScanMatcherConfig,
    ) -> Result<MatchResult, MatcherError>;
}

/// Check the preconditions of [`ScanMatcher::evaluate`] and publish the cloud if requested.
pub(crate) fn prepare(
    cloud: &PointCloud,
    config: &ScanMatcherConfig,
    publisher: Option<&dyn CloudPublisher>,
) -> Result<(), MatcherError> {
    if cloud.is_empty() {
        return Err(MatcherError::EmptyPointCloud);
    }
    config.validate()?;
    if config.publish_cloud {
        if let Some(publisher) = publisher {
            publish_best_effort(publisher, cloud, WORLD_FRAME);
        }
    }
    Ok(())
}

/// The matchers shipped with the benchmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatcherKind {
    /// Occupancy probability grid, Levenberg-Marquardt.
    ProbabilityGrid,
    /// TSDF in a dense volume, Levenberg-Marquardt.
    DenseTsdf,
    /// TSDF in hashed blocks, Gauss-Newton.
    BlockTsdf,
    /// Clamped Euclidean distance field, Gauss-Newton.
    Esdf,
}

impl MatcherKind {
    /// Every matcher, in the order they are run in a trial.
    pub const ALL: [MatcherKind; 4] = [
        MatcherKind::ProbabilityGrid,
        MatcherKind::DenseTsdf,
        MatcherKind::BlockTsdf,
        MatcherKind::Esdf,
    ];

    /// Identifier of the matcher in result logs.
    pub fn name(&self) -> &'static str {
        match self {
            MatcherKind::ProbabilityGrid => ProbabilityGridScanMatcher::NAME,
            MatcherKind::DenseTsdf => DenseTsdfScanMatcher::NAME,
            MatcherKind::BlockTsdf => BlockTsdfScanMatcher::NAME,
            MatcherKind::Esdf => EsdfScanMatcher::NAME,
        }
    }

    /// Build a fresh matcher.
    pub fn build(&self, publisher: Option<Arc<dyn CloudPublisher>>) -> Box<dyn ScanMatcher> {
        match self {
            MatcherKind::ProbabilityGrid => Box::new(ProbabilityGridScanMatcher::new(publisher)),
            MatcherKind::DenseTsdf => Box::new(DenseTsdfScanMatcher::new(publisher)),
            MatcherKind::BlockTsdf => Box::new(BlockTsdfScanMatcher::new(publisher)),
            MatcherKind::Esdf => Box::new(EsdfScanMatcher::new(publisher)),
        }
    }
}

impl fmt::Display for MatcherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MatcherKind {
    type Err = String;

    /// Accepts the log identifier or a short snake case alias.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s {
            "probability_grid" => MatcherKind::ProbabilityGrid,
            "dense_tsdf" => MatcherKind::DenseTsdf,
            "block_tsdf" => MatcherKind::BlockTsdf,
            "esdf" => MatcherKind::Esdf,
            other => MatcherKind::ALL
                .into_iter()
                .find(|kind| kind.name() == other)
                .ok_or_else(|| format!("unknown scan matcher '{other}'"))?,
        };
        Ok(kind)
    }
}
