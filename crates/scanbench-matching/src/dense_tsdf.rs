use std::sync::Arc;

use glam::{DVec3, IVec3};
use scanbench_3d::{pointcloud::PointCloud, pose::Rigid3};

use crate::config::ScanMatcherConfig;
use crate::field::FieldResiduals;
use crate::matcher::{prepare, MatchResult, MatcherError, ScanMatcher};
use crate::publish::CloudPublisher;
use crate::solver::{LevenbergMarquardt, SolverOptions};
use crate::tsdf::{TsdfMap, TsdfStorage, TsdfVoxel};
use crate::volume::{bounds, DenseVolume};

/// TSDF voxels stored in one preallocated volume.
#[derive(Debug, Clone)]
pub struct DenseTsdfStorage {
    volume: DenseVolume<TsdfVoxel>,
}

impl DenseTsdfStorage {
    /// Allocate unobserved voxels spanning `min_index..=max_index`.
    pub fn new(min_index: IVec3, max_index: IVec3) -> Self {
        Self {
            volume: DenseVolume::new(min_index, max_index, TsdfVoxel::default()),
        }
    }

    /// Number of voxels along each axis.
    pub fn dims(&self) -> [usize; 3] {
        self.volume.dims()
    }
}

impl TsdfStorage for DenseTsdfStorage {
    fn voxel(&self, index: IVec3) -> Option<&TsdfVoxel> {
        self.volume.get(index)
    }

    fn voxel_mut(&mut self, index: IVec3) -> Option<&mut TsdfVoxel> {
        self.volume.get_mut(index)
    }
}

/// A TSDF over a dense volume.
pub type DenseTsdfMap = TsdfMap<DenseTsdfStorage>;

/// Integrate `cloud` seen from `origin` into a dense volume sized to hold the whole band.
pub fn build_dense_tsdf(cloud: &PointCloud, origin: DVec3, resolution: f64, truncation: f64) -> DenseTsdfMap {
    let min = cloud.get_min_bound().as_dvec3().min(origin);
    let max = cloud.get_max_bound().as_dvec3().max(origin);
    let (lo, hi) = bounds(min, max, truncation + 2.0 * resolution, resolution);

    let storage = DenseTsdfStorage::new(lo, hi);
    log::debug!("dense tsdf volume of {:?} voxels", storage.dims());

    let mut map = TsdfMap::new(storage, resolution, truncation);
    map.integrate(cloud, origin);
    map
}

/// Scan matcher minimizing the TSDF at the transformed points with Levenberg-Marquardt.
pub struct DenseTsdfScanMatcher {
    publisher: Option<Arc<dyn CloudPublisher>>,
}

impl DenseTsdfScanMatcher {
    /// Identifier in result logs.
    pub const NAME: &'static str = "DenseTsdfScanMatcher";

    /// Create a matcher publishing its input through `publisher`.
    pub fn new(publisher: Option<Arc<dyn CloudPublisher>>) -> Self {
        Self { publisher }
    }
}

impl ScanMatcher for DenseTsdfScanMatcher {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn evaluate(
        &self,
        cloud: &PointCloud,
        initial_pose: &Rigid3,
        config: &ScanMatcherConfig,
    ) -> Result<MatchResult, MatcherError> {
        prepare(cloud, config, self.publisher.as_deref())?;

        let map = build_dense_tsdf(cloud, DVec3::ZERO, config.resolution, config.truncation_distance);
        let problem = FieldResiduals::new(&map, cloud);
        let solver = LevenbergMarquardt::new(SolverOptions::from(config));
        let (pose, summary) = solver.minimize(&problem, initial_pose)?;

        Ok(MatchResult { pose, summary })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::VoxelField;
    use scanbench_3d::generator::SceneGenerator;

    fn config() -> ScanMatcherConfig {
        ScanMatcherConfig {
            publish_cloud: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_volume_covers_band() {
        let cloud = PointCloud::new(vec![[1.0, 0.0, 0.0]]);
        let map = build_dense_tsdf(&cloud, DVec3::ZERO, 0.1, 0.3);
        assert!(map.storage().voxel(IVec3::new(13, 0, 0)).is_some());
        assert!(map.storage().voxel(IVec3::new(-5, 0, 0)).is_some());
        assert!(map.voxel_value(IVec3::new(10, 0, 0)).abs() < 1e-5);
    }

    #[test]
    fn test_recovers_translation() -> Result<(), Box<dyn std::error::Error>> {
        let cloud = SceneGenerator::new(0.1)?.generate_cuboid([2.0, 2.0, 2.0])?;
        let initial = Rigid3::from_translation(DVec3::new(0.1, -0.05, 0.05));

        let result = DenseTsdfScanMatcher::new(None).evaluate(&cloud, &initial, &config())?;

        assert!(result.pose.is_finite());
        assert!(result.summary.num_iterations() > 0);
        assert!(result.pose.translation().length() < 0.5 * initial.translation().length());
        Ok(())
    }

    #[test]
    fn test_empty_cloud() {
        let result = DenseTsdfScanMatcher::new(None).evaluate(&PointCloud::new(Vec::new()), &Rigid3::identity(), &config());
        assert!(matches!(result, Err(MatcherError::EmptyPointCloud)));
    }
}
