use std::sync::Arc;

use glam::IVec3;
use kiddo::immutable::float::kdtree::ImmutableKdTree;
use scanbench_3d::{pointcloud::PointCloud, pose::Rigid3};

use crate::config::ScanMatcherConfig;
use crate::field::{voxel_center, FieldResiduals, VoxelField};
use crate::matcher::{prepare, MatchResult, MatcherError, ScanMatcher};
use crate::publish::CloudPublisher;
use crate::solver::{GaussNewton, SolverOptions};
use crate::volume::{bounds, DenseVolume};

/// Unsigned Euclidean distance to the closest surface point, clamped at a maximum distance.
#[derive(Debug, Clone)]
pub struct EsdfMap {
    volume: DenseVolume<f32>,
    resolution: f64,
    max_distance: f32,
}

impl EsdfMap {
    /// Compute the field of `cloud` in a volume extending `max_distance` past its bounds.
    pub fn from_cloud(cloud: &PointCloud, resolution: f64, max_distance: f64) -> Self {
        let max_distance_f32 = max_distance as f32;
        let (lo, hi) = bounds(
            cloud.get_min_bound().as_dvec3(),
            cloud.get_max_bound().as_dvec3(),
            max_distance + 2.0 * resolution,
            resolution,
        );
        let mut volume = DenseVolume::new(lo, hi, max_distance_f32);
        log::debug!("esdf volume of {:?} voxels", volume.dims());

        if !cloud.is_empty() {
            let kdtree: ImmutableKdTree<f32, u32, 3, 32> = ImmutableKdTree::new_from_slice(cloud.points());
            for (index, distance) in volume.iter_mut() {
                let center = voxel_center(index, resolution).as_vec3().to_array();
                let nearest = kdtree.nearest_one::<kiddo::SquaredEuclidean>(&center);
                *distance = nearest.distance.sqrt().min(max_distance_f32);
            }
        }

        Self {
            volume,
            resolution,
            max_distance: max_distance_f32,
        }
    }

    /// Distance at which the field saturates.
    pub fn max_distance(&self) -> f32 {
        self.max_distance
    }
}

impl VoxelField for EsdfMap {
    fn resolution(&self) -> f64 {
        self.resolution
    }

    fn voxel_value(&self, index: IVec3) -> f32 {
        self.volume.get(index).copied().unwrap_or(self.max_distance)
    }
}

/// Scan matcher minimizing the distance field at the transformed points with Gauss-Newton.
pub struct EsdfScanMatcher {
    publisher: Option<Arc<dyn CloudPublisher>>,
}

impl EsdfScanMatcher {
    /// Identifier in result logs.
    pub const NAME: &'static str = "EsdfScanMatcher";

    /// Create a matcher publishing its input through `publisher`.
    pub fn new(publisher: Option<Arc<dyn CloudPublisher>>) -> Self {
        Self { publisher }
    }
}

impl ScanMatcher for EsdfScanMatcher {
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

        let map = EsdfMap::from_cloud(cloud, config.resolution, config.esdf_distance);
        let problem = FieldResiduals::new(&map, cloud);
        let solver = GaussNewton::new(SolverOptions::from(config));
        let (pose, summary) = solver.minimize(&problem, initial_pose)?;

        Ok(MatchResult { pose, summary })
    }
}
