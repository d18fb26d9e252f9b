use std::collections::HashMap;
use std::sync::Arc;

use glam::{DVec3, IVec3};
use scanbench_3d::{pointcloud::PointCloud, pose::Rigid3};

use crate::config::ScanMatcherConfig;
use crate::field::FieldResiduals;
use crate::matcher::{prepare, MatchResult, MatcherError, ScanMatcher};
use crate::publish::CloudPublisher;
use crate::solver::{GaussNewton, SolverOptions};
use crate::tsdf::{TsdfMap, TsdfStorage, TsdfVoxel};

/// Number of voxels along each edge of a block.
pub const BLOCK_SIZE: i32 = 8;

const BLOCK_VOXELS: usize = (BLOCK_SIZE * BLOCK_SIZE * BLOCK_SIZE) as usize;

type Block = Box<[TsdfVoxel; BLOCK_VOXELS]>;

/// TSDF voxels allocated on demand in cubic blocks keyed by block index.
#[derive(Debug, Clone, Default)]
pub struct BlockTsdfStorage {
    blocks: HashMap<IVec3, Block>,
}

impl BlockTsdfStorage {
    /// An empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of allocated blocks.
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    fn split(index: IVec3) -> (IVec3, usize) {
        let block = index.div_euclid(IVec3::splat(BLOCK_SIZE));
        let local = index.rem_euclid(IVec3::splat(BLOCK_SIZE));
        let offset = ((local.z * BLOCK_SIZE + local.y) * BLOCK_SIZE + local.x) as usize;
        (block, offset)
    }
}

impl TsdfStorage for BlockTsdfStorage {
    fn voxel(&self, index: IVec3) -> Option<&TsdfVoxel> {
        let (block, offset) = Self::split(index);
        self.blocks.get(&block).map(|voxels| &voxels[offset])
    }

    fn voxel_mut(&mut self, index: IVec3) -> Option<&mut TsdfVoxel> {
        let (block, offset) = Self::split(index);
        let voxels = self
            .blocks
            .entry(block)
            .or_insert_with(|| Box::new([TsdfVoxel::default(); BLOCK_VOXELS]));
        Some(&mut voxels[offset])
    }
}

/// A TSDF over hashed blocks.
pub type BlockTsdfMap = TsdfMap<BlockTsdfStorage>;

/// Integrate `cloud` seen from `origin` into freshly allocated blocks.
pub fn build_block_tsdf(cloud: &PointCloud, origin: DVec3, resolution: f64, truncation: f64) -> BlockTsdfMap {
    let mut map = TsdfMap::new(BlockTsdfStorage::new(), resolution, truncation);
    map.integrate(cloud, origin);
    log::debug!("block tsdf with {} blocks", map.storage().num_blocks());
    map
}

/// Scan matcher minimizing the TSDF at the transformed points with Gauss-Newton.
pub struct BlockTsdfScanMatcher {
    publisher: Option<Arc<dyn CloudPublisher>>,
}

impl BlockTsdfScanMatcher {
    /// Identifier in result logs.
    pub const NAME: &'static str = "BlockTsdfScanMatcher";

    /// Create a matcher publishing its input through `publisher`.
    pub fn new(publisher: Option<Arc<dyn CloudPublisher>>) -> Self {
        Self { publisher }
    }
}

impl ScanMatcher for BlockTsdfScanMatcher {
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

        let map = build_block_tsdf(cloud, DVec3::ZERO, config.resolution, config.truncation_distance);
        let problem = FieldResiduals::new(&map, cloud);
        let solver = GaussNewton::new(SolverOptions::from(config));
        let (pose, summary) = solver.minimize(&problem, initial_pose)?;

        Ok(MatchResult { pose, summary })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dense_tsdf::build_dense_tsdf;
    use crate::field::VoxelField;
    use scanbench_3d::generator::SceneGenerator;

    #[test]
    fn test_split_negative_indices() {
        assert_eq!(BlockTsdfStorage::split(IVec3::new(0, 0, 0)), (IVec3::ZERO, 0));
        assert_eq!(BlockTsdfStorage::split(IVec3::new(-1, 0, 0)), (IVec3::new(-1, 0, 0), 7));
        assert_eq!(BlockTsdfStorage::split(IVec3::new(9, 8, -8)), (IVec3::new(1, 1, -1), 1));
    }

    #[test]
    fn test_allocates_on_write() {
        let mut storage = BlockTsdfStorage::new();
        assert!(storage.voxel(IVec3::new(3, -4, 20)).is_none());
        if let Some(voxel) = storage.voxel_mut(IVec3::new(3, -4, 20)) {
            voxel.fuse(0.1);
        }
        assert_eq!(storage.num_blocks(), 1);
        assert!(storage.voxel(IVec3::new(3, -4, 20)).is_some_and(|v| v.is_observed()));
        assert!(storage.voxel(IVec3::new(4, -4, 20)).is_some_and(|v| !v.is_observed()));
    }

    #[test]
    fn test_same_field_as_dense() -> Result<(), Box<dyn std::error::Error>> {
        let cloud = SceneGenerator::new(0.1)?.generate_cuboid([1.0, 1.0, 1.0])?;
        let block = build_block_tsdf(&cloud, DVec3::ZERO, 0.1, 0.3);
        let dense = build_dense_tsdf(&cloud, DVec3::ZERO, 0.1, 0.3);

        for x in -8..=8 {
            for y in -8..=8 {
                let index = IVec3::new(x, y, 2);
                assert_eq!(block.voxel_value(index), dense.voxel_value(index));
            }
        }
        Ok(())
    }

    #[test]
    fn test_recovers_translation() -> Result<(), Box<dyn std::error::Error>> {
        let cloud = SceneGenerator::new(0.1)?.generate_cuboid([2.0, 2.0, 2.0])?;
        let config = ScanMatcherConfig {
            publish_cloud: false,
            ..Default::default()
        };
        let initial = Rigid3::from_translation(DVec3::new(-0.08, 0.1, 0.0));

        let result = BlockTsdfScanMatcher::new(None).evaluate(&cloud, &initial, &config)?;

        assert!(result.pose.is_finite());
        assert!(result.pose.translation().length() < 0.5 * initial.translation().length());
        Ok(())
    }
}
