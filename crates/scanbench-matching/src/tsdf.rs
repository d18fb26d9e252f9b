use glam::{DVec3, IVec3};
use scanbench_3d::pointcloud::PointCloud;

use crate::field::{voxel_center, voxel_index, VoxelField};

/// Truncated signed distance and its accumulated weight.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TsdfVoxel {
    /// Running average of the projective signed distance.
    pub distance: f32,
    /// Number of observations fused into `distance`.
    pub weight: f32,
}

impl TsdfVoxel {
    /// Fuse one signed distance observation with unit weight.
    #[inline]
    pub fn fuse(&mut self, distance: f32) {
        let weight = self.weight + 1.0;
        self.distance = (self.distance * self.weight + distance) / weight;
        self.weight = weight;
    }

    /// Whether any observation reached this voxel.
    #[inline]
    pub fn is_observed(&self) -> bool {
        self.weight > 0.0
    }
}

/// Backing store of TSDF voxels.
pub trait TsdfStorage {
    /// Voxel at `index`, if it has been allocated.
    fn voxel(&self, index: IVec3) -> Option<&TsdfVoxel>;

    /// Voxel at `index` for writing. Storages that cannot hold `index` return `None`.
    fn voxel_mut(&mut self, index: IVec3) -> Option<&mut TsdfVoxel>;
}

/// A truncated signed distance field integrated by casting rays from a sensor origin.
#[derive(Debug, Clone)]
pub struct TsdfMap<S> {
    storage: S,
    resolution: f64,
    truncation: f64,
}

impl<S: TsdfStorage> TsdfMap<S> {
    /// Wrap `storage` whose voxels have edge length `resolution`.
    pub fn new(storage: S, resolution: f64, truncation: f64) -> Self {
        Self {
            storage,
            resolution,
            truncation,
        }
    }

    /// Truncation distance of the field.
    pub fn truncation(&self) -> f64 {
        self.truncation
    }

    /// The voxel store.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Integrate `cloud`, observed from `origin`, into the field.
    ///
    /// Every voxel within the truncation band around a point along its viewing ray receives the
    /// clamped projective distance `|p - o| - (c - o) . d`, positive between the sensor and the
    /// surface.
    pub fn integrate(&mut self, cloud: &PointCloud, origin: DVec3) {
        let step = 0.5 * self.resolution;
        let truncation = self.truncation;

        for point in cloud.iter_vec3() {
            let ray = point.as_dvec3() - origin;
            let depth = ray.length();
            if depth <= f64::EPSILON {
                continue;
            }
            let direction = ray / depth;

            let start = (depth - truncation).max(0.0);
            let end = depth + truncation;
            let num_samples = ((end - start) / step).ceil() as usize + 1;

            let mut previous = None;
            for i in 0..num_samples {
                let t = (start + i as f64 * step).min(end);
                let index = voxel_index(origin + direction * t, self.resolution);
                if previous == Some(index) {
                    continue;
                }
                previous = Some(index);

                let along = (voxel_center(index, self.resolution) - origin).dot(direction);
                let sdf = (depth - along).clamp(-truncation, truncation);
                if let Some(voxel) = self.storage.voxel_mut(index) {
                    voxel.fuse(sdf as f32);
                }
            }
        }
    }
}

impl<S: TsdfStorage> VoxelField for TsdfMap<S> {
    fn resolution(&self) -> f64 {
        self.resolution
    }

    fn voxel_value(&self, index: IVec3) -> f32 {
        match self.storage.voxel(index) {
            Some(voxel) if voxel.is_observed() => voxel.distance,
            _ => self.truncation as f32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MapStorage(HashMap<IVec3, TsdfVoxel>);

    impl TsdfStorage for MapStorage {
        fn voxel(&self, index: IVec3) -> Option<&TsdfVoxel> {
            self.0.get(&index)
        }

        fn voxel_mut(&mut self, index: IVec3) -> Option<&mut TsdfVoxel> {
            Some(self.0.entry(index).or_default())
        }
    }

    #[test]
    fn test_fuse_averages() {
        let mut voxel = TsdfVoxel::default();
        assert!(!voxel.is_observed());
        voxel.fuse(0.2);
        voxel.fuse(-0.1);
        assert_relative_eq!(voxel.distance, 0.05, epsilon = 1e-6);
        assert_relative_eq!(voxel.weight, 2.0);
    }

    #[test]
    fn test_integrate_single_ray() {
        let mut map = TsdfMap::new(MapStorage::default(), 0.1, 0.3);
        map.integrate(&PointCloud::new(vec![[1.0, 0.0, 0.0]]), DVec3::ZERO);

        // in front of the surface, on it, and behind it
        assert_relative_eq!(map.voxel_value(IVec3::new(8, 0, 0)), 0.2, epsilon = 1e-5);
        assert_relative_eq!(map.voxel_value(IVec3::new(10, 0, 0)), 0.0, epsilon = 1e-5);
        assert_relative_eq!(map.voxel_value(IVec3::new(12, 0, 0)), -0.2, epsilon = 1e-5);

        // outside the truncation band nothing is observed
        assert!(map.storage().voxel(IVec3::new(5, 0, 0)).is_none());
        assert_relative_eq!(map.voxel_value(IVec3::new(5, 0, 0)), 0.3);
        assert_relative_eq!(map.voxel_value(IVec3::new(0, 4, 0)), 0.3);
    }

    #[test]
    fn test_point_at_origin_is_skipped() {
        let mut map = TsdfMap::new(MapStorage::default(), 0.1, 0.3);
        map.integrate(&PointCloud::new(vec![[0.0, 0.0, 0.0]]), DVec3::ZERO);
        assert!(map.storage().0.is_empty());
    }
}
