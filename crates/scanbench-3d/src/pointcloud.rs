use glam::Vec3;

/// A point cloud holding single precision 3D points.
///
/// The cloud is built once and shared read-only afterwards, there is no API to mutate
/// the points of an existing cloud.
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloud {
    // The points in the point cloud.
    points: Vec<[f32; 3]>,
}

impl PointCloud {
    /// Create a new point cloud from points.
    pub fn new(points: Vec<[f32; 3]>) -> Self {
        Self { points }
    }

    /// Get the number of points in the point cloud.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the point cloud is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Get as reference the points in the point cloud.
    pub fn points(&self) -> &[[f32; 3]] {
        &self.points
    }

    /// Iterate the points as [`Vec3`].
    pub fn iter_vec3(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.points.iter().map(|p| Vec3::from_array(*p))
    }

    /// Get the minimum bound of the point cloud.
    pub fn get_min_bound(&self) -> Vec3 {
        if self.points.is_empty() {
            return Vec3::ZERO;
        }
        self.iter_vec3().fold(Vec3::splat(f32::INFINITY), Vec3::min)
    }

    /// Get the maximum bound of the point cloud.
    pub fn get_max_bound(&self) -> Vec3 {
        if self.points.is_empty() {
            return Vec3::ZERO;
        }
        self.iter_vec3().fold(Vec3::splat(f32::NEG_INFINITY), Vec3::max)
    }
}
