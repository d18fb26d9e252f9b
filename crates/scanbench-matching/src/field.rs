//! Trilinear interpolation of voxel fields and point-to-field residuals.
//!
//! Voxel `i` is centred at `i * resolution`, so a surface lying on a multiple of the
//! resolution passes exactly through voxel centres.

use glam::{DVec3, IVec3};
use scanbench_3d::{pointcloud::PointCloud, pose::Rigid3};

use crate::solver::{NormalEquations, PoseProblem};

/// A scalar field sampled at voxel centres.
pub trait VoxelField {
    /// Edge length of the voxels.
    fn resolution(&self) -> f64;

    /// Residual value stored at the centre of voxel `index`.
    ///
    /// Unobserved voxels return the representation's "far" value.
    fn voxel_value(&self, index: IVec3) -> f32;
}

/// Index of the voxel containing `point`.
#[inline]
pub fn voxel_index(point: DVec3, resolution: f64) -> IVec3 {
    (point / resolution).round().as_ivec3()
}

/// Centre of voxel `index`.
#[inline]
pub fn voxel_center(index: IVec3, resolution: f64) -> DVec3 {
    index.as_dvec3() * resolution
}

/// Trilinear interpolation of `field` at `point`.
///
/// Returns the interpolated value and its gradient with respect to `point`.
pub fn interpolate<F: VoxelField + ?Sized>(field: &F, point: DVec3) -> (f64, DVec3) {
    let resolution = field.resolution();
    let q = point / resolution;
    let base = q.floor();
    let frac = q - base;
    let base = base.as_ivec3();

    let mut value = 0.0;
    let mut gradient = DVec3::ZERO;
    for dz in 0..2 {
        for dy in 0..2 {
            for dx in 0..2 {
                let c = field.voxel_value(base + IVec3::new(dx, dy, dz)) as f64;
                let (wx, gx) = weight(frac.x, dx);
                let (wy, gy) = weight(frac.y, dy);
                let (wz, gz) = weight(frac.z, dz);
                value += wx * wy * wz * c;
                gradient += DVec3::new(gx * wy * wz, wx * gy * wz, wx * wy * gz) * c;
            }
        }
    }

    (value, gradient / resolution)
}

// linear weight of a corner and its derivative with respect to the fractional coordinate
#[inline]
fn weight(frac: f64, corner: i32) -> (f64, f64) {
    if corner == 1 {
        (frac, 1.0)
    } else {
        (1.0 - frac, -1.0)
    }
}

/// Least squares problem aligning a point cloud to a voxel field.
///
/// Each point contributes the residual `field(pose * point)`; the Jacobian with respect to
/// the left perturbation `[dt, dr]` of the pose is `[g, (R p) x g]` with `g` the field gradient.
pub struct FieldResiduals<'a, F: ?Sized> {
    field: &'a F,
    cloud: &'a PointCloud,
}

impl<'a, F: VoxelField + ?Sized> FieldResiduals<'a, F> {
    /// Residuals of `cloud` against `field`.
    pub fn new(field: &'a F, cloud: &'a PointCloud) -> Self {
        Self { field, cloud }
    }
}

impl<F: VoxelField + ?Sized> PoseProblem for FieldResiduals<'_, F> {
    fn num_residuals(&self) -> usize {
        self.cloud.len()
    }

    fn cost(&self, pose: &Rigid3) -> f64 {
        0.5 * self
            .cloud
            .iter_vec3()
            .map(|p| {
                let (r, _) = interpolate(self.field, pose.transform_point(p));
                r * r
            })
            .sum::<f64>()
    }

    fn linearize(&self, pose: &Rigid3) -> NormalEquations {
        let mut normal = NormalEquations::default();
        let rotation = pose.rotation();
        let translation = pose.translation();

        for p in self.cloud.iter_vec3() {
            let rotated = rotation * p.as_dvec3();
            let (r, g) = interpolate(self.field, rotated + translation);
            let dr = rotated.cross(g);
            let jacobian = [g.x, g.y, g.z, dr.x, dr.y, dr.z];
            normal.accumulate(&jacobian, r);
        }

        normal
    }
}
