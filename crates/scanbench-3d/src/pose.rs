use std::fmt;

use glam::{DQuat, DVec3, Vec3};

/// A rigid transformation in 3D: rotation followed by translation.
///
/// Poses are expressed relative to the ground truth frame of the scene, so the identity is
/// the ground truth and the translation of any estimate is directly its translation error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rigid3 {
    translation: DVec3,
    rotation: DQuat,
}

impl Default for Rigid3 {
    fn default() -> Self {
        Self::identity()
    }
}

impl Rigid3 {
    /// Create a pose from a translation and a rotation. The rotation is normalized.
    pub fn new(translation: DVec3, rotation: DQuat) -> Self {
        Self {
            translation,
            rotation: rotation.normalize(),
        }
    }

    /// The identity transform.
    pub fn identity() -> Self {
        Self {
            translation: DVec3::ZERO,
            rotation: DQuat::IDENTITY,
        }
    }

    /// A pure translation.
    pub fn from_translation(translation: DVec3) -> Self {
        Self {
            translation,
            rotation: DQuat::IDENTITY,
        }
    }

    /// The translation part.
    #[inline]
    pub fn translation(&self) -> DVec3 {
        self.translation
    }

    /// The rotation part.
    #[inline]
    pub fn rotation(&self) -> DQuat {
        self.rotation
    }

    /// Check that every component of the pose is finite.
    pub fn is_finite(&self) -> bool {
        self.translation.is_finite() && self.rotation.is_finite()
    }

    /// Apply the transform to a single precision point, the result is in double precision.
    #[inline]
    pub fn transform_point(&self, point: Vec3) -> DVec3 {
        self.rotation * point.as_dvec3() + self.translation
    }

    /// Apply a left perturbation `[dt_x, dt_y, dt_z, dr_x, dr_y, dr_z]`.
    ///
    /// The translation is incremented by `dt` and the rotation is pre-multiplied by the
    /// rotation vector `dr`.
    pub fn plus(&self, delta: &[f64; 6]) -> Rigid3 {
        let dt = DVec3::new(delta[0], delta[1], delta[2]);
        let dr = DQuat::from_scaled_axis(DVec3::new(delta[3], delta[4], delta[5]));
        Rigid3::new(self.translation + dt, dr * self.rotation)
    }
}

impl fmt::Display for Rigid3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let t = self.translation;
        let q = self.rotation;
        write!(
            f,
            "{{ t: [{}, {}, {}], q: [{}, {}, {}, {}] }}",
            t.x, t.y, t.z, q.w, q.x, q.y, q.z
        )
    }
}
