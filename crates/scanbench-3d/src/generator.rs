use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pointcloud::PointCloud;

/// Errors raised when a scene cannot be generated.
#[derive(Debug, Error, PartialEq)]
pub enum GeneratorError {
    /// The sampling resolution is not a positive finite number.
    #[error("sampling resolution must be positive and finite, got {0}")]
    InvalidResolution(f32),

    /// One of the shape extents is not a positive finite number.
    #[error("extent along {axis} must be positive and finite, got {value}")]
    InvalidExtent {
        /// Axis label of the offending extent.
        axis: char,
        /// The offending value.
        value: f32,
    },

    /// An extent holds more sampling intervals than the generator allows.
    #[error("extent along {axis} spans {intervals} sampling intervals, at most {MAX_AXIS_INTERVALS} allowed")]
    TooManySamples {
        /// Axis label of the offending extent.
        axis: char,
        /// Number of intervals the extent would be split into.
        intervals: f32,
    },
}

/// Largest number of sampling intervals along one edge of a shape.
pub const MAX_AXIS_INTERVALS: usize = 4096;

/// Parametric solids the generator can sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Shape {
    /// An axis aligned cuboid centred at the origin.
    Cuboid {
        /// Edge lengths along x, y and z.
        size: [f32; 3],
    },
}

impl Shape {
    /// Short descriptor written to result logs.
    pub fn name(&self) -> &'static str {
        match self {
            Shape::Cuboid { .. } => "cuboid",
        }
    }

    /// Extents of the shape along x, y and z.
    pub fn size(&self) -> [f32; 3] {
        match self {
            Shape::Cuboid { size } => *size,
        }
    }
}

/// Generates synthetic scans by sampling the surface of parametric solids.
#[derive(Debug, Clone)]
pub struct SceneGenerator {
    resolution: f32,
}

impl SceneGenerator {
    /// Create a generator sampling surfaces every `resolution` units.
    pub fn new(resolution: f32) -> Result<Self, GeneratorError> {
        if !(resolution.is_finite() && resolution > 0.0) {
            return Err(GeneratorError::InvalidResolution(resolution));
        }
        Ok(Self { resolution })
    }

    /// The sampling resolution.
    pub fn resolution(&self) -> f32 {
        self.resolution
    }

    /// Sample the surface of `shape`.
    pub fn generate(&self, shape: &Shape) -> Result<PointCloud, GeneratorError> {
        match shape {
            Shape::Cuboid { size } => self.generate_cuboid(*size),
        }
    }

    /// Sample the six faces of a cuboid centred at the origin.
    ///
    /// Each edge is split into `max(1, round(extent / resolution))` intervals, so a resolution
    /// larger than every extent still yields the eight corners. Faces are emitted in the
    /// order -x, +x, -y, +y, -z, +z and no point is emitted twice.
    pub fn generate_cuboid(&self, size: [f32; 3]) -> Result<PointCloud, GeneratorError> {
        for (axis, value) in ['x', 'y', 'z'].into_iter().zip(size) {
            if !(value.is_finite() && value > 0.0) {
                return Err(GeneratorError::InvalidExtent { axis, value });
            }
            let intervals = (value / self.resolution).round();
            if intervals > MAX_AXIS_INTERVALS as f32 {
                return Err(GeneratorError::TooManySamples { axis, intervals });
            }
        }

        let xs = self.axis_samples(size[0]);
        let ys = self.axis_samples(size[1]);
        let zs = self.axis_samples(size[2]);

        let (x_min, x_max) = (xs[0], xs[xs.len() - 1]);
        let (y_min, y_max) = (ys[0], ys[ys.len() - 1]);
        let (z_min, z_max) = (zs[0], zs[zs.len() - 1]);
        let x_inner = &xs[1..xs.len() - 1];
        let y_inner = &ys[1..ys.len() - 1];

        let mut points = Vec::with_capacity(
            2 * ys.len() * zs.len() + 2 * x_inner.len() * zs.len() + 2 * x_inner.len() * y_inner.len(),
        );

        for x in [x_min, x_max] {
            for &y in &ys {
                for &z in &zs {
                    points.push([x, y, z]);
                }
            }
        }

        for y in [y_min, y_max] {
            for &x in x_inner {
                for &z in &zs {
                    points.push([x, y, z]);
                }
            }
        }

        for z in [z_min, z_max] {
            for &x in x_inner {
                for &y in y_inner {
                    points.push([x, y, z]);
                }
            }
        }

        Ok(PointCloud::new(points))
    }

    // sample positions along one edge, both corners included
    fn axis_samples(&self, extent: f32) -> Vec<f32> {
        let intervals = ((extent / self.resolution).round() as usize).max(1);
        let half = 0.5 * extent;
        let step = extent / intervals as f32;
        (0..=intervals)
            .map(|i| {
                if i == intervals {
                    half
                } else {
                    -half + i as f32 * step
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn distance_to_cuboid_surface(p: &[f32; 3], size: [f32; 3]) -> f32 {
        // distance to the closest face for points inside or on the box
        (0..3)
            .map(|i| (0.5 * size[i] - p[i].abs()).abs())
            .fold(f32::INFINITY, f32::min)
    }

    #[test]
    fn test_points_lie_on_surface() -> Result<(), GeneratorError> {
        let resolution = 0.04;
        let size = [3.02, 2.97, 3.0];
        let cloud = SceneGenerator::new(resolution)?.generate(&Shape::Cuboid { size })?;

        assert!(!cloud.is_empty());
        for p in cloud.points() {
            for i in 0..3 {
                assert!(p[i].abs() <= 0.5 * size[i] + 1e-5);
            }
            assert!(distance_to_cuboid_surface(p, size) <= resolution / 2.0);
        }
        Ok(())
    }

    #[test]
    fn test_point_count() -> Result<(), GeneratorError> {
        // 2 intervals per edge: a 3x3x3 lattice without its centre
        let cloud = SceneGenerator::new(0.5)?.generate_cuboid([1.0, 1.0, 1.0])?;
        assert_eq!(cloud.len(), 26);

        // nx = 4, ny = 2, nz = 1
        let cloud = SceneGenerator::new(0.5)?.generate_cuboid([2.0, 1.0, 0.5])?;
        let (nx, ny, nz) = (4, 2, 1);
        let expected =
            2 * (ny + 1) * (nz + 1) + 2 * (nx - 1) * (nz + 1) + 2 * (nx - 1) * (ny - 1);
        assert_eq!(cloud.len(), expected);
        Ok(())
    }

    #[test]
    fn test_no_duplicates() -> Result<(), GeneratorError> {
        let cloud = SceneGenerator::new(0.3)?.generate_cuboid([1.2, 0.9, 1.5])?;
        let mut keys = cloud
            .points()
            .iter()
            .map(|p| p.map(|v| (v * 1000.0).round() as i64))
            .collect::<Vec<_>>();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), cloud.len());
        Ok(())
    }

    #[test]
    fn test_coarse_resolution_yields_corners() -> Result<(), GeneratorError> {
        let size = [1.0, 2.0, 0.5];
        let cloud = SceneGenerator::new(10.0)?.generate_cuboid(size)?;
        assert_eq!(cloud.len(), 8);
        for p in cloud.points() {
            for i in 0..3 {
                assert_eq!(p[i].abs(), 0.5 * size[i]);
            }
        }
        Ok(())
    }

    #[test]
    fn test_deterministic() -> Result<(), GeneratorError> {
        let generator = SceneGenerator::new(0.04)?;
        let shape = Shape::Cuboid {
            size: [4.025, 4.025, 4.025],
        };
        assert_eq!(generator.generate(&shape)?, generator.generate(&shape)?);
        Ok(())
    }

    #[test]
    fn test_invalid_parameters() {
        assert_eq!(
            SceneGenerator::new(0.0).err(),
            Some(GeneratorError::InvalidResolution(0.0))
        );
        assert!(SceneGenerator::new(f32::NAN).is_err());

        let generator = SceneGenerator::new(0.1).expect("valid resolution");
        assert_eq!(
            generator.generate_cuboid([1.0, -1.0, 1.0]).err(),
            Some(GeneratorError::InvalidExtent {
                axis: 'y',
                value: -1.0
            })
        );
    }

    #[test]
    fn test_too_many_samples() -> Result<(), GeneratorError> {
        let generator = SceneGenerator::new(1e-6)?;
        assert!(matches!(
            generator.generate_cuboid([1.0, 1.0, 1.0]),
            Err(GeneratorError::TooManySamples { axis: 'x', .. })
        ));

        let generator = SceneGenerator::new(1.0)?;
        let size = [MAX_AXIS_INTERVALS as f32, 1.0, 1.0];
        assert!(generator.generate_cuboid(size).is_ok());
        Ok(())
    }

    #[test]
    fn test_shape_descriptor() {
        let shape = Shape::Cuboid {
            size: [1.0, 2.0, 3.0],
        };
        assert_eq!(shape.name(), "cuboid");
        assert_eq!(shape.size(), [1.0, 2.0, 3.0]);
    }
}
