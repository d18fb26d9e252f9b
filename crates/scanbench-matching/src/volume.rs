use glam::{DVec3, IVec3};

/// A bounded dense grid of voxels addressed by integer voxel index.
#[derive(Debug, Clone)]
pub(crate) struct DenseVolume<T> {
    min_index: IVec3,
    dims: [usize; 3],
    data: Vec<T>,
}

impl<T: Clone> DenseVolume<T> {
    /// Allocate a volume spanning `min_index..=max_index` filled with `value`.
    pub(crate) fn new(min_index: IVec3, max_index: IVec3, value: T) -> Self {
        let extent = (max_index - min_index + IVec3::ONE).max(IVec3::ONE);
        let dims = [extent.x as usize, extent.y as usize, extent.z as usize];
        Self {
            min_index,
            dims,
            data: vec![value; dims[0] * dims[1] * dims[2]],
        }
    }
}

/// Voxel index range covering the axis aligned box `[min, max]` plus `margin` on every side.
pub(crate) fn bounds(min: DVec3, max: DVec3, margin: f64, resolution: f64) -> (IVec3, IVec3) {
    let lo = ((min - DVec3::splat(margin)) / resolution).floor().as_ivec3();
    let hi = ((max + DVec3::splat(margin)) / resolution).ceil().as_ivec3();
    (lo, hi)
}

impl<T> DenseVolume<T> {
    pub(crate) fn dims(&self) -> [usize; 3] {
        self.dims
    }

    fn offset(&self, index: IVec3) -> Option<usize> {
        let local = index - self.min_index;
        if local.min_element() < 0 {
            return None;
        }
        let (x, y, z) = (local.x as usize, local.y as usize, local.z as usize);
        if x >= self.dims[0] || y >= self.dims[1] || z >= self.dims[2] {
            return None;
        }
        Some((z * self.dims[1] + y) * self.dims[0] + x)
    }

    pub(crate) fn get(&self, index: IVec3) -> Option<&T> {
        self.offset(index).map(|i| &self.data[i])
    }

    pub(crate) fn get_mut(&mut self, index: IVec3) -> Option<&mut T> {
        self.offset(index).map(|i| &mut self.data[i])
    }

    /// Iterate every voxel index of the volume together with its value.
    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (IVec3, &mut T)> {
        let min_index = self.min_index;
        let [nx, ny, _] = self.dims;
        self.data.iter_mut().enumerate().map(move |(i, value)| {
            let x = i % nx;
            let y = (i / nx) % ny;
            let z = i / (nx * ny);
            (min_index + IVec3::new(x as i32, y as i32, z as i32), value)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indexing() {
        let mut volume = DenseVolume::new(IVec3::new(-1, -1, -1), IVec3::new(1, 2, 3), 0u32);
        assert_eq!(volume.dims(), [3, 4, 5]);
        assert!(volume.get(IVec3::new(-2, 0, 0)).is_none());
        assert!(volume.get(IVec3::new(1, 2, 4)).is_none());

        if let Some(v) = volume.get_mut(IVec3::new(1, 2, 3)) {
            *v = 7;
        }
        assert_eq!(volume.get(IVec3::new(1, 2, 3)), Some(&7));

        let visited = volume
            .iter_mut()
            .filter(|(_, v)| **v == 7)
            .map(|(index, _)| index)
            .collect::<Vec<_>>();
        assert_eq!(visited, vec![IVec3::new(1, 2, 3)]);
    }

    #[test]
    fn test_bounds() {
        let (lo, hi) = bounds(
            DVec3::new(-1.0, -1.0, -1.0),
            DVec3::new(1.0, 1.0, 1.0),
            0.25,
            0.5,
        );
        assert_eq!(lo, IVec3::new(-3, -3, -3));
        assert_eq!(hi, IVec3::new(3, 3, 3));
    }
}
