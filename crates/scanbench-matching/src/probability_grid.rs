use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use glam::{DVec3, IVec3};
use scanbench_3d::{pointcloud::PointCloud, pose::Rigid3};

use crate::config::ScanMatcherConfig;
use crate::field::{voxel_index, FieldResiduals, VoxelField};
use crate::matcher::{prepare, MatchResult, MatcherError, ScanMatcher};
use crate::publish::CloudPublisher;
use crate::solver::{LevenbergMarquardt, SolverOptions};

/// Probability assigned by one hit observation.
pub const HIT_PROBABILITY: f32 = 0.55;
/// Probability assigned by one miss observation.
pub const MISS_PROBABILITY: f32 = 0.49;
/// Lower clamp of the occupancy probability.
pub const MIN_PROBABILITY: f32 = 0.1;
/// Upper clamp of the occupancy probability.
pub const MAX_PROBABILITY: f32 = 0.9;

#[inline]
fn odds(p: f32) -> f32 {
    p / (1.0 - p)
}

#[inline]
fn probability_from_odds(odds: f32) -> f32 {
    odds / (1.0 + odds)
}

/// Sparse occupancy grid updated with hits at the points and misses along the rays to them.
#[derive(Debug, Clone)]
pub struct ProbabilityGrid {
    resolution: f64,
    cells: HashMap<IVec3, f32>,
}

impl ProbabilityGrid {
    /// An empty grid, every cell unknown.
    pub fn new(resolution: f64) -> Self {
        Self {
            resolution,
            cells: HashMap::new(),
        }
    }

    /// Occupancy probability of a cell, `None` when it was never observed.
    pub fn probability(&self, index: IVec3) -> Option<f32> {
        self.cells.get(&index).copied()
    }

    /// Number of observed cells.
    pub fn num_known_cells(&self) -> usize {
        self.cells.len()
    }

    /// Insert one scan observed from `origin`.
    ///
    /// Every cell is updated at most once per insertion, and a cell hit by any point is never
    /// also updated as a miss.
    pub fn insert(&mut self, cloud: &PointCloud, origin: DVec3) {
        let hits = cloud
            .iter_vec3()
            .map(|p| voxel_index(p.as_dvec3(), self.resolution))
            .collect::<HashSet<_>>();

        let step = 0.5 * self.resolution;
        let mut misses = HashSet::new();
        for point in cloud.iter_vec3() {
            let ray = point.as_dvec3() - origin;
            let length = ray.length();
            let num_samples = (length / step).floor() as usize;
            for i in 0..num_samples {
                let index = voxel_index(origin + ray * (i as f64 * step / length), self.resolution);
                if !hits.contains(&index) {
                    misses.insert(index);
                }
            }
        }

        for index in &hits {
            self.update(*index, HIT_PROBABILITY);
        }
        for index in &misses {
            self.update(*index, MISS_PROBABILITY);
        }
    }

    fn update(&mut self, index: IVec3, observation: f32) {
        let probability = match self.cells.get(&index) {
            Some(&p) => probability_from_odds(odds(p) * odds(observation)),
            None => observation,
        };
        self.cells
            .insert(index, probability.clamp(MIN_PROBABILITY, MAX_PROBABILITY));
    }
}

impl VoxelField for ProbabilityGrid {
    fn resolution(&self) -> f64 {
        self.resolution
    }

    // the residual is the probability of the cell being free
    fn voxel_value(&self, index: IVec3) -> f32 {
        1.0 - self.probability(index).unwrap_or(MIN_PROBABILITY)
    }
}

/// Scan matcher maximizing the occupancy at the transformed points with Levenberg-Marquardt.
pub struct ProbabilityGridScanMatcher {
    publisher: Option<Arc<dyn CloudPublisher>>,
}

impl ProbabilityGridScanMatcher {
    /// Identifier in result logs.
    pub const NAME: &'static str = "ProbabilityGridScanMatcher";

    /// Create a matcher publishing its input through `publisher`.
    pub fn new(publisher: Option<Arc<dyn CloudPublisher>>) -> Self {
        Self { publisher }
    }
}

impl ScanMatcher for ProbabilityGridScanMatcher {
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

        let mut grid = ProbabilityGrid::new(config.resolution);
        grid.insert(cloud, DVec3::ZERO);
        log::debug!("probability grid with {} known cells", grid.num_known_cells());

        let problem = FieldResiduals::new(&grid, cloud);
        let solver = LevenbergMarquardt::new(SolverOptions::from(config));
        let (pose, summary) = solver.minimize(&problem, initial_pose)?;

        Ok(MatchResult { pose, summary })
    }
}
