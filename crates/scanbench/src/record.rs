use std::fmt::Write;

use scanbench_3d::generator::Shape;
use scanbench_matching::{MatchResult, ScanMatcherConfig, TerminationType};

/// Column names of a result log, in order.
pub const COLUMNS: [&str; 17] = [
    "scan_matcher",
    "sample_resolution",
    "sample_type",
    "sample_size_x",
    "sample_size_y",
    "sample_size_z",
    "grid_resolution",
    "truncation_distance",
    "esdf_distance",
    "initial_error_x",
    "initial_error_y",
    "initial_error_z",
    "matched_error_x",
    "matched_error_y",
    "matched_error_z",
    "solver_iterations",
    "solver_termination_type",
];

/// Scene a trial runs on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneDescriptor {
    /// Spacing of the surface samples.
    pub sample_resolution: f32,
    /// Sampled solid.
    pub shape: Shape,
}

/// Outcome of one matcher on one initial error sample.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialRecord {
    /// Matcher identifier.
    pub scan_matcher: String,
    /// Spacing of the surface samples.
    pub sample_resolution: f32,
    /// Shape descriptor, e.g. `cuboid`.
    pub sample_type: String,
    /// Extents of the shape along x, y and z.
    pub sample_size: [f32; 3],
    /// Map resolution of the matcher.
    pub grid_resolution: f64,
    /// TSDF truncation distance.
    pub truncation_distance: f64,
    /// ESDF distance bound.
    pub esdf_distance: f64,
    /// Translation error of the initial estimate.
    pub initial_error: [f64; 3],
    /// Translation error of the matched estimate, NaN when the matcher failed.
    pub matched_error: [f64; 3],
    /// Number of solver iterations.
    pub solver_iterations: usize,
    /// Why the solver stopped.
    pub solver_termination_type: TerminationType,
}

impl TrialRecord {
    /// A record with every scene and configuration column filled in and no solver outcome.
    pub fn new(
        scan_matcher: &str,
        scene: &SceneDescriptor,
        config: &ScanMatcherConfig,
        initial_error: [f64; 3],
    ) -> Self {
        Self {
            scan_matcher: scan_matcher.to_string(),
            sample_resolution: scene.sample_resolution,
            sample_type: scene.shape.name().to_string(),
            sample_size: scene.shape.size(),
            grid_resolution: config.resolution,
            truncation_distance: config.truncation_distance,
            esdf_distance: config.esdf_distance,
            initial_error,
            matched_error: [f64::NAN; 3],
            solver_iterations: 0,
            solver_termination_type: TerminationType::Failure,
        }
    }

    /// Fill in the solver outcome of `result`.
    pub fn set_result(&mut self, result: &MatchResult) {
        self.matched_error = result.pose.translation().to_array();
        self.solver_iterations = result.summary.num_iterations();
        self.solver_termination_type = result.summary.termination_type;
    }

    /// Whether the matcher failed or its solver reported a failure.
    pub fn is_failure(&self) -> bool {
        self.solver_termination_type == TerminationType::Failure
    }

    /// The record as one comma separated row, without line terminator.
    ///
    /// Floats use the shortest representation that reads back to the same value.
    pub fn to_csv_row(&self) -> String {
        let mut row = String::new();
        // writing to a String cannot fail
        let _ = write!(
            row,
            "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
            self.scan_matcher,
            self.sample_resolution,
            self.sample_type,
            self.sample_size[0],
            self.sample_size[1],
            self.sample_size[2],
            self.grid_resolution,
            self.truncation_distance,
            self.esdf_distance,
            self.initial_error[0],
            self.initial_error[1],
            self.initial_error[2],
            self.matched_error[0],
            self.matched_error[1],
            self.matched_error[2],
            self.solver_iterations,
            self.solver_termination_type,
        );
        row
    }
}
