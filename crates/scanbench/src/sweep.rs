use std::sync::Arc;

use rand::{rngs::StdRng, Rng};
use scanbench_3d::generator::{SceneGenerator, Shape};
use scanbench_3d::pose::Rigid3;
use scanbench_matching::{CloudPublisher, MatcherKind, ScanMatcher, ScanMatcherConfig};
use serde::{Deserialize, Serialize};

use crate::error::BenchmarkError;
use crate::record::SceneDescriptor;
use crate::sampler::PerturbationSampler;
use crate::sink::RecordSink;
use crate::trial::run_trial;

// absorbs the rounding of (max - min) / step when the range is a whole number of steps
const LEVEL_EPSILON: f64 = 1e-4;

/// Largest number of error levels a sweep may have.
pub const MAX_LEVELS: usize = 1_000_000;

/// Builds a fresh matcher for every trial.
pub type MatcherFactory = Box<dyn Fn() -> Box<dyn ScanMatcher>>;

/// Factories for every matcher of [`MatcherKind::ALL`], in order.
pub fn default_factories(publisher: Option<Arc<dyn CloudPublisher>>) -> Vec<MatcherFactory> {
    MatcherKind::ALL
        .into_iter()
        .map(|kind| {
            let publisher = publisher.clone();
            Box::new(move || kind.build(publisher.clone())) as MatcherFactory
        })
        .collect()
}

/// Error levels, repetitions and scene of a sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepParameters {
    /// Smallest initial error magnitude.
    pub min_error: f64,
    /// Largest initial error magnitude, included when the range is a whole number of steps.
    pub max_error: f64,
    /// Increment between error levels.
    pub error_step: f64,
    /// Error samples drawn per level.
    pub repetitions: usize,
    /// Spacing of the surface samples of the scene.
    pub sample_resolution: f32,
    /// Cuboid extents before jitter.
    pub base_extent: [f32; 3],
    /// Total width of the uniform jitter applied to every extent at each level.
    pub extent_jitter: f32,
}

impl Default for SweepParameters {
    fn default() -> Self {
        Self {
            min_error: 0.0,
            max_error: 1.5,
            error_step: 0.1,
            repetitions: 5,
            sample_resolution: 0.04,
            base_extent: [3.0, 3.0, 3.0],
            extent_jitter: 0.1,
        }
    }
}

impl SweepParameters {
    /// Check that the parameters describe a non-empty sweep over valid scenes.
    pub fn validate(&self) -> Result<(), BenchmarkError> {
        let invalid = |message: String| Err(BenchmarkError::InvalidSweep(message));

        if !(self.min_error.is_finite() && self.min_error >= 0.0) {
            return invalid(format!("min_error must be non-negative, got {}", self.min_error));
        }
        if !(self.max_error.is_finite() && self.max_error >= self.min_error) {
            return invalid(format!(
                "max_error must not be below min_error {}, got {}",
                self.min_error, self.max_error
            ));
        }
        if !(self.error_step.is_finite() && self.error_step > 0.0) {
            return invalid(format!("error_step must be positive, got {}", self.error_step));
        }
        let steps = (self.max_error - self.min_error) / self.error_step + LEVEL_EPSILON;
        if !(steps.is_finite() && steps < MAX_LEVELS as f64) {
            return invalid(format!(
                "error range {} to {} in steps of {} exceeds {MAX_LEVELS} levels",
                self.min_error, self.max_error, self.error_step
            ));
        }
        if self.repetitions == 0 {
            return invalid("repetitions must be at least 1".to_string());
        }
        if !(self.sample_resolution.is_finite() && self.sample_resolution > 0.0) {
            return invalid(format!(
                "sample_resolution must be positive, got {}",
                self.sample_resolution
            ));
        }
        if !(self.extent_jitter.is_finite() && self.extent_jitter >= 0.0) {
            return invalid(format!("extent_jitter must be non-negative, got {}", self.extent_jitter));
        }
        for (axis, extent) in ['x', 'y', 'z'].into_iter().zip(self.base_extent) {
            if !(extent.is_finite() && extent > 0.5 * self.extent_jitter) {
                return invalid(format!(
                    "base extent along {axis} must exceed half the jitter {}, got {extent}",
                    self.extent_jitter
                ));
            }
        }
        Ok(())
    }

    /// Number of error levels.
    pub fn num_levels(&self) -> usize {
        (((self.max_error - self.min_error) / self.error_step + LEVEL_EPSILON).floor() as usize)
            .saturating_add(1)
    }

    /// The error magnitudes of the sweep, `min_error + i * error_step`.
    pub fn levels(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.num_levels()).map(move |i| self.min_error + i as f64 * self.error_step)
    }

    /// Percentage of the error range covered once `level` is done.
    pub fn progress(&self, level: f64) -> f64 {
        let range = self.max_error - self.min_error;
        if range <= 0.0 {
            return 100.0;
        }
        ((level - self.min_error) * 100.0 / range).min(100.0)
    }
}

/// Totals of a completed sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Error levels visited.
    pub levels: usize,
    /// Trials run, one per error sample.
    pub trials: usize,
    /// Records written to the sink.
    pub records: usize,
    /// Records of matchers that failed.
    pub failed_records: usize,
}

/// Drives a sweep: one jittered scene per error level, several random initial errors per
/// scene, every matcher on every initial error.
pub struct SweepController<R = StdRng> {
    params: SweepParameters,
    config: ScanMatcherConfig,
    factories: Vec<MatcherFactory>,
    sampler: PerturbationSampler<R>,
}

impl<R: Rng> SweepController<R> {
    /// Create a controller. Nothing is validated until [`SweepController::run`].
    pub fn new(
        params: SweepParameters,
        config: ScanMatcherConfig,
        factories: Vec<MatcherFactory>,
        sampler: PerturbationSampler<R>,
    ) -> Self {
        Self {
            params,
            config,
            factories,
            sampler,
        }
    }

    /// Parameters of the sweep.
    pub fn params(&self) -> &SweepParameters {
        &self.params
    }

    /// Run the whole sweep, writing every record to `sink`.
    ///
    /// Invalid parameters fail before any trial runs; a sink error aborts the sweep.
    pub fn run<S: RecordSink + ?Sized>(&mut self, sink: &mut S) -> Result<SweepReport, BenchmarkError> {
        self.params.validate()?;
        self.config.validate()?;
        if self.factories.is_empty() {
            return Err(BenchmarkError::InvalidSweep("no scan matchers to evaluate".to_string()));
        }

        let generator = SceneGenerator::new(self.params.sample_resolution)?;
        let levels = self.params.levels().collect::<Vec<_>>();
        log::info!(
            "sweeping {} error levels x {} repetitions x {} matchers",
            levels.len(),
            self.params.repetitions,
            self.factories.len()
        );

        let mut report = SweepReport::default();
        for level in levels {
            let size = self
                .params
                .base_extent
                .map(|extent| self.sampler.jitter(extent, self.params.extent_jitter));
            let shape = Shape::Cuboid { size };
            let cloud = generator.generate(&shape)?;
            let scene = SceneDescriptor {
                sample_resolution: self.params.sample_resolution,
                shape,
            };
            log::debug!("error level {level}: cuboid {size:?} with {} points", cloud.len());

            for _ in 0..self.params.repetitions {
                let error = self.sampler.sample_error(level as f32);
                let initial_pose = Rigid3::from_translation(error.as_dvec3());
                let matchers = self.factories.iter().map(|factory| factory()).collect::<Vec<_>>();

                for record in run_trial(&cloud, &initial_pose, &matchers, &self.config, &scene) {
                    sink.write(&record)?;
                    report.records += 1;
                    if record.is_failure() {
                        report.failed_records += 1;
                    }
                }
                report.trials += 1;
            }

            report.levels += 1;
            log::info!("Finished {:.1}%", self.params.progress(level));
        }

        Ok(report)
    }
}
