use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use scanbench_3d::{pointcloud::PointCloud, pose::Rigid3};
use scanbench_matching::{MatchResult, ScanMatcher, ScanMatcherConfig};

use crate::record::{SceneDescriptor, TrialRecord};

/// Run every matcher once on `cloud` from `initial_pose`, in slice order.
///
/// The ground truth pose is the identity, so the recorded errors are the translations of the
/// initial and matched estimates. A matcher returning an error or panicking yields a failure
/// record and does not prevent the remaining matchers from running.
pub fn run_trial(
    cloud: &PointCloud,
    initial_pose: &Rigid3,
    matchers: &[Box<dyn ScanMatcher>],
    config: &ScanMatcherConfig,
    scene: &SceneDescriptor,
) -> Vec<TrialRecord> {
    let initial_error = initial_pose.translation().to_array();

    matchers
        .iter()
        .map(|matcher| {
            let mut record = TrialRecord::new(matcher.name(), scene, config, initial_error);
            if let Some(result) = evaluate_isolated(matcher.as_ref(), cloud, initial_pose, config) {
                log::debug!("{}: {}", matcher.name(), result.summary.brief_report());
                record.set_result(&result);
            }
            record
        })
        .collect()
}

/// Evaluate one matcher, turning an error or a panic into `None` and an error log line.
pub fn evaluate_isolated(
    matcher: &dyn ScanMatcher,
    cloud: &PointCloud,
    initial_pose: &Rigid3,
    config: &ScanMatcherConfig,
) -> Option<MatchResult> {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| matcher.evaluate(cloud, initial_pose, config)));

    match outcome {
        Ok(Ok(result)) => Some(result),
        Ok(Err(e)) => {
            log::error!("{} failed: {}", matcher.name(), e);
            None
        }
        Err(payload) => {
            log::error!("{} panicked: {}", matcher.name(), panic_message(payload.as_ref()));
            None
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec3;
    use scanbench_3d::generator::Shape;
    use scanbench_matching::{MatcherError, SolverSummary, TerminationType};

    struct Echo;

    impl ScanMatcher for Echo {
        fn name(&self) -> &str {
            "Echo"
        }

        fn evaluate(
            &self,
            _cloud: &PointCloud,
            initial_pose: &Rigid3,
            _config: &ScanMatcherConfig,
        ) -> Result<MatchResult, MatcherError> {
            let mut summary = SolverSummary::failure("");
            summary.termination_type = TerminationType::Convergence;
            summary.num_successful_steps = 3;
            Ok(MatchResult {
                pose: Rigid3::from_translation(initial_pose.translation() * 0.5),
                summary,
            })
        }
    }

    struct Panicking;

    impl ScanMatcher for Panicking {
        fn name(&self) -> &str {
            "Panicking"
        }

        fn evaluate(&self, _: &PointCloud, _: &Rigid3, _: &ScanMatcherConfig) -> Result<MatchResult, MatcherError> {
            panic!("map allocation failed");
        }
    }

    struct Erroring;

    impl ScanMatcher for Erroring {
        fn name(&self) -> &str {
            "Erroring"
        }

        fn evaluate(&self, _: &PointCloud, _: &Rigid3, _: &ScanMatcherConfig) -> Result<MatchResult, MatcherError> {
            Err(MatcherError::EmptyPointCloud)
        }
    }

    #[test]
    fn test_failures_are_isolated() {
        let cloud = PointCloud::new(vec![[1.0, 0.0, 0.0]]);
        let scene = SceneDescriptor {
            sample_resolution: 0.5,
            shape: Shape::Cuboid { size: [2.0; 3] },
        };
        let matchers: Vec<Box<dyn ScanMatcher>> = vec![Box::new(Panicking), Box::new(Echo), Box::new(Erroring), Box::new(Echo)];
        let initial_pose = Rigid3::from_translation(DVec3::new(0.2, 0.0, -0.4));

        let records = run_trial(&cloud, &initial_pose, &matchers, &ScanMatcherConfig::default(), &scene);

        let names = records.iter().map(|r| r.scan_matcher.as_str()).collect::<Vec<_>>();
        assert_eq!(names, ["Panicking", "Echo", "Erroring", "Echo"]);

        for failed in [&records[0], &records[2]] {
            assert!(failed.is_failure());
            assert!(failed.matched_error.iter().all(|e| e.is_nan()));
            assert_eq!(failed.solver_iterations, 0);
        }
        for ok in [&records[1], &records[3]] {
            assert_eq!(ok.solver_termination_type, TerminationType::Convergence);
            assert_eq!(ok.matched_error, [0.1, 0.0, -0.2]);
            assert_eq!(ok.solver_iterations, 3);
        }
        assert!(records.iter().all(|r| r.initial_error == [0.2, 0.0, -0.4]));
    }

    #[test]
    fn test_no_matchers() {
        let cloud = PointCloud::new(vec![[1.0, 0.0, 0.0]]);
        let scene = SceneDescriptor {
            sample_resolution: 0.5,
            shape: Shape::Cuboid { size: [2.0; 3] },
        };
        let records = run_trial(&cloud, &Rigid3::identity(), &[], &ScanMatcherConfig::default(), &scene);
        assert!(records.is_empty());
    }
}
