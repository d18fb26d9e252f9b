use std::sync::Arc;

use glam::DVec3;
use scanbench_3d::generator::{SceneGenerator, Shape};
use scanbench_3d::pose::Rigid3;
use scanbench_matching::matcher::WORLD_FRAME;
use scanbench_matching::publish::publish_best_effort;
use scanbench_matching::{CloudPublisher, MatchResult, MatcherKind, ScanMatcherConfig};
use serde::{Deserialize, Serialize};

use crate::error::BenchmarkError;
use crate::record::{SceneDescriptor, TrialRecord};
use crate::trial::evaluate_isolated;

/// Scene and initial estimate of a single demonstration trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SingleTrialParameters {
    /// Spacing of the surface samples.
    pub sample_resolution: f32,
    /// Cuboid extents.
    pub size: [f32; 3],
    /// Translation of the initial estimate.
    pub initial_translation: [f64; 3],
}

impl Default for SingleTrialParameters {
    fn default() -> Self {
        Self {
            sample_resolution: 0.038,
            size: [4.025, 4.025, 4.025],
            initial_translation: [1.5, 1.5, 1.5],
        }
    }
}

/// What one matcher did in a single trial.
#[derive(Debug, Clone)]
pub struct MatcherOutcome {
    /// The initial estimate handed to the matcher.
    pub initial_pose: Rigid3,
    /// The estimate and solver report, `None` when the matcher failed.
    pub result: Option<MatchResult>,
    /// The same outcome as a result log row.
    pub record: TrialRecord,
}

/// Run every matcher of [`MatcherKind::ALL`] once on one scene, then publish the scene.
pub fn run_single_trial(
    params: &SingleTrialParameters,
    config: &ScanMatcherConfig,
    publisher: Option<Arc<dyn CloudPublisher>>,
) -> Result<Vec<MatcherOutcome>, BenchmarkError> {
    config.validate()?;

    let shape = Shape::Cuboid { size: params.size };
    let cloud = SceneGenerator::new(params.sample_resolution)?.generate(&shape)?;
    let scene = SceneDescriptor {
        sample_resolution: params.sample_resolution,
        shape,
    };
    let initial_pose = Rigid3::from_translation(DVec3::from_array(params.initial_translation));
    log::info!("single trial on a cuboid of {} points", cloud.len());

    let outcomes = MatcherKind::ALL
        .into_iter()
        .map(|kind| {
            let matcher = kind.build(publisher.clone());
            let mut record = TrialRecord::new(matcher.name(), &scene, config, params.initial_translation);
            let result = evaluate_isolated(matcher.as_ref(), &cloud, &initial_pose, config);
            if let Some(result) = &result {
                record.set_result(result);
            }
            MatcherOutcome {
                initial_pose,
                result,
                record,
            }
        })
        .collect();

    if let Some(publisher) = &publisher {
        publish_best_effort(publisher.as_ref(), &cloud, WORLD_FRAME);
    }

    Ok(outcomes)
}
