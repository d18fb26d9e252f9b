use std::time::SystemTime;

use scanbench_3d::pointcloud::PointCloud;
use scanbench_matching::{CloudPublisher, PublishError};

/// Publishes clouds to a spawned rerun viewer, one entity per frame id.
pub struct RerunPublisher {
    rec: rerun::RecordingStream,
}

impl RerunPublisher {
    /// Spawn a viewer and connect to it.
    pub fn spawn(application_id: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let rec = rerun::RecordingStreamBuilder::new(application_id).spawn()?;
        Ok(Self { rec })
    }
}

impl CloudPublisher for RerunPublisher {
    fn publish(&self, cloud: &PointCloud, frame_id: &str, stamp: SystemTime) -> Result<(), PublishError> {
        let stamp = stamp
            .duration_since(SystemTime::UNIX_EPOCH)
            .map_err(|e| PublishError::Backend(e.to_string()))?;
        self.rec
            .set_timestamp_secs_since_epoch("stamp", stamp.as_secs_f64());

        let points = cloud
            .points()
            .iter()
            .map(|p| rerun::Position3D::new(p[0], p[1], p[2]))
            .collect::<Vec<_>>();
        let colors = vec![rerun::Color::from_rgb(90, 145, 199); points.len()];

        self.rec
            .log(
                format!("{frame_id}/benchmark_pointcloud"),
                &rerun::Points3D::new(points).with_colors(colors),
            )
            .map_err(|e| PublishError::Backend(e.to_string()))
    }
}
