use std::time::SystemTime;

use scanbench_3d::pointcloud::PointCloud;
use thiserror::Error;

/// Errors raised by a visualization backend.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The backend rejected or failed to deliver the cloud.
    #[error("visualization backend error: {0}")]
    Backend(String),
}

/// A sink displaying point clouds outside of the process.
pub trait CloudPublisher {
    /// Send `cloud`, expressed in `frame_id`, stamped with `stamp`.
    fn publish(&self, cloud: &PointCloud, frame_id: &str, stamp: SystemTime) -> Result<(), PublishError>;
}

/// Publisher that only logs what would be displayed.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPublisher;

impl CloudPublisher for LogPublisher {
    fn publish(&self, cloud: &PointCloud, frame_id: &str, stamp: SystemTime) -> Result<(), PublishError> {
        let stamp = stamp
            .duration_since(SystemTime::UNIX_EPOCH)
            .map_err(|e| PublishError::Backend(e.to_string()))?;
        log::debug!(
            "cloud of {} points in frame '{}' at {:.3}s, bounds {:?}..{:?}",
            cloud.len(),
            frame_id,
            stamp.as_secs_f64(),
            cloud.get_min_bound(),
            cloud.get_max_bound()
        );
        Ok(())
    }
}

/// Publish `cloud` now, logging and swallowing any failure.
pub fn publish_best_effort<P: CloudPublisher + ?Sized>(publisher: &P, cloud: &PointCloud, frame_id: &str) {
    if let Err(e) = publisher.publish(cloud, frame_id, SystemTime::now()) {
        log::warn!("failed to publish cloud in frame '{}': {}", frame_id, e);
    }
}
