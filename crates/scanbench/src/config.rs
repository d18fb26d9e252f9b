use std::path::Path;

use scanbench_matching::ScanMatcherConfig;
use serde::{Deserialize, Serialize};

use crate::error::BenchmarkError;
use crate::sweep::SweepParameters;

/// Everything a batch run is configured with, as stored in a JSON file.
///
/// Missing fields take their default values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkConfig {
    /// Error levels, repetitions and scene.
    pub sweep: SweepParameters,
    /// Configuration shared by every matcher.
    pub matcher: ScanMatcherConfig,
}

impl BenchmarkConfig {
    /// Read a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, BenchmarkError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| BenchmarkError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| BenchmarkError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// The configuration of a batch sweep, publishing the input clouds only when asked to.
    pub fn for_batch(mut self, publish_cloud: bool) -> Self {
        self.matcher.publish_cloud = publish_cloud;
        self
    }

    /// Validate both halves of the configuration.
    pub fn validate(&self) -> Result<(), BenchmarkError> {
        self.sweep.validate()?;
        self.matcher.validate()?;
        Ok(())
    }
}
