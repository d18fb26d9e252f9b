use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by an invalid [`ScanMatcherConfig`].
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// A distance or tolerance parameter is not positive and finite.
    #[error("{name} must be positive and finite, got {value}")]
    NonPositive {
        /// Name of the parameter.
        name: &'static str,
        /// The offending value.
        value: f64,
    },

    /// The solver is not allowed a single iteration.
    #[error("max_iterations must be at least 1")]
    ZeroIterations,
}

/// Parameters shared by every matcher of a trial batch.
///
/// The same configuration is handed to every matcher of a sweep so that results are
/// comparable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanMatcherConfig {
    /// Edge length of the map voxels.
    pub resolution: f64,
    /// Largest magnitude stored in the signed distance fields.
    pub truncation_distance: f64,
    /// Clamping bound of the Euclidean distance field.
    pub esdf_distance: f64,
    /// Publish the input cloud to the visualization sink on every evaluation.
    pub publish_cloud: bool,
    /// Maximum number of solver iterations, successful and unsuccessful.
    pub max_iterations: usize,
    /// Relative cost decrease below which the solver stops.
    pub function_tolerance: f64,
    /// Max-norm of the gradient below which the solver stops.
    pub gradient_tolerance: f64,
    /// Relative step size below which the solver stops.
    pub parameter_tolerance: f64,
}

impl Default for ScanMatcherConfig {
    fn default() -> Self {
        Self {
            resolution: 0.1,
            truncation_distance: 0.3,
            esdf_distance: 0.5,
            publish_cloud: true,
            max_iterations: 50,
            function_tolerance: 1e-6,
            gradient_tolerance: 1e-10,
            parameter_tolerance: 1e-8,
        }
    }
}

impl ScanMatcherConfig {
    /// Check that every parameter is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("resolution", self.resolution),
            ("truncation_distance", self.truncation_distance),
            ("esdf_distance", self.esdf_distance),
            ("function_tolerance", self.function_tolerance),
            ("gradient_tolerance", self.gradient_tolerance),
            ("parameter_tolerance", self.parameter_tolerance),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::NonPositive { name, value });
            }
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::ZeroIterations);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert_eq!(ScanMatcherConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_invalid_values() {
        let config = ScanMatcherConfig {
            truncation_distance: -0.1,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::NonPositive {
                name: "truncation_distance",
                value: -0.1
            })
        );

        let config = ScanMatcherConfig {
            max_iterations: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroIterations));
    }

    #[test]
    fn test_partial_json_uses_defaults() -> Result<(), serde_json::Error> {
        let config: ScanMatcherConfig =
            serde_json::from_str(r#"{ "resolution": 0.05, "publish_cloud": false }"#)?;
        assert_eq!(config.resolution, 0.05);
        assert!(!config.publish_cloud);
        assert_eq!(config.esdf_distance, 0.5);
        Ok(())
    }
}
