use std::path::PathBuf;

use scanbench_3d::generator::GeneratorError;
use scanbench_matching::ConfigError;
use thiserror::Error;

/// Errors that abort a benchmark run.
#[derive(Debug, Error)]
pub enum BenchmarkError {
    /// The sweep parameters are inconsistent.
    #[error("invalid sweep parameters: {0}")]
    InvalidSweep(String),

    /// The matcher configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The scene could not be generated.
    #[error(transparent)]
    Scene(#[from] GeneratorError),

    /// Reading or writing a file failed.
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        /// File the operation was acting on.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A configuration file could not be parsed.
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        /// The configuration file.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },
}
