#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! # Sweeps
//!
//! A [`sweep::SweepController`] walks the initial error levels of a [`sweep::SweepParameters`],
//! generates one jittered cuboid per level, draws several random initial errors per scene and
//! runs every matcher on each of them. Every outcome becomes one [`record::TrialRecord`] in a
//! [`sink::RecordSink`].
//!
//! ```rust
//! use scanbench::{sampler::PerturbationSampler, sweep::{default_factories, SweepController, SweepParameters}};
//! use scanbench_matching::ScanMatcherConfig;
//!
//! let params = SweepParameters {
//!     max_error: 0.1,
//!     repetitions: 1,
//!     sample_resolution: 0.5,
//!     base_extent: [1.0, 1.0, 1.0],
//!     ..Default::default()
//! };
//! let config = ScanMatcherConfig {
//!     resolution: 0.25,
//!     publish_cloud: false,
//!     ..Default::default()
//! };
//!
//! let mut records: Vec<scanbench::record::TrialRecord> = Vec::new();
//! let mut controller = SweepController::new(params, config, default_factories(None), PerturbationSampler::seeded(0));
//! let report = controller.run(&mut records)?;
//! assert_eq!(report.records, 2 * 4);
//! # Ok::<(), scanbench::BenchmarkError>(())
//! ```

/// Batch configuration files.
pub mod config;

/// Errors aborting a run.
pub mod error;

/// Single trial demonstration mode.
pub mod interactive;

/// Per trial result rows.
pub mod record;

/// Random initial errors and scene jitter.
pub mod sampler;

/// Result log destinations.
pub mod sink;

/// Parameter sweeps.
pub mod sweep;

/// Running every matcher on one initial estimate.
pub mod trial;

pub use config::BenchmarkConfig;
pub use error::BenchmarkError;
