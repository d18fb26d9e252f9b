use std::cell::Cell;
use std::rc::Rc;

use approx::assert_relative_eq;
use scanbench::record::{TrialRecord, COLUMNS};
use scanbench::sampler::PerturbationSampler;
use scanbench::sink::{CsvResultSink, RecordSink};
use scanbench::sweep::{MatcherFactory, SweepController, SweepParameters};
use scanbench::BenchmarkError;
use scanbench_3d::{pointcloud::PointCloud, pose::Rigid3};
use scanbench_matching::{
    MatchResult, MatcherError, ScanMatcher, ScanMatcherConfig, SolverSummary, TerminationType,
};

#[derive(Clone, Copy)]
enum Behaviour {
    Shrink,
    Fail,
}

struct StubMatcher {
    name: &'static str,
    behaviour: Behaviour,
    calls: Rc<Cell<usize>>,
}

impl ScanMatcher for StubMatcher {
    fn name(&self) -> &str {
        self.name
    }

    fn evaluate(
        &self,
        cloud: &PointCloud,
        initial_pose: &Rigid3,
        _config: &ScanMatcherConfig,
    ) -> Result<MatchResult, MatcherError> {
        self.calls.set(self.calls.get() + 1);
        assert!(!cloud.is_empty());
        match self.behaviour {
            Behaviour::Shrink => {
                let mut summary = SolverSummary::failure("");
                summary.num_successful_steps = 2;
                summary.termination_type = TerminationType::Convergence;
                Ok(MatchResult {
                    pose: Rigid3::from_translation(initial_pose.translation() * 0.1),
                    summary,
                })
            }
            Behaviour::Fail => Err(MatcherError::EmptyPointCloud),
        }
    }
}

fn stub(name: &'static str, behaviour: Behaviour, calls: &Rc<Cell<usize>>) -> MatcherFactory {
    let calls = calls.clone();
    Box::new(move || {
        Box::new(StubMatcher {
            name,
            behaviour,
            calls: calls.clone(),
        }) as Box<dyn ScanMatcher>
    })
}

fn small_sweep() -> SweepParameters {
    SweepParameters {
        min_error: 0.0,
        max_error: 0.2,
        error_step: 0.1,
        repetitions: 2,
        sample_resolution: 0.5,
        base_extent: [1.0, 1.5, 2.0],
        extent_jitter: 0.2,
    }
}

fn config() -> ScanMatcherConfig {
    ScanMatcherConfig {
        publish_cloud: false,
        ..Default::default()
    }
}

#[test]
fn sweep_writes_one_record_per_matcher_and_sample() -> Result<(), BenchmarkError> {
    let calls = Rc::new(Cell::new(0));
    let factories = vec![stub("A", Behaviour::Shrink, &calls), stub("B", Behaviour::Shrink, &calls)];
    let mut controller = SweepController::new(small_sweep(), config(), factories, PerturbationSampler::seeded(1));

    let mut records: Vec<TrialRecord> = Vec::new();
    let report = controller.run(&mut records)?;

    assert_eq!(records.len(), 12);
    assert_eq!(calls.get(), 12);
    assert_eq!(report.levels, 3);
    assert_eq!(report.trials, 6);
    assert_eq!(report.records, 12);
    assert_eq!(report.failed_records, 0);

    for (level, level_records) in records.chunks(4).enumerate() {
        let magnitude = level as f64 * 0.1;

        // one scene per level
        let size = level_records[0].sample_size;
        assert!(level_records.iter().all(|r| r.sample_size == size));
        for (extent, base) in size.iter().zip([1.0f32, 1.5, 2.0]) {
            assert!((extent - base).abs() <= 0.1 + 1e-6);
        }

        // matchers in order, sharing the initial error of their trial
        for trial in level_records.chunks(2) {
            assert_eq!(trial[0].scan_matcher, "A");
            assert_eq!(trial[1].scan_matcher, "B");
            assert_eq!(trial[0].initial_error, trial[1].initial_error);

            let norm = trial[0].initial_error.iter().map(|e| e * e).sum::<f64>().sqrt();
            assert_relative_eq!(norm, magnitude, epsilon = 1e-5);
            for (matched, initial) in trial[0].matched_error.iter().zip(trial[0].initial_error) {
                assert_relative_eq!(*matched, initial * 0.1, epsilon = 1e-12);
            }
        }

        if level > 0 {
            assert_ne!(level_records[0].initial_error, level_records[2].initial_error);
        }
    }

    for record in &records {
        assert_eq!(record.sample_type, "cuboid");
        assert_eq!(record.sample_resolution, 0.5);
        assert_eq!(record.grid_resolution, 0.1);
        assert_eq!(record.solver_iterations, 2);
        assert_eq!(record.solver_termination_type, TerminationType::Convergence);
    }
    Ok(())
}

#[test]
fn failing_matcher_does_not_stop_the_sweep() -> Result<(), BenchmarkError> {
    let calls = Rc::new(Cell::new(0));
    let factories = vec![
        stub("Broken", Behaviour::Fail, &calls),
        stub("Working", Behaviour::Shrink, &calls),
    ];
    let mut controller = SweepController::new(small_sweep(), config(), factories, PerturbationSampler::seeded(2));

    let mut records: Vec<TrialRecord> = Vec::new();
    let report = controller.run(&mut records)?;

    assert_eq!(records.len(), 12);
    assert_eq!(report.failed_records, 6);
    for record in records.iter().filter(|r| r.scan_matcher == "Broken") {
        assert_eq!(record.solver_termination_type, TerminationType::Failure);
        assert!(record.matched_error.iter().all(|e| e.is_nan()));
        assert_eq!(record.solver_iterations, 0);
    }
    for record in records.iter().filter(|r| r.scan_matcher == "Working") {
        assert_eq!(record.solver_termination_type, TerminationType::Convergence);
    }
    Ok(())
}

#[test]
fn invalid_parameters_fail_before_any_trial() {
    let calls = Rc::new(Cell::new(0));
    let params = SweepParameters {
        error_step: -0.1,
        ..small_sweep()
    };
    let mut controller = SweepController::new(
        params,
        config(),
        vec![stub("A", Behaviour::Shrink, &calls)],
        PerturbationSampler::seeded(3),
    );

    let mut records: Vec<TrialRecord> = Vec::new();
    assert!(matches!(controller.run(&mut records), Err(BenchmarkError::InvalidSweep(_))));
    assert!(records.is_empty());
    assert_eq!(calls.get(), 0);
}

struct FailAfter {
    remaining: usize,
}

impl RecordSink for FailAfter {
    fn write(&mut self, _record: &TrialRecord) -> Result<(), BenchmarkError> {
        if self.remaining == 0 {
            return Err(BenchmarkError::Io {
                path: "results.csv".into(),
                source: std::io::Error::other("disk full"),
            });
        }
        self.remaining -= 1;
        Ok(())
    }
}

#[test]
fn sink_error_aborts_the_sweep() {
    let calls = Rc::new(Cell::new(0));
    let mut controller = SweepController::new(
        small_sweep(),
        config(),
        vec![stub("A", Behaviour::Shrink, &calls)],
        PerturbationSampler::seeded(4),
    );

    let result = controller.run(&mut FailAfter { remaining: 3 });
    assert!(matches!(result, Err(BenchmarkError::Io { .. })));
    assert_eq!(calls.get(), 4);
}

struct Tee {
    csv: CsvResultSink,
    memory: Vec<TrialRecord>,
}

impl RecordSink for Tee {
    fn write(&mut self, record: &TrialRecord) -> Result<(), BenchmarkError> {
        self.csv.write(record)?;
        self.memory.write(record)
    }
}

#[test]
fn csv_log_reads_back_exactly() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let calls = Rc::new(Cell::new(0));
    let factories = vec![
        stub("A", Behaviour::Shrink, &calls),
        stub("Broken", Behaviour::Fail, &calls),
    ];
    let mut controller = SweepController::new(small_sweep(), config(), factories, PerturbationSampler::seeded(5));

    let mut tee = Tee {
        csv: CsvResultSink::open(dir.path().join("results.csv"))?,
        memory: Vec::new(),
    };
    controller.run(&mut tee)?;
    let path = tee.csv.close()?;

    let contents = std::fs::read_to_string(path)?;
    let mut lines = contents.lines();
    assert_eq!(lines.next(), Some(COLUMNS.join(",").as_str()));

    let rows = lines.collect::<Vec<_>>();
    assert_eq!(rows.len(), tee.memory.len());
    for (row, record) in rows.iter().zip(&tee.memory) {
        let fields = row.split(',').collect::<Vec<_>>();
        assert_eq!(fields.len(), COLUMNS.len());
        assert_eq!(fields[0], record.scan_matcher);
        assert_eq!(fields[2], "cuboid");
        for (i, extent) in record.sample_size.iter().enumerate() {
            assert_eq!(fields[3 + i].parse::<f32>()?, *extent);
        }
        for (i, error) in record.initial_error.iter().enumerate() {
            assert_eq!(fields[9 + i].parse::<f64>()?, *error);
        }
        for (i, error) in record.matched_error.iter().enumerate() {
            let parsed = fields[12 + i].parse::<f64>()?;
            assert!(parsed == *error || (parsed.is_nan() && error.is_nan()));
        }
        assert_eq!(fields[15].parse::<usize>()?, record.solver_iterations);
        assert_eq!(fields[16], record.solver_termination_type.as_str());
    }
    Ok(())
}

#[test]
fn sampled_directions_have_zero_mean() {
    let mut sampler = PerturbationSampler::seeded(6);
    let n = 20_000;
    let mut sum = glam::Vec3::ZERO;
    for _ in 0..n {
        let error = sampler.sample_error(1.5);
        assert_relative_eq!(error.length(), 1.5, epsilon = 1e-5);
        sum += error / 1.5;
    }
    let mean = sum / n as f32;
    assert!(mean.length() < 0.03, "mean direction {mean:?}");
}
