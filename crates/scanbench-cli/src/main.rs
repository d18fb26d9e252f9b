use argh::FromArgs;
use std::path::PathBuf;
use std::sync::Arc;

use scanbench::interactive::{run_single_trial, SingleTrialParameters};
use scanbench::sampler::PerturbationSampler;
use scanbench::sink::CsvResultSink;
use scanbench::sweep::{MatcherFactory, SweepController};
use scanbench::BenchmarkConfig;
use scanbench_matching::{CloudPublisher, LogPublisher, MatcherKind, ScanMatcherConfig};

#[cfg(feature = "rerun")]
mod rerun_publisher;

#[derive(FromArgs)]
/// Benchmark of scan matchers on synthetic scenes
struct Args {
    #[argh(subcommand)]
    command: Command,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Command {
    Batch(BatchArgs),
    Single(SingleArgs),
}

#[derive(FromArgs)]
/// Sweep the initial error and log every trial to a CSV file
#[argh(subcommand, name = "batch")]
struct BatchArgs {
    /// JSON file with "sweep" and "matcher" sections
    #[argh(option)]
    config: Option<PathBuf>,

    /// directory the result log is written to
    #[argh(option, short = 'o', default = "PathBuf::from(\".\")")]
    output_dir: PathBuf,

    /// smallest initial error magnitude
    #[argh(option)]
    min_error: Option<f64>,

    /// largest initial error magnitude
    #[argh(option)]
    max_error: Option<f64>,

    /// increment between error levels
    #[argh(option)]
    error_step: Option<f64>,

    /// error samples per level
    #[argh(option, short = 'n')]
    repetitions: Option<usize>,

    /// scan matcher to run, repeat to select several (default: all)
    #[argh(option, short = 'm')]
    matcher: Vec<MatcherKind>,

    /// seed of the perturbation sampler (default: operating system entropy)
    #[argh(option)]
    seed: Option<u64>,

    /// map resolution shared by every matcher
    #[argh(option)]
    resolution: Option<f64>,

    /// publish the input cloud of every trial
    #[argh(switch)]
    publish: bool,

    /// publish to a rerun viewer instead of the log
    #[argh(switch)]
    rerun: bool,
}

#[derive(FromArgs)]
/// Run every matcher once on a large cuboid and print the results
#[argh(subcommand, name = "single")]
struct SingleArgs {
    /// JSON file with a "matcher" section
    #[argh(option)]
    config: Option<PathBuf>,

    /// map resolution shared by every matcher
    #[argh(option)]
    resolution: Option<f64>,

    /// publish to a rerun viewer instead of the log
    #[argh(switch)]
    rerun: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env = env_logger::Env::default().default_filter_or("info");
    env_logger::init_from_env(env);

    let args: Args = argh::from_env();

    match args.command {
        Command::Batch(args) => batch(args),
        Command::Single(args) => single(args),
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<BenchmarkConfig, Box<dyn std::error::Error>> {
    Ok(match path {
        Some(path) => BenchmarkConfig::from_json_file(path)?,
        None => BenchmarkConfig::default(),
    })
}

fn publisher(rerun: bool) -> Result<Arc<dyn CloudPublisher>, Box<dyn std::error::Error>> {
    if rerun {
        #[cfg(feature = "rerun")]
        return Ok(Arc::new(rerun_publisher::RerunPublisher::spawn(
            "Scan Matching Benchmark",
        )?));

        #[cfg(not(feature = "rerun"))]
        log::warn!("built without the rerun feature, publishing to the log");
    }
    Ok(Arc::new(LogPublisher))
}

fn batch(args: BatchArgs) -> Result<(), Box<dyn std::error::Error>> {
    let started_at = chrono::Local::now();

    let mut config = load_config(args.config.as_ref())?.for_batch(args.publish);
    let sweep = &mut config.sweep;
    sweep.min_error = args.min_error.unwrap_or(sweep.min_error);
    sweep.max_error = args.max_error.unwrap_or(sweep.max_error);
    sweep.error_step = args.error_step.unwrap_or(sweep.error_step);
    sweep.repetitions = args.repetitions.unwrap_or(sweep.repetitions);
    let matcher = &mut config.matcher;
    matcher.resolution = args.resolution.unwrap_or(matcher.resolution);
    config.validate()?;

    let publisher = publisher(args.rerun)?;
    let kinds = if args.matcher.is_empty() {
        MatcherKind::ALL.to_vec()
    } else {
        args.matcher
    };
    let factories = kinds
        .into_iter()
        .map(|kind| {
            let publisher = publisher.clone();
            Box::new(move || kind.build(Some(publisher.clone()))) as MatcherFactory
        })
        .collect::<Vec<_>>();

    let sampler = match args.seed {
        Some(seed) => PerturbationSampler::seeded(seed),
        None => PerturbationSampler::from_entropy(),
    };

    let mut sink = CsvResultSink::create(&args.output_dir, &started_at)?;
    let mut controller = SweepController::new(config.sweep, config.matcher, factories, sampler);
    let report = controller.run(&mut sink)?;
    let path = sink.close()?;

    println!(
        "Wrote {} records ({} failed) of {} trials over {} error levels to {}",
        report.records,
        report.failed_records,
        report.trials,
        report.levels,
        path.display()
    );

    Ok(())
}

fn single(args: SingleArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(args.config.as_ref())?;
    let matcher_config = ScanMatcherConfig {
        resolution: args.resolution.unwrap_or(config.matcher.resolution),
        ..config.matcher
    };

    let publisher = publisher(args.rerun)?;
    let outcomes = run_single_trial(&SingleTrialParameters::default(), &matcher_config, Some(publisher))?;

    for outcome in outcomes {
        println!("{}", outcome.record.scan_matcher);
        println!("Before {}", outcome.initial_pose);
        match outcome.result {
            Some(result) => {
                println!("After {}", result.pose);
                println!("{}", result.summary.brief_report());
            }
            None => println!("After: matcher failed"),
        }
    }

    Ok(())
}
