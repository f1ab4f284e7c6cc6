// crates/bactrace-cli/src/main.rs

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms, clippy::unwrap_used, clippy::expect_used)]

mod colony;
mod dispatch;
mod sink;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use ndarray::Array2;
use rayon::prelude::*;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bactrace_core::{
    calibrate_temperatures, Bacillus, Config, Optimizer, RunOptions, TemperatureRange,
};
use bactrace_imaging::load_grayscale;

use crate::colony::load_colony;
use crate::dispatch::{select, Strategy, WorkerOutcome};
use crate::sink::PngSink;

#[derive(Parser, Debug)]
#[command(
    name = "bactrace",
    about = "Fit bacillus colonies to grayscale time-lapse micrographs",
    version = env!("CARGO_PKG_VERSION"),
    disable_help_subcommand = true
)]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Reconstruct cell parameters and the division lineage across the
    /// image sequence.
    Run(RunArgs),

    /// Only bracket the annealing temperatures and print them.
    Calibrate(CalibrateArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Input micrographs, oldest first (8-bit grayscale, equal shapes)
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Initial colony CSV seeding frame 0
    #[arg(long)]
    initial: PathBuf,

    /// JSON config file
    #[arg(long)]
    config: PathBuf,

    /// Directory for synthetic best-fit frames
    #[arg(long, default_value = "bestfit")]
    bestfit: PathBuf,

    /// Directory for outline overlays
    #[arg(long, default_value = "output")]
    output: PathBuf,

    /// Directory for residual heatmaps (omitted: none are written)
    #[arg(long)]
    residual: Option<PathBuf>,

    /// Lineage CSV path
    #[arg(long, default_value = "lineage.csv")]
    lineage_file: PathBuf,

    /// Start temperature; leave unset with --auto-temp
    #[arg(long, conflicts_with = "auto_temp")]
    start_temp: Option<f64>,

    /// End temperature
    #[arg(long, requires = "start_temp", conflicts_with = "auto_temp")]
    end_temp: Option<f64>,

    /// Bracket temperatures from the bad-move acceptance rate first
    #[arg(long, default_value_t = false)]
    auto_temp: bool,

    /// Weight residuals by distance from cell boundaries
    #[arg(long, default_value_t = false)]
    dist: bool,

    /// Annealing iterations per cell per window
    #[arg(long, default_value_t = 6000)]
    iterations_per_cell: usize,

    /// Master RNG seed; worker seeds derive from it
    #[arg(long)]
    seed: Option<u64>,

    /// Independent restarts running in parallel
    #[arg(long, default_value_t = 1)]
    workers: usize,

    /// Restarts kept after selection
    #[arg(long, default_value_t = 1)]
    keep: usize,

    /// How kept restarts are chosen
    #[arg(long, value_enum, default_value_t = Strategy::BestWins)]
    strategy: Strategy,
}

#[derive(Args, Debug)]
struct CalibrateArgs {
    /// Input micrographs, oldest first
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Initial colony CSV seeding frame 0
    #[arg(long)]
    initial: PathBuf,

    /// JSON config file
    #[arg(long)]
    config: PathBuf,

    /// Weight residuals by distance from cell boundaries
    #[arg(long, default_value_t = false)]
    dist: bool,

    /// RNG seed for reproducible probes
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.cmd {
        Cmd::Run(args) => run(args),
        Cmd::Calibrate(args) => calibrate(&args),
    }
}

/// Initialize tracing with an env-driven filter (default INFO).
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = fmt::layer().with_target(false).with_level(true).compact();

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

fn run(args: RunArgs) -> Result<()> {
    let config = Config::load(&args.config).context("load config")?;
    let realimages = load_images(&args.images)?;
    let initial_colony = load_colony(&args.initial)?;
    let image_names = image_names(&args.images)?;

    let temperatures = resolve_temperatures(&args, &config, &realimages, &initial_colony)?;
    info!(
        frames = realimages.len(),
        cells = initial_colony.len(),
        start_temp = temperatures.start,
        end_temp = temperatures.end,
        "starting optimization"
    );

    if args.workers <= 1 {
        let mut sink = PngSink::new(
            image_names,
            args.bestfit.clone(),
            args.output.clone(),
            args.residual.clone(),
            args.lineage_file.clone(),
        )?;
        let mut optimizer =
            Optimizer::new(&config, &realimages, &initial_colony, options(&args, temperatures, args.seed))?;
        let cost = optimizer.run(&mut sink)?;
        info!(cost, "run finished");
        return Ok(());
    }

    run_parallel(
        &args,
        &config,
        &realimages,
        &initial_colony,
        &image_names,
        temperatures,
    )
}

fn options(args: &RunArgs, temperatures: TemperatureRange, seed: Option<u64>) -> RunOptions {
    RunOptions {
        temperatures,
        iterations_per_cell: args.iterations_per_cell,
        use_distance_objective: args.dist,
        emit_residual: args.residual.is_some(),
        seed,
    }
}

fn resolve_temperatures(
    args: &RunArgs,
    config: &Config,
    realimages: &[Array2<f64>],
    initial_colony: &[Bacillus],
) -> Result<TemperatureRange> {
    if let (Some(start), Some(end)) = (args.start_temp, args.end_temp) {
        return Ok(TemperatureRange { start, end });
    }
    if !args.auto_temp {
        bail!("either --start-temp and --end-temp, or --auto-temp, is required");
    }
    let range = calibrate_temperatures(config, realimages, initial_colony, args.dist, args.seed)?;
    info!(
        start = range.start,
        end = range.end,
        "calibrated temperatures"
    );
    Ok(range)
}

/// Run `--workers` independent restarts with distinct seeds, each into
/// its own directory tree, then rank them by the selection strategy.
fn run_parallel(
    args: &RunArgs,
    config: &Config,
    realimages: &[Array2<f64>],
    initial_colony: &[Bacillus],
    image_names: &[String],
    temperatures: TemperatureRange,
) -> Result<()> {
    let outcomes = (0..args.workers)
        .into_par_iter()
        .map(|worker| -> Result<WorkerOutcome> {
            let suffix = format!("worker-{worker:03}");
            let seed = args.seed.map(|s| s.wrapping_add(worker as u64));
            let mut sink = PngSink::new(
                image_names.to_vec(),
                args.bestfit.join(&suffix),
                args.output.join(&suffix),
                args.residual.as_ref().map(|dir| dir.join(&suffix)),
                worker_lineage_path(&args.lineage_file, worker),
            )?;
            let mut optimizer =
                Optimizer::new(config, realimages, initial_colony, options(args, temperatures, seed))?;
            let cost = optimizer.run(&mut sink)?;
            Ok(WorkerOutcome {
                worker,
                cost,
                output_root: args.output.join(&suffix),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let kept = select(outcomes, args.strategy, args.keep);
    for (rank, outcome) in kept.iter().enumerate() {
        info!(
            rank,
            worker = outcome.worker,
            cost = outcome.cost,
            path = %outcome.output_root.display(),
            "kept restart"
        );
    }
    Ok(())
}

fn worker_lineage_path(base: &Path, worker: usize) -> PathBuf {
    let stem = base
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("lineage");
    let ext = base.extension().and_then(|s| s.to_str()).unwrap_or("csv");
    base.with_file_name(format!("{stem}-worker-{worker:03}.{ext}"))
}

fn calibrate(args: &CalibrateArgs) -> Result<()> {
    let config = Config::load(&args.config).context("load config")?;
    let realimages = load_images(&args.images)?;
    let initial_colony = load_colony(&args.initial)?;

    let range = calibrate_temperatures(&config, &realimages, &initial_colony, args.dist, args.seed)?;
    println!("start_temp {}", range.start);
    println!("end_temp {}", range.end);
    Ok(())
}

/// Decode every input frame and require one common shape.
fn load_images(paths: &[PathBuf]) -> Result<Vec<Array2<f64>>> {
    let mut images = Vec::with_capacity(paths.len());
    let mut expected: Option<(usize, usize)> = None;
    for path in paths {
        let image =
            load_grayscale(path).with_context(|| format!("load image {}", path.display()))?;
        match expected {
            Some(shape) if image.dim() != shape => bail!(
                "image shape mismatch for {}: got {:?}, expected {:?}",
                path.display(),
                image.dim(),
                shape
            ),
            Some(_) => {}
            None => expected = Some(image.dim()),
        }
        images.push(image);
    }
    Ok(images)
}

fn image_names(paths: &[PathBuf]) -> Result<Vec<String>> {
    paths
        .iter()
        .map(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .map(str::to_owned)
                .with_context(|| format!("bad image path {}", path.display()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_lineage_paths_are_distinct() {
        let base = PathBuf::from("out/lineage.csv");
        let a = worker_lineage_path(&base, 0);
        let b = worker_lineage_path(&base, 1);
        assert_ne!(a, b);
        assert_eq!(a, PathBuf::from("out/lineage-worker-000.csv"));
    }

    #[test]
    fn image_names_strip_directories() {
        let names =
            image_names(&[PathBuf::from("frames/t000.png"), PathBuf::from("t001.png")]).unwrap();
        assert_eq!(names, ["t000.png", "t001.png"]);
    }
}
