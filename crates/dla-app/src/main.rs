use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dla_app::{RunOptions, install_stop_handler, run_simulation, summarize};
use dla_core::{Seed, SeedKind, Simulation, SimulationConfig};
use dla_storage::CheckpointStore;
use owo_colors::OwoColorize;
use tracing::info;

/// Bootstrap particles grown when a `random_walk` seed gives no count.
const DRIVER_SEED_PARTICLES: i64 = 20;

#[derive(Parser, Debug)]
#[command(
    name = "dla",
    version,
    about = "Grow and inspect generalized diffusion-limited aggregation clusters"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Launch particles with stickiness n/m until the target count attaches.
    Run(RunArgs),
    /// Summarize a saved history checkpoint.
    Inspect {
        /// Checkpoint file to read.
        path: PathBuf,
        /// Also report the record at or below this launch key.
        #[arg(long)]
        at: Option<u64>,
        /// Emit the summary as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Stickiness numerator.
    n: u32,
    /// Stickiness denominator.
    m: u32,
    /// Attached particle count at which the run ends.
    target: u64,
    /// Checkpoint file, rewritten on every save.
    #[arg(env = "DLA_CHECKPOINT")]
    output: PathBuf,
    /// Seconds between checkpoint saves.
    #[arg(long, default_value_t = 3_600)]
    save_interval_secs: u64,
    /// Initial cluster shape: dot, circle or random_walk.
    #[arg(long, default_value = "random_walk")]
    seed_kind: String,
    /// Circle radius or random-walk particle count for the seed.
    #[arg(long)]
    seed_value: Option<i64>,
    /// RNG seed for reproducible runs.
    #[arg(long)]
    rng_seed: Option<u64>,
    /// Initial populate radius; the lattice starts at twice this side length.
    #[arg(long, default_value_t = 50)]
    populate_radius: i32,
    /// Log the status line every this many attachments.
    #[arg(long, default_value_t = 100)]
    progress_every: u64,
    /// Continue from the latest record in the checkpoint file.
    #[arg(long)]
    resume: bool,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run_command(args),
        Command::Inspect { path, at, json } => inspect_command(path, at, json),
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn run_command(args: RunArgs) -> Result<()> {
    let options = RunOptions {
        n: args.n,
        m: args.m,
        target: args.target,
        save_interval: Duration::from_secs(args.save_interval_secs),
        progress_every: args.progress_every,
    };
    options.validate()?;

    let config = SimulationConfig {
        initial_populate_radius: args.populate_radius,
        rng_seed: args.rng_seed,
        ..SimulationConfig::default()
    };
    let store = CheckpointStore::open(&args.output)
        .with_context(|| format!("failed to open checkpoint {}", args.output.display()))?;

    let mut sim = if args.resume {
        let history = store.load().context("failed to load checkpoint for resume")?;
        let rng = config.seeded_rng();
        Simulation::resume(config, history, rng).context("failed to resume simulation")?
    } else {
        let value = match args.seed_kind.parse::<SeedKind>()? {
            SeedKind::RandomWalk => args.seed_value.or(Some(DRIVER_SEED_PARTICLES)),
            _ => args.seed_value,
        };
        let seed = Seed::from_parts(&args.seed_kind, value)?;
        let mut sim = Simulation::new(config)?;
        sim.initialize(seed).context("failed to seed cluster")?;
        sim
    };

    let stop = install_stop_handler().context("failed to install interrupt handler")?;
    let report = run_simulation(&mut sim, &store, &options, &stop)?;
    info!(saves = report.saves, "driver exiting");

    let status = if report.stopped {
        "stopped".yellow().bold().to_string()
    } else {
        "complete".green().bold().to_string()
    };
    println!("{status} {}", report.counters);
    println!("{} {}", "checkpoint".cyan(), store.path().display());
    Ok(())
}

fn inspect_command(path: PathBuf, at: Option<u64>, json: bool) -> Result<()> {
    let history = CheckpointStore::read(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let summary = summarize(&history, at)?;

    if json {
        let pretty =
            serde_json::to_string_pretty(&summary).context("failed to format summary JSON")?;
        println!("{pretty}");
    } else {
        println!("{}", path.display().bold());
        println!("{}", "-".repeat(48).dimmed());
        println!("{summary}");
    }
    Ok(())
}
