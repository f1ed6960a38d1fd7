use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rankwatch_cli::demo::{self, DemoOptions};
use rankwatch_cli::duration::parse_duration;
use rankwatch_cli::offline::{self, GPU_PREFIX, TIMER_PREFIX};
use rankwatch_cli::{Overrides, Settings};
use rankwatch_sdk::save_report;

#[derive(Parser, Debug)]
#[command(name = "rankwatch")]
#[command(about = "Aggregate per-rank timing and GPU memory snapshots")]
#[command(version)]
struct Cli {
    /// TOML settings file (world_size, snapshot_dir, results_dir, prefix)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset (e.g. "debug", "rankwatch_sdk=trace")
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Summarize duration_dict_<rank>.json files: mean and deviation per key
    Timers {
        #[command(flatten)]
        common: CommonArgs,

        /// Also list every rank's value under each key
        #[arg(long)]
        detail: bool,
    },

    /// Summarize gpu_memory_<rank>.json files: per-rank and global usage
    Gpu {
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Run a threaded multi-rank demo and print its reports
    Demo {
        #[command(flatten)]
        common: CommonArgs,

        /// Iterations per rank
        #[arg(long, default_value = "5")]
        steps: usize,

        /// Base forward-pass time (e.g. "20ms")
        #[arg(long, default_value = "20ms")]
        step_time: String,

        /// How long a rank waits for the others at a checkpoint
        #[arg(long, default_value = "60s")]
        barrier_timeout: String,
    },
}

#[derive(Args, Debug, Clone)]
struct CommonArgs {
    /// Number of ranks
    #[arg(short, long)]
    world_size: Option<usize>,

    /// Directory holding the snapshot files
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// Directory reports are saved to
    #[arg(short, long)]
    results_dir: Option<PathBuf>,

    /// Report file name stem (saved as <results_dir>/<prefix>.txt)
    #[arg(short, long)]
    prefix: Option<String>,

    /// Print the report as JSON instead of text
    #[arg(long)]
    json: bool,

    /// Print only; do not save a report file
    #[arg(long)]
    no_save: bool,
}

impl CommonArgs {
    fn overrides(&self) -> Overrides {
        Overrides {
            world_size: self.world_size,
            snapshot_dir: self.dir.clone(),
            results_dir: self.results_dir.clone(),
            prefix: self.prefix.clone(),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Command::Timers { common, detail } => {
            let settings = Settings::load(cli.config.as_deref(), &common.overrides())?;
            run_timers(&settings, common, *detail)
        }
        Command::Gpu { common } => {
            let settings = Settings::load(cli.config.as_deref(), &common.overrides())?;
            run_gpu(&settings, common)
        }
        Command::Demo {
            common,
            steps,
            step_time,
            barrier_timeout,
        } => {
            let settings = Settings::load(cli.config.as_deref(), &common.overrides())?;
            let options = DemoOptions {
                world_size: settings.world_size,
                steps: *steps,
                step_time: parse_duration(step_time)?,
                snapshot_dir: settings.snapshot_dir.clone(),
                barrier_timeout: parse_duration(barrier_timeout)?,
            };
            run_demo(&settings, common, &options)
        }
    }
}

fn run_timers(settings: &Settings, common: &CommonArgs, detail: bool) -> Result<()> {
    let Some(report) = offline::timer_summary(&settings.snapshot_dir, settings.world_size) else {
        println!("No timer snapshots found in {}", settings.snapshot_dir.display());
        return Ok(());
    };

    let text = if common.json {
        serde_json::to_string_pretty(&report)?
    } else if detail {
        report.detail()
    } else {
        report.summary()
    };
    emit(settings, common, settings.prefix_or(TIMER_PREFIX), &text)
}

fn run_gpu(settings: &Settings, common: &CommonArgs) -> Result<()> {
    let Some(report) = offline::gpu_summary(&settings.snapshot_dir, settings.world_size) else {
        println!("No GPU memory snapshots found in {}", settings.snapshot_dir.display());
        return Ok(());
    };

    let text = if common.json {
        serde_json::to_string_pretty(&report)?
    } else {
        report.summary()
    };
    emit(settings, common, settings.prefix_or(GPU_PREFIX), &text)
}

fn run_demo(settings: &Settings, common: &CommonArgs, options: &DemoOptions) -> Result<()> {
    let outcome = demo::run(options)?;

    if let Some(report) = &outcome.timers {
        let text = if common.json {
            serde_json::to_string_pretty(report)?
        } else {
            report.detail()
        };
        let prefix = format!("{}_{}", settings.prefix_or("demo"), TIMER_PREFIX);
        emit(settings, common, &prefix, &text)?;
    }
    if let Some(report) = &outcome.resources {
        let text = if common.json {
            serde_json::to_string_pretty(report)?
        } else {
            report.summary()
        };
        let prefix = format!("{}_{}", settings.prefix_or("demo"), GPU_PREFIX);
        emit(settings, common, &prefix, &text)?;
    }

    println!(
        "Snapshots left in {}; try `rankwatch timers --dir {} --world-size {}`",
        options.snapshot_dir.display(),
        options.snapshot_dir.display(),
        options.world_size
    );
    Ok(())
}

/// Print a report and, unless disabled, save it under the results directory.
fn emit(settings: &Settings, common: &CommonArgs, prefix: &str, text: &str) -> Result<()> {
    println!("{}", text);
    if common.no_save {
        return Ok(());
    }
    let path = save_report(&settings.results_dir, prefix, text)
        .with_context(|| format!("failed to save report to {}", settings.results_dir.display()))?;
    eprintln!("Report saved to {}", path.display());
    Ok(())
}
