//! stageflow - CLI

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use owo_colors::OwoColorize;
use serde::Serialize;
use stageflow::runtime::scheduler::{TaskInfo, TaskState};
use stageflow::stage::stage5::new_stage5;
use stageflow::util::config::{load_or_default, to_ron, AppConfig};
use stageflow::util::logger::{self, LogLevel};
use stageflow::{run_stage5, verify_determinism, RunOptions, NAME, VERSION};

/// Headless driver for frame-scheduled stage scripts
#[derive(Parser, Debug)]
#[command(name = "stageflow")]
#[command(version = VERSION)]
#[command(about = NAME, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Override the configured log level
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run stage 5 and print state snapshots
    Run {
        /// RON configuration file
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Maximum number of frames to simulate
        #[arg(short, long, default_value_t = 3600)]
        frames: u64,

        /// Print a snapshot every N frames (0 prints only the summary)
        #[arg(short, long, default_value_t = 600)]
        every: u64,

        /// Snapshot format
        #[arg(long, value_enum, default_value_t = Format::Json)]
        format: Format,

        /// Abort on the first task fault
        #[arg(long)]
        strict: bool,
    },

    /// Print the live task table after N frames
    Tasks {
        /// RON configuration file
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Frames to simulate before printing
        #[arg(short, long, default_value_t = 0)]
        frames: u64,
    },

    /// Run independent instances in parallel and compare their results
    Verify {
        /// RON configuration file
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Frames per run
        #[arg(short, long, default_value_t = 3600)]
        frames: u64,

        /// Number of runs
        #[arg(short, long, default_value_t = 4)]
        runs: usize,
    },

    /// Print the default configuration
    Config,

    /// Print version information
    Version,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Json,
    Ron,
}

fn render<T: Serialize>(
    value: &T,
    format: Format,
) -> Result<String> {
    match format {
        Format::Json => serde_json::to_string(value).context("Failed to render JSON"),
        Format::Ron => ron::to_string(value).context("Failed to render RON"),
    }
}

fn load(path: Option<&PathBuf>) -> Result<AppConfig> {
    load_or_default(path.map(PathBuf::as_path)).with_context(|| match path {
        Some(path) => format!("Failed to load config: {}", path.display()),
        None => "Failed to load default config".to_string(),
    })
}

fn init_logging(
    args: &Args,
    config: &AppConfig,
) {
    let level = match (args.log_level, args.verbose) {
        (Some(level), _) => level,
        (None, true) => LogLevel::Debug,
        (None, false) => config.log.level,
    };
    logger::init_with_level(level);
}

fn print_task(info: &TaskInfo) {
    let state = format!("{:?}", info.state);
    let state = match info.state {
        TaskState::Created => state.cyan().to_string(),
        TaskState::Running => state.green().to_string(),
        TaskState::Suspended => state.yellow().to_string(),
        TaskState::Terminated => state.red().to_string(),
    };
    let bound = info
        .bound_parent
        .map(|p| format!(" bound to {}", p))
        .unwrap_or_default();
    println!(
        "{:<10} {:<18} {:<20} step {:<3} wait {:?}{}",
        info.id.to_string(),
        info.name,
        state,
        info.step,
        info.wait,
        bound
    );
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.verbose {
        eprintln!("{} version: {}", NAME, VERSION);
        eprintln!("Host: {}", std::env::consts::OS);
    }

    match &args.command {
        Commands::Run {
            config,
            frames,
            every,
            format,
            strict,
        } => {
            let app = load(config.as_ref())?;
            init_logging(&args, &app);
            let options = RunOptions {
                max_frames: *frames,
                strict: *strict,
            };
            let mut snapshots = Vec::new();
            let summary = run_stage5(&app, options, |frame, stage, _| {
                if *every > 0 && frame % *every == 0 {
                    snapshots.push((frame, render(stage.state(), *format)));
                }
            })?;
            for (frame, snapshot) in snapshots {
                println!("{} {}", frame, snapshot?);
            }
            println!("{}", render(&summary, *format)?);
        }
        Commands::Tasks { config, frames } => {
            let app = load(config.as_ref())?;
            init_logging(&args, &app);
            let mut stage = new_stage5(&app.stage5, app.scheduler.clone()).context("Failed to set up stage5")?;
            let status = stage.run_for(*frames);
            println!("{} at frame {} ({:?})", stage.name().bold(), stage.frame(), status);
            for info in stage.scheduler().infos() {
                print_task(&info);
            }
        }
        Commands::Verify {
            config,
            frames,
            runs,
        } => {
            let app = load(config.as_ref())?;
            init_logging(&args, &app);
            verify_determinism(&app, *frames, *runs)?;
            println!("{} {} runs of {} frames agree", "ok".green(), runs, frames);
        }
        Commands::Config => {
            println!("{}", to_ron(&AppConfig::default())?);
        }
        Commands::Version => {
            println!("{} {}", NAME, VERSION);
        }
    }

    Ok(())
}
