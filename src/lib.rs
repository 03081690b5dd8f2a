//! stageflow
//!
//! Frame-synchronized cooperative scripting for shoot-'em-up stages. Stage
//! behavior is written as long-lived sequential scripts that suspend once per
//! frame; the stage's update entry point advances all of them in lockstep
//! with the frame clock.
//!
//! # Example
//!
//! ```rust
//! use stageflow::runtime::scheduler::{Step, TaskBuilder};
//! use stageflow::stage::{Stage, StageState};
//!
//! #[derive(Default)]
//! struct Lights {
//!     on: bool,
//! }
//!
//! impl StageState for Lights {}
//!
//! let mut stage = Stage::new("demo", Lights::default());
//! stage
//!     .spawn(TaskBuilder::<Lights>::from_fn("switch", |ctx| {
//!         ctx.state_mut().on = true;
//!         Ok(Step::Done)
//!     }).delay(2))
//!     .unwrap();
//!
//! stage.update();
//! assert!(!stage.state().on);
//! stage.update();
//! assert!(stage.state().on);
//! ```

#![doc(html_root_url = "https://docs.rs/stageflow")]
#![warn(rust_2018_idioms)]

pub mod runtime;
pub mod stage;
pub mod util;

// Re-exports
pub use anyhow::{Context, Result};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::runtime::clock::Frame;
use crate::runtime::scheduler::{AdvanceReport, SchedulerStats};
use crate::stage::stage5::{new_stage5, Stage5, Stage5State};
use crate::stage::StageStatus;
use crate::util::config::AppConfig;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = "stageflow";

/// Options of a simulated run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Stop after this many frames even if the stage is not finished
    pub max_frames: Frame,
    /// Fail on the first task fault instead of only reporting it
    pub strict: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_frames: 60 * 60,
            strict: false,
        }
    }
}

/// Outcome of a simulated run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub frames: Frame,
    pub status: StageStatus,
    pub live_tasks: usize,
    pub faults: usize,
    pub stats: SchedulerStats,
    pub state: Stage5State,
}

/// Run stage 5 headless, calling `observe` after every frame.
///
/// # Example
///
/// ```no_run
/// use stageflow::{run_stage5, RunOptions};
/// use stageflow::util::config::AppConfig;
///
/// fn main() -> stageflow::Result<()> {
///     let summary = run_stage5(&AppConfig::default(), RunOptions::default(), |_, _, _| {})?;
///     println!("{:?} after {} frames", summary.status, summary.frames);
///     Ok(())
/// }
/// ```
pub fn run_stage5<F>(
    config: &AppConfig,
    options: RunOptions,
    mut observe: F,
) -> Result<RunSummary>
where
    F: FnMut(Frame, &Stage5, &AdvanceReport),
{
    let mut stage =
        new_stage5(&config.stage5, config.scheduler.clone()).context("Failed to set up stage5")?;
    let mut faults = 0;

    while stage.frame() < options.max_frames {
        let report = stage.update_with_report();
        faults += report.faults.len();
        observe(stage.frame(), &stage, &report);
        if options.strict {
            let frame = stage.frame();
            report
                .into_result()
                .with_context(|| format!("stage5 faulted at frame {}", frame))?;
        }
        if stage.status().is_finished() {
            break;
        }
    }

    info!(
        frames = stage.frame(),
        status = ?stage.status(),
        faults,
        "stage5 run complete"
    );
    Ok(RunSummary {
        frames: stage.frame(),
        status: stage.status(),
        live_tasks: stage.scheduler().len(),
        faults,
        stats: stage.scheduler().stats().clone(),
        state: stage.state().clone(),
    })
}

/// Run `runs` independent stage 5 instances in parallel and check that they
/// all end in the same state.
///
/// Returns the shared final state rendered as JSON.
pub fn verify_determinism(
    config: &AppConfig,
    max_frames: Frame,
    runs: usize,
) -> Result<String> {
    let options = RunOptions {
        max_frames,
        strict: false,
    };
    let outputs: Vec<String> = (0..runs.max(1))
        .into_par_iter()
        .map(|run| {
            debug!(run, "determinism run started");
            let summary = run_stage5(config, options, |_, _, _| {})?;
            serde_json::to_string(&summary).context("Failed to serialize run summary")
        })
        .collect::<Result<_>>()?;

    let first = &outputs[0];
    if let Some(run) = outputs.iter().position(|o| o != first) {
        anyhow::bail!("run {} diverged from run 0", run);
    }
    Ok(first.clone())
}
