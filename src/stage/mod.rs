//! Stage context and per-frame update entry point
//!
//! A [`Stage`] bundles everything one level needs to animate: its frame clock,
//! its task scheduler and the shared animation state the tasks work on.
//! The main loop calls [`Stage::update`] exactly once per rendered frame and
//! hands the state to the renderer afterwards.

pub mod diagnostics;
pub mod stage5;

pub use diagnostics::{CollectingSink, DiagnosticsSink, FaultLog, TracingSink};

use serde::Serialize;
use tracing::{debug, info};

use crate::runtime::clock::{Frame, FrameClock};
use crate::runtime::scheduler::{
    AdvanceReport, SchedulerConfig, SchedulerResult, TaskBuilder, TaskId, TaskScheduler,
};

/// Result of one update, as seen by the main loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StageStatus {
    /// Keep calling `update`.
    Continue,
    /// The stage has nothing more to animate.
    Finished,
}

impl StageStatus {
    /// Check if the stage is finished.
    #[inline]
    pub fn is_finished(&self) -> bool {
        matches!(self, StageStatus::Finished)
    }
}

/// Shared per-stage animation state.
pub trait StageState: 'static {
    /// Scheduler-independent per-frame updates, applied after the tasks ran.
    fn update_derived(
        &mut self,
        _frame: Frame,
    ) {
    }

    /// Status reported to the main loop after the frame.
    fn status(&self) -> StageStatus {
        StageStatus::Continue
    }
}

/// One active stage.
pub struct Stage<S: StageState> {
    name: String,
    clock: FrameClock,
    scheduler: TaskScheduler<S>,
    state: S,
    diagnostics: Box<dyn DiagnosticsSink>,
    status: StageStatus,
}

impl<S: StageState> Stage<S> {
    /// Create a stage with default scheduler config.
    pub fn new(
        name: impl Into<String>,
        state: S,
    ) -> Self {
        Self::with_config(name, state, SchedulerConfig::default())
    }

    /// Create a stage with a custom scheduler config.
    pub fn with_config(
        name: impl Into<String>,
        state: S,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            name: name.into(),
            clock: FrameClock::new(),
            scheduler: TaskScheduler::with_config(config),
            state,
            diagnostics: Box::new(TracingSink),
            status: StageStatus::Continue,
        }
    }

    /// Replace the diagnostics sink task faults are reported to.
    pub fn with_diagnostics(
        mut self,
        sink: impl DiagnosticsSink + 'static,
    ) -> Self {
        self.diagnostics = Box::new(sink);
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current frame number.
    #[inline]
    pub fn frame(&self) -> Frame {
        self.clock.current()
    }

    #[inline]
    pub fn clock(&self) -> &FrameClock {
        &self.clock
    }

    /// Published animation state.
    #[inline]
    pub fn state(&self) -> &S {
        &self.state
    }

    /// Mutable state, for stage setup and tests. Not for use between updates
    /// of a running stage.
    #[inline]
    pub fn state_mut(&mut self) -> &mut S {
        &mut self.state
    }

    #[inline]
    pub fn scheduler(&self) -> &TaskScheduler<S> {
        &self.scheduler
    }

    /// Status reported by the last update.
    #[inline]
    pub fn status(&self) -> StageStatus {
        self.status
    }

    /// Spawn a top-level task.
    pub fn spawn(
        &mut self,
        builder: TaskBuilder<S>,
    ) -> SchedulerResult<TaskId> {
        self.scheduler.spawn(builder)
    }

    /// Spawn a task bound to `parent`.
    pub fn spawn_child(
        &mut self,
        parent: TaskId,
        builder: TaskBuilder<S>,
    ) -> SchedulerResult<TaskId> {
        self.scheduler.spawn_child(parent, builder)
    }

    /// Cancel a task and its bound children. Unknown handles are a no-op.
    pub fn cancel(
        &mut self,
        task: TaskId,
    ) -> usize {
        self.scheduler.cancel(task, &mut self.state)
    }

    /// Per-frame entry point.
    ///
    /// Ticks the clock, advances the scheduler, reports faults and applies the
    /// derived per-frame updates. Must be called exactly once per rendered frame.
    pub fn update(&mut self) -> StageStatus {
        self.update_with_report();
        self.status
    }

    /// Like [`Self::update`], but surfaces the first task fault of the frame
    /// as an error. The frame is fully processed either way.
    pub fn update_checked(&mut self) -> SchedulerResult<StageStatus> {
        self.update_with_report().into_result()?;
        Ok(self.status)
    }

    /// Like [`Self::update`], returning what the scheduler did.
    pub fn update_with_report(&mut self) -> AdvanceReport {
        let frame = self.clock.tick();
        let report = self.scheduler.advance(frame, &mut self.state);
        for fault in &report.faults {
            self.diagnostics.report(&self.name, fault);
        }
        self.state.update_derived(frame);

        let status = self.state.status();
        if status != self.status {
            info!(stage = %self.name, frame, ?status, "stage status changed");
        }
        self.status = status;
        report
    }

    /// Update until the stage finishes or `max_frames` updates ran.
    pub fn run_for(
        &mut self,
        max_frames: Frame,
    ) -> StageStatus {
        for _ in 0..max_frames {
            if self.update().is_finished() {
                break;
            }
        }
        self.status
    }

    /// Re-initialize: cancel every task, rewind the clock and install `state`.
    pub fn reset(
        &mut self,
        state: S,
    ) {
        let cancelled = self.scheduler.cancel_all(&mut self.state);
        debug!(stage = %self.name, cancelled, "stage reset");
        self.scheduler.rewind();
        self.clock.reset();
        self.state = state;
        self.status = StageStatus::Continue;
    }

    /// Cancel every live task. Returns how many were cancelled.
    pub fn teardown(&mut self) -> usize {
        self.scheduler.cancel_all(&mut self.state)
    }
}

impl<S: StageState> Drop for Stage<S> {
    fn drop(&mut self) {
        self.scheduler.cancel_all(&mut self.state);
    }
}

impl<S: StageState> std::fmt::Debug for Stage<S> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name)
            .field("clock", &self.clock)
            .field("scheduler", &self.scheduler)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests;
