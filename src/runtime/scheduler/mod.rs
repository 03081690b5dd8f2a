//! Frame-synchronous cooperative task scheduler
//!
//! Tasks are explicit state machines ([`Script`]) that run one step per turn
//! and then suspend on a frame countdown or a predicate over the stage state.
//! [`TaskScheduler::advance`] is called once per rendered frame and gives every
//! eligible task exactly one turn, strictly one after another.
//!
//! # Ordering
//!
//! - Eligible tasks are snapshotted at the start of the advance, in insertion
//!   order. Predicates see the state as it was before any task ran.
//! - Tasks spawned during an advance join the live set after it, so the
//!   earliest they can run is the next advance.
//! - Terminated tasks are reaped at the end of the advance.

pub mod context;
pub mod error;
pub mod task;
pub mod wait;

pub use context::TaskContext;
pub use error::{SchedulerError, SchedulerResult, TaskFault};
pub use task::{Script, ScriptFn, TaskBuilder, TaskId, TaskIdGenerator, TaskInfo, TaskState, Termination};
pub use wait::{Predicate, Step, Wait, WaitSnapshot};

use std::panic::{self, AssertUnwindSafe};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, trace_span, warn};

use crate::runtime::clock::Frame;
use context::{Commands, SpawnRequest};
use error::panic_message;
use task::TaskEntry;
use wait::Resume;

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Upper bound on live plus newly spawned tasks.
    pub max_live_tasks: usize,
    /// Catch panics in task bodies and predicates and report them as faults.
    pub catch_panics: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_live_tasks: 4096,
            catch_panics: true,
        }
    }
}

/// Scheduler statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    /// Total tasks spawned.
    pub spawned: u64,
    /// Total turns given to tasks.
    pub resumes: u64,
    /// Tasks that ran to completion.
    pub completed: u64,
    /// Tasks that were cancelled.
    pub cancelled: u64,
    /// Tasks terminated by a fault.
    pub faulted: u64,
}

impl SchedulerStats {
    fn record_termination(
        &mut self,
        reason: Termination,
    ) {
        match reason {
            Termination::Completed => self.completed += 1,
            Termination::Cancelled => self.cancelled += 1,
            Termination::Faulted => self.faulted += 1,
        }
    }
}

/// What happened during one advance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AdvanceReport {
    /// Frame the advance ran for.
    pub frame: Frame,
    /// Number of tasks that had a turn.
    pub resumed: usize,
    /// Tasks spawned during the pass, in spawn order.
    pub spawned: Vec<TaskId>,
    /// Tasks terminated during the pass, in termination order.
    pub terminated: Vec<(TaskId, Termination)>,
    /// Faults caught during the pass.
    pub faults: Vec<TaskFault>,
}

impl AdvanceReport {
    fn new(frame: Frame) -> Self {
        Self {
            frame,
            ..Self::default()
        }
    }

    /// Check if any task faulted.
    #[inline]
    pub fn has_faults(&self) -> bool {
        !self.faults.is_empty()
    }

    /// Surface the first fault as an error.
    pub fn into_result(self) -> SchedulerResult<()> {
        match self.faults.into_iter().next() {
            Some(fault) => Err(SchedulerError::TaskFault(fault)),
            None => Ok(()),
        }
    }
}

/// Owns the live tasks of one stage and steps them in lockstep with the
/// frame clock.
pub struct TaskScheduler<S> {
    /// Configuration.
    config: SchedulerConfig,
    /// Live tasks in insertion order.
    tasks: IndexMap<TaskId, TaskEntry<S>>,
    /// Tasks spawned during the current advance.
    staged: Vec<TaskEntry<S>>,
    /// Task ID generator.
    ids: TaskIdGenerator,
    /// Frame of the most recent advance.
    frame: Frame,
    /// Statistics.
    stats: SchedulerStats,
}

impl<S> std::fmt::Debug for TaskScheduler<S> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("TaskScheduler")
            .field("config", &self.config)
            .field("live", &self.tasks.len())
            .field("frame", &self.frame)
            .field("stats", &self.stats)
            .finish()
    }
}

impl<S: 'static> Default for TaskScheduler<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: 'static> TaskScheduler<S> {
    /// Create a scheduler with default config.
    #[inline]
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    /// Create a scheduler with custom configuration.
    pub fn with_config(config: SchedulerConfig) -> Self {
        Self {
            config,
            tasks: IndexMap::new(),
            staged: Vec::new(),
            ids: TaskIdGenerator::new(),
            frame: 0,
            stats: SchedulerStats::default(),
        }
    }

    /// Configuration.
    #[inline]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Statistics.
    #[inline]
    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    /// Frame of the most recent advance.
    #[inline]
    pub fn frame(&self) -> Frame {
        self.frame
    }

    /// Number of live tasks.
    #[inline]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Check if no task is live.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Check if `id` is in the live set.
    #[inline]
    pub fn is_live(
        &self,
        id: TaskId,
    ) -> bool {
        self.tasks.contains_key(&id)
    }

    /// Live task handles in insertion order.
    pub fn task_ids(&self) -> Vec<TaskId> {
        self.tasks.keys().copied().collect()
    }

    /// Snapshots of all live tasks in insertion order.
    pub fn infos(&self) -> Vec<TaskInfo> {
        self.tasks.values().map(TaskEntry::info).collect()
    }

    /// State of a live task.
    pub fn state(
        &self,
        id: TaskId,
    ) -> SchedulerResult<TaskState> {
        self.entry(id).map(|entry| entry.state)
    }

    /// Snapshot of a live task.
    pub fn info(
        &self,
        id: TaskId,
    ) -> SchedulerResult<TaskInfo> {
        self.entry(id).map(TaskEntry::info)
    }

    /// Advances left before a frame-waiting task resumes.
    ///
    /// `None` when the task waits on a predicate.
    pub fn frames_until_resume(
        &self,
        id: TaskId,
    ) -> SchedulerResult<Option<u32>> {
        self.entry(id).map(|entry| match entry.resume {
            Resume::Frames(remaining) => Some(remaining),
            Resume::Until(_) => None,
        })
    }

    fn entry(
        &self,
        id: TaskId,
    ) -> SchedulerResult<&TaskEntry<S>> {
        self.tasks
            .get(&id)
            .ok_or(SchedulerError::UnknownTaskHandle(id))
    }

    fn remaining_capacity(&self) -> usize {
        self.config
            .max_live_tasks
            .saturating_sub(self.tasks.len() + self.staged.len())
    }

    /// Spawn a top-level task.
    pub fn spawn(
        &mut self,
        builder: TaskBuilder<S>,
    ) -> SchedulerResult<TaskId> {
        self.spawn_inner(builder, None)
    }

    /// Spawn a task bound to `parent`: it is cancelled when `parent` terminates.
    pub fn spawn_child(
        &mut self,
        parent: TaskId,
        builder: TaskBuilder<S>,
    ) -> SchedulerResult<TaskId> {
        if !self.is_live(parent) {
            return Err(SchedulerError::UnknownTaskHandle(parent));
        }
        self.spawn_inner(builder, Some(parent))
    }

    fn spawn_inner(
        &mut self,
        builder: TaskBuilder<S>,
        parent: Option<TaskId>,
    ) -> SchedulerResult<TaskId> {
        if self.remaining_capacity() == 0 {
            return Err(SchedulerError::TaskLimitExceeded {
                limit: self.config.max_live_tasks,
            });
        }
        let (script, name, resume) = builder.into_parts()?;
        let id = self.ids.next();
        if let Some(parent) = parent.and_then(|p| self.tasks.get_mut(&p)) {
            parent.bound_children.push(id);
        }
        trace!(task = %id, name = %name, "spawn");
        let entry = TaskEntry::new(id, name, script, resume, self.frame, parent, parent);
        self.tasks.insert(id, entry);
        self.stats.spawned += 1;
        Ok(id)
    }

    /// Give every eligible task one turn for `frame`.
    ///
    /// Faults are isolated to the faulting task and returned in the report.
    pub fn advance(
        &mut self,
        frame: Frame,
        state: &mut S,
    ) -> AdvanceReport {
        let _span = trace_span!("advance", frame).entered();
        self.frame = frame;
        let mut report = AdvanceReport::new(frame);

        let eligible = self.collect_eligible(state, &mut report);
        for id in eligible {
            self.run_task(id, state, &mut report);
        }

        self.reap();
        for entry in std::mem::take(&mut self.staged) {
            self.tasks.insert(entry.id, entry);
        }
        report
    }

    /// Poll every pending task once, in insertion order.
    fn collect_eligible(
        &mut self,
        state: &mut S,
        report: &mut AdvanceReport,
    ) -> Vec<TaskId> {
        let catch_panics = self.config.catch_panics;
        let frame = self.frame;
        let mut eligible = Vec::new();
        let mut faulted = Vec::new();

        for (id, entry) in self.tasks.iter_mut() {
            if !entry.state.is_pending() {
                continue;
            }
            let resume = &mut entry.resume;
            let snapshot: &S = state;
            let polled = if catch_panics {
                panic::catch_unwind(AssertUnwindSafe(|| resume.poll(snapshot)))
            } else {
                Ok(resume.poll(snapshot))
            };
            match polled {
                Ok(true) => eligible.push(*id),
                Ok(false) => {}
                Err(payload) => {
                    faulted.push(TaskFault {
                        task: *id,
                        name: entry.name.clone(),
                        frame,
                        step: entry.step,
                        message: format!("wait predicate panicked: {}", panic_message(&*payload)),
                        panicked: true,
                    });
                }
            }
        }

        for fault in faulted {
            let task = fault.task;
            report.faults.push(fault);
            self.terminate_tree(task, Termination::Faulted, state, report);
        }
        eligible
    }

    fn run_task(
        &mut self,
        id: TaskId,
        state: &mut S,
        report: &mut AdvanceReport,
    ) {
        let capacity = self.remaining_capacity();
        let limit = self.config.max_live_tasks;
        let catch_panics = self.config.catch_panics;
        let frame = self.frame;

        let Some(entry) = self.tasks.get_mut(&id) else {
            return;
        };
        // Cancelled earlier in this pass.
        if entry.state == TaskState::Terminated {
            return;
        }
        entry.state = TaskState::Running;
        trace!(task = %id, step = entry.step, "resume");

        let mut commands = Commands::default();
        let outcome = {
            let mut ctx = TaskContext::new(
                id,
                entry.step,
                frame,
                entry.spawned_at,
                state,
                &mut commands,
                &mut self.ids,
                capacity,
                limit,
            );
            let script = &mut entry.script;
            if catch_panics {
                panic::catch_unwind(AssertUnwindSafe(|| script.step(&mut ctx)))
            } else {
                Ok(script.step(&mut ctx))
            }
        };
        entry.resumes += 1;
        self.stats.resumes += 1;
        report.resumed += 1;

        let termination = match outcome {
            Ok(Ok(Step::Suspend { next, wait })) => {
                entry.step = next;
                entry.resume = wait.into();
                entry.state = TaskState::Suspended;
                None
            }
            Ok(Ok(Step::Done)) => Some(Termination::Completed),
            Ok(Err(err)) => {
                report.faults.push(TaskFault {
                    task: id,
                    name: entry.name.clone(),
                    frame,
                    step: entry.step,
                    message: format!("{err:#}"),
                    panicked: false,
                });
                Some(Termination::Faulted)
            }
            Err(payload) => {
                report.faults.push(TaskFault {
                    task: id,
                    name: entry.name.clone(),
                    frame,
                    step: entry.step,
                    message: panic_message(&*payload),
                    panicked: true,
                });
                Some(Termination::Faulted)
            }
        };

        // Spawns are linked first so a terminating task takes its bound
        // children with it. Its own reason wins over a queued self-cancel.
        let Commands { spawns, cancels } = commands;
        self.stage_spawns(id, spawns, report);
        if let Some(reason) = termination {
            self.terminate_tree(id, reason, state, report);
        }
        for target in cancels {
            self.terminate_tree(target, Termination::Cancelled, state, report);
        }
    }

    fn stage_spawns(
        &mut self,
        origin: TaskId,
        spawns: Vec<SpawnRequest<S>>,
        report: &mut AdvanceReport,
    ) {
        for request in spawns {
            let bound_parent = request.bound.then_some(origin);
            if bound_parent.is_some() {
                if let Some(parent) = self.tasks.get_mut(&origin) {
                    parent.bound_children.push(request.id);
                }
            }
            trace!(task = %request.id, name = %request.name, parent = %origin, "spawn");
            self.staged.push(TaskEntry::new(
                request.id,
                request.name,
                request.script,
                request.resume,
                self.frame,
                Some(origin),
                bound_parent,
            ));
            self.stats.spawned += 1;
            report.spawned.push(request.id);
        }
    }

    /// Terminate `root` for `reason` and cancel its bound descendants.
    ///
    /// Returns how many tasks were terminated. Entries stay in the table
    /// until [`Self::reap`].
    fn terminate_tree(
        &mut self,
        root: TaskId,
        reason: Termination,
        state: &mut S,
        report: &mut AdvanceReport,
    ) -> usize {
        let catch_panics = self.config.catch_panics;
        let frame = self.frame;
        let mut stack = vec![(root, reason)];
        let mut count = 0;

        while let Some((id, reason)) = stack.pop() {
            let (name, step, script) = if let Some(entry) = self.tasks.get_mut(&id) {
                if entry.state == TaskState::Terminated {
                    continue;
                }
                entry.state = TaskState::Terminated;
                stack.extend(
                    entry
                        .bound_children
                        .iter()
                        .rev()
                        .map(|child| (*child, Termination::Cancelled)),
                );
                (entry.name.clone(), entry.step, &mut entry.script)
            } else if let Some(pos) = self.staged.iter().position(|e| e.id == id) {
                let entry = self.staged.remove(pos);
                if let Some(parent) = entry.bound_parent.and_then(|p| self.tasks.get_mut(&p)) {
                    parent.bound_children.retain(|child| *child != id);
                }
                let mut script = entry.script;
                if let Some(message) = Self::finalize(&mut script, state, reason, catch_panics) {
                    report
                        .faults
                        .push(finalizer_fault(id, entry.name.clone(), frame, entry.step, message));
                }
                count += 1;
                self.stats.record_termination(reason);
                report.terminated.push((id, reason));
                debug!(task = %id, name = %entry.name, ?reason, "terminated before first turn");
                continue;
            } else {
                continue;
            };

            if let Some(message) = Self::finalize(script, state, reason, catch_panics) {
                report
                    .faults
                    .push(finalizer_fault(id, name.clone(), frame, step, message));
            }
            count += 1;
            self.stats.record_termination(reason);
            report.terminated.push((id, reason));
            match reason {
                Termination::Faulted => warn!(task = %id, name = %name, "task faulted"),
                _ => debug!(task = %id, name = %name, ?reason, "task terminated"),
            }
        }
        count
    }

    /// Run a finalizer; returns the panic message if it panicked.
    fn finalize(
        script: &mut Box<dyn Script<S>>,
        state: &mut S,
        reason: Termination,
        catch_panics: bool,
    ) -> Option<String> {
        if !catch_panics {
            script.on_terminate(state, reason);
            return None;
        }
        panic::catch_unwind(AssertUnwindSafe(|| script.on_terminate(state, reason)))
            .err()
            .map(|payload| format!("finalizer panicked: {}", panic_message(&*payload)))
    }

    /// Drop terminated entries and unlink them from their bound parents.
    fn reap(&mut self) {
        let unlinked: Vec<(TaskId, TaskId)> = self
            .tasks
            .values()
            .filter(|entry| entry.state == TaskState::Terminated)
            .filter_map(|entry| entry.bound_parent.map(|parent| (parent, entry.id)))
            .collect();
        self.tasks
            .retain(|_, entry| entry.state != TaskState::Terminated);
        for (parent, child) in unlinked {
            if let Some(parent) = self.tasks.get_mut(&parent) {
                parent.bound_children.retain(|c| *c != child);
            }
        }
    }

    /// Cancel `id` and its bound children without running more body code.
    ///
    /// Finalizers still run. Unknown or already terminated handles are a
    /// no-op. Returns how many tasks were terminated.
    pub fn cancel(
        &mut self,
        id: TaskId,
        state: &mut S,
    ) -> usize {
        let mut report = AdvanceReport::new(self.frame);
        let count = self.terminate_tree(id, Termination::Cancelled, state, &mut report);
        self.reap();
        for fault in &report.faults {
            warn!("{}", fault);
        }
        count
    }

    /// Cancel every live task, in insertion order.
    pub fn cancel_all(
        &mut self,
        state: &mut S,
    ) -> usize {
        let mut report = AdvanceReport::new(self.frame);
        let mut count = 0;
        for id in self.task_ids() {
            count += self.terminate_tree(id, Termination::Cancelled, state, &mut report);
        }
        self.reap();
        for fault in &report.faults {
            warn!("{}", fault);
        }
        count
    }

    /// Forget the frame of the last advance. Used on stage re-initialization,
    /// after the live set has been cancelled.
    pub(crate) fn rewind(&mut self) {
        self.frame = 0;
    }
}

fn finalizer_fault(
    task: TaskId,
    name: String,
    frame: Frame,
    step: usize,
    message: String,
) -> TaskFault {
    TaskFault {
        task,
        name,
        frame,
        step,
        message,
        panicked: true,
    }
}

#[cfg(test)]
mod tests;
