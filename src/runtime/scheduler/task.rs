//! Task definitions for the scheduler.
//!
//! A task is a [`Script`] plus the scheduling state the [`TaskScheduler`]
//! keeps for it: the step index to continue at and the condition to resume on.
//!
//! [`TaskScheduler`]: super::TaskScheduler

use serde::Serialize;
use smallvec::SmallVec;

use super::context::TaskContext;
use super::error::{SchedulerError, SchedulerResult};
use super::wait::{Predicate, Resume, Step, WaitSnapshot};
use crate::runtime::clock::Frame;

/// Opaque task handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TaskId(pub usize);

impl TaskId {
    /// Get the inner value.
    #[inline]
    pub fn inner(&self) -> usize {
        self.0
    }
}

impl From<usize> for TaskId {
    fn from(val: usize) -> Self {
        Self(val)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "Task({})", self.0)
    }
}

/// Task state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TaskState {
    /// Spawned, body not entered yet.
    Created,
    /// Executing its own turn inside an advance.
    Running,
    /// Waiting on a frame countdown or predicate.
    Suspended,
    /// Finished, faulted or cancelled. Never runs again.
    Terminated,
}

impl TaskState {
    /// Check if the task waits for a future advance.
    #[inline]
    pub fn is_pending(&self) -> bool {
        matches!(self, TaskState::Created | TaskState::Suspended)
    }
}

/// Why a task terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Termination {
    /// The procedure returned [`Step::Done`].
    Completed,
    /// Cancelled externally, by another task, or through a bound parent.
    Cancelled,
    /// The body returned an error or panicked.
    Faulted,
}

/// A cooperative procedure, written as an explicit state machine.
///
/// `step` is called once per resume with the persisted step index available
/// through [`TaskContext::step`]. Locals that must survive a suspension live
/// in the implementing type.
pub trait Script<S> {
    /// Name used in logs and diagnostics.
    fn name(&self) -> &str;

    /// Run until the next suspension point.
    fn step(
        &mut self,
        ctx: &mut TaskContext<'_, S>,
    ) -> anyhow::Result<Step<S>>;

    /// Teardown hook, run exactly once when the task terminates for any reason.
    fn on_terminate(
        &mut self,
        _state: &mut S,
        _reason: Termination,
    ) {
    }
}

/// Closure-backed script.
pub struct ScriptFn<F> {
    name: String,
    body: F,
}

impl<F> ScriptFn<F> {
    /// Wrap `body` under `name`.
    pub fn new(
        name: impl Into<String>,
        body: F,
    ) -> Self {
        Self {
            name: name.into(),
            body,
        }
    }
}

impl<S, F> Script<S> for ScriptFn<F>
where
    F: FnMut(&mut TaskContext<'_, S>) -> anyhow::Result<Step<S>>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn step(
        &mut self,
        ctx: &mut TaskContext<'_, S>,
    ) -> anyhow::Result<Step<S>> {
        (self.body)(ctx)
    }
}

/// How a freshly spawned task first becomes eligible.
enum Start<S> {
    Delay(u32),
    When(Predicate<S>),
}

/// Task builder for constructing tasks with various options.
///
/// Tasks start one frame after they are spawned unless configured otherwise.
pub struct TaskBuilder<S> {
    script: Box<dyn Script<S>>,
    name: Option<String>,
    start: Start<S>,
}

impl<S: 'static> TaskBuilder<S> {
    /// Create a builder for `script`.
    pub fn new(script: impl Script<S> + 'static) -> Self {
        Self {
            script: Box::new(script),
            name: None,
            start: Start::Delay(1),
        }
    }

    /// Create a builder from a closure body.
    pub fn from_fn<F>(
        name: impl Into<String>,
        body: F,
    ) -> Self
    where
        F: FnMut(&mut TaskContext<'_, S>) -> anyhow::Result<Step<S>> + 'static,
    {
        Self::new(ScriptFn::new(name, body))
    }

    /// Override the task name.
    #[inline]
    pub fn name(
        mut self,
        name: impl Into<String>,
    ) -> Self {
        self.name = Some(name.into());
        self
    }

    /// First run `frames` advances after spawning. Zero is rejected at spawn.
    #[inline]
    pub fn delay(
        mut self,
        frames: u32,
    ) -> Self {
        self.start = Start::Delay(frames);
        self
    }

    /// First run on the first advance where `predicate` holds.
    pub fn start_when<F>(
        mut self,
        predicate: F,
    ) -> Self
    where
        F: Fn(&S) -> bool + 'static,
    {
        self.start = Start::When(Box::new(predicate));
        self
    }

    /// Validate and split into the parts a task entry is made of.
    pub(crate) fn into_parts(self) -> SchedulerResult<(Box<dyn Script<S>>, String, Resume<S>)> {
        let resume = match self.start {
            Start::Delay(0) => return Err(SchedulerError::InvalidWait { frames: 0 }),
            Start::Delay(n) => Resume::Frames(n),
            Start::When(predicate) => Resume::Until(predicate),
        };
        let name = self
            .name
            .unwrap_or_else(|| self.script.name().to_string());
        Ok((self.script, name, resume))
    }
}

impl<S> std::fmt::Debug for TaskBuilder<S> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("TaskBuilder")
            .field("script", &self.script.name())
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Generator for task handles. Handles are never reused within a scheduler.
#[derive(Debug, Default)]
pub struct TaskIdGenerator {
    next_id: usize,
}

impl TaskIdGenerator {
    /// Create a new task ID generator.
    #[inline]
    pub fn new() -> Self {
        Self { next_id: 0 }
    }

    /// Generate the next task ID.
    #[inline]
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> TaskId {
        let id = self.next_id;
        self.next_id += 1;
        TaskId(id)
    }
}

/// Row of the scheduler's flat task table.
pub(crate) struct TaskEntry<S> {
    pub(crate) id: TaskId,
    pub(crate) name: String,
    pub(crate) script: Box<dyn Script<S>>,
    pub(crate) state: TaskState,
    pub(crate) step: usize,
    pub(crate) resume: Resume<S>,
    pub(crate) spawned_at: Frame,
    pub(crate) spawned_by: Option<TaskId>,
    /// Parent whose termination cancels this task.
    pub(crate) bound_parent: Option<TaskId>,
    pub(crate) bound_children: SmallVec<[TaskId; 4]>,
    pub(crate) resumes: u64,
}

impl<S> TaskEntry<S> {
    pub(crate) fn new(
        id: TaskId,
        name: String,
        script: Box<dyn Script<S>>,
        resume: Resume<S>,
        spawned_at: Frame,
        spawned_by: Option<TaskId>,
        bound_parent: Option<TaskId>,
    ) -> Self {
        Self {
            id,
            name,
            script,
            state: TaskState::Created,
            step: 0,
            resume,
            spawned_at,
            spawned_by,
            bound_parent,
            bound_children: SmallVec::new(),
            resumes: 0,
        }
    }

    pub(crate) fn info(&self) -> TaskInfo {
        let wait = if self.state.is_pending() {
            self.resume.snapshot()
        } else {
            WaitSnapshot::None
        };
        TaskInfo {
            id: self.id,
            name: self.name.clone(),
            state: self.state,
            step: self.step,
            wait,
            spawned_at: self.spawned_at,
            spawned_by: self.spawned_by,
            bound_parent: self.bound_parent,
            bound_children: self.bound_children.to_vec(),
            resumes: self.resumes,
        }
    }
}

/// Inspectable snapshot of one live task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskInfo {
    pub id: TaskId,
    pub name: String,
    pub state: TaskState,
    /// Step index the task continues at.
    pub step: usize,
    pub wait: WaitSnapshot,
    pub spawned_at: Frame,
    pub spawned_by: Option<TaskId>,
    pub bound_parent: Option<TaskId>,
    pub bound_children: Vec<TaskId>,
    /// Number of turns the task has had.
    pub resumes: u64,
}
