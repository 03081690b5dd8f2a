//! Per-turn view a task gets of the scheduler and the stage state.

use super::error::{SchedulerError, SchedulerResult};
use super::task::{Script, TaskBuilder, TaskId, TaskIdGenerator};
use super::wait::Resume;
use crate::runtime::clock::Frame;

/// Spawn issued by a running task. Admitted to the live set after the pass.
pub(crate) struct SpawnRequest<S> {
    pub(crate) id: TaskId,
    pub(crate) name: String,
    pub(crate) script: Box<dyn Script<S>>,
    pub(crate) resume: Resume<S>,
    pub(crate) bound: bool,
}

/// Side effects on the task table requested during one turn.
pub(crate) struct Commands<S> {
    pub(crate) spawns: Vec<SpawnRequest<S>>,
    pub(crate) cancels: Vec<TaskId>,
}

impl<S> Default for Commands<S> {
    fn default() -> Self {
        Self {
            spawns: Vec::new(),
            cancels: Vec::new(),
        }
    }
}

/// Execution context handed to [`Script::step`].
///
/// Grants mutable access to the stage state for the duration of one turn.
/// Spawns become live after the current advance; cancels take effect as soon
/// as the current turn ends.
pub struct TaskContext<'a, S> {
    id: TaskId,
    step: usize,
    frame: Frame,
    spawned_at: Frame,
    state: &'a mut S,
    commands: &'a mut Commands<S>,
    ids: &'a mut TaskIdGenerator,
    capacity: usize,
    limit: usize,
}

impl<'a, S: 'static> TaskContext<'a, S> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: TaskId,
        step: usize,
        frame: Frame,
        spawned_at: Frame,
        state: &'a mut S,
        commands: &'a mut Commands<S>,
        ids: &'a mut TaskIdGenerator,
        capacity: usize,
        limit: usize,
    ) -> Self {
        Self {
            id,
            step,
            frame,
            spawned_at,
            state,
            commands,
            ids,
            capacity,
            limit,
        }
    }

    /// Handle of the running task.
    #[inline]
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Step index this turn continues at. Zero on the first turn.
    #[inline]
    pub fn step(&self) -> usize {
        self.step
    }

    /// Current frame number.
    #[inline]
    pub fn frame(&self) -> Frame {
        self.frame
    }

    /// Frames since this task was spawned.
    #[inline]
    pub fn elapsed(&self) -> Frame {
        self.frame.saturating_sub(self.spawned_at)
    }

    /// Shared stage state.
    #[inline]
    pub fn state(&self) -> &S {
        self.state
    }

    /// Mutable stage state.
    #[inline]
    pub fn state_mut(&mut self) -> &mut S {
        self.state
    }

    /// Spawn an independent task. It first becomes eligible on a later advance.
    pub fn spawn(
        &mut self,
        builder: TaskBuilder<S>,
    ) -> SchedulerResult<TaskId> {
        self.request(builder, false)
    }

    /// Spawn a task that is cancelled when this task terminates.
    pub fn spawn_child(
        &mut self,
        builder: TaskBuilder<S>,
    ) -> SchedulerResult<TaskId> {
        self.request(builder, true)
    }

    /// Cancel `task` (and its bound children) right after this turn.
    ///
    /// Unknown or already terminated handles are ignored.
    pub fn cancel(
        &mut self,
        task: TaskId,
    ) {
        self.commands.cancels.push(task);
    }

    fn request(
        &mut self,
        builder: TaskBuilder<S>,
        bound: bool,
    ) -> SchedulerResult<TaskId> {
        if self.commands.spawns.len() >= self.capacity {
            return Err(SchedulerError::TaskLimitExceeded { limit: self.limit });
        }
        let (script, name, resume) = builder.into_parts()?;
        let id = self.ids.next();
        self.commands.spawns.push(SpawnRequest {
            id,
            name,
            script,
            resume,
            bound,
        });
        Ok(id)
    }
}
