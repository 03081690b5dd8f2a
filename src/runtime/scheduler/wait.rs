//! Suspension primitives.
//!
//! A task never blocks. Each step returns a [`Step`] telling the scheduler
//! which step index to run next and under which condition.

use std::fmt;
use std::num::NonZeroU32;

use serde::Serialize;

use super::error::{SchedulerError, SchedulerResult};

/// Resume predicate over the shared stage state.
///
/// Receives a shared reference, so evaluating it cannot mutate the state.
pub type Predicate<S> = Box<dyn Fn(&S) -> bool>;

/// Condition a suspended task waits on.
pub enum Wait<S> {
    /// Resume on the Nth subsequent advance.
    Frames(NonZeroU32),
    /// Resume on the first advance where the predicate holds.
    Until(Predicate<S>),
}

impl<S> Wait<S> {
    /// Wait `frames` advances. Zero is rejected.
    pub fn frames(frames: u32) -> SchedulerResult<Self> {
        NonZeroU32::new(frames)
            .map(Wait::Frames)
            .ok_or(SchedulerError::InvalidWait { frames })
    }

    /// Wait exactly one advance.
    #[inline]
    pub fn next_frame() -> Self {
        Wait::Frames(NonZeroU32::MIN)
    }

    /// Wait until `predicate` holds.
    pub fn until<F>(predicate: F) -> Self
    where
        F: Fn(&S) -> bool + 'static,
    {
        Wait::Until(Box::new(predicate))
    }
}

impl<S> fmt::Debug for Wait<S> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Wait::Frames(n) => f.debug_tuple("Frames").field(n).finish(),
            Wait::Until(_) => f.write_str("Until(<predicate>)"),
        }
    }
}

/// Outcome of running one task step.
pub enum Step<S> {
    /// Suspend, then continue at step index `next` once `wait` is satisfied.
    Suspend { next: usize, wait: Wait<S> },
    /// The procedure is finished. The task terminates permanently.
    Done,
}

impl<S> Step<S> {
    /// Suspend with an already validated wait.
    #[inline]
    pub fn suspend(
        next: usize,
        wait: Wait<S>,
    ) -> Self {
        Step::Suspend { next, wait }
    }

    /// Suspend for `frames` advances, continuing at `next`.
    ///
    /// Fails with [`SchedulerError::InvalidWait`] for zero frames.
    pub fn wait_frames(
        next: usize,
        frames: u32,
    ) -> SchedulerResult<Self> {
        Wait::frames(frames).map(|wait| Step::Suspend { next, wait })
    }

    /// Suspend for one frame, continuing at `next`.
    #[inline]
    pub fn yield_frame(next: usize) -> Self {
        Step::Suspend {
            next,
            wait: Wait::next_frame(),
        }
    }

    /// Suspend until `predicate` holds, continuing at `next`.
    pub fn wait_until<F>(
        next: usize,
        predicate: F,
    ) -> Self
    where
        F: Fn(&S) -> bool + 'static,
    {
        Step::Suspend {
            next,
            wait: Wait::until(predicate),
        }
    }

    /// Finish the task.
    #[inline]
    pub fn done() -> Self {
        Step::Done
    }

    /// Check if this step terminates the task.
    #[inline]
    pub fn is_done(&self) -> bool {
        matches!(self, Step::Done)
    }
}

impl<S> fmt::Debug for Step<S> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Step::Suspend { next, wait } => f
                .debug_struct("Suspend")
                .field("next", next)
                .field("wait", wait)
                .finish(),
            Step::Done => f.write_str("Done"),
        }
    }
}

/// Persisted resume condition of a Created or Suspended task.
pub(crate) enum Resume<S> {
    /// Advances left before the task becomes eligible.
    Frames(u32),
    Until(Predicate<S>),
}

impl<S> Resume<S> {
    /// Re-evaluate once for the current advance.
    ///
    /// Frame countdowns are consumed here, so this must run at most once per
    /// task per advance.
    pub(crate) fn poll(
        &mut self,
        state: &S,
    ) -> bool {
        match self {
            Resume::Frames(remaining) => {
                *remaining = remaining.saturating_sub(1);
                *remaining == 0
            }
            Resume::Until(predicate) => predicate(state),
        }
    }

    pub(crate) fn snapshot(&self) -> WaitSnapshot {
        match self {
            Resume::Frames(remaining) => WaitSnapshot::Frames {
                remaining: *remaining,
            },
            Resume::Until(_) => WaitSnapshot::Predicate,
        }
    }
}

impl<S> From<Wait<S>> for Resume<S> {
    fn from(wait: Wait<S>) -> Self {
        match wait {
            Wait::Frames(n) => Resume::Frames(n.get()),
            Wait::Until(predicate) => Resume::Until(predicate),
        }
    }
}

/// Inspectable view of a resume condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WaitSnapshot {
    /// Waiting on a frame countdown.
    Frames { remaining: u32 },
    /// Waiting on a predicate over the stage state.
    Predicate,
    /// Not waiting (running or terminated).
    None,
}
