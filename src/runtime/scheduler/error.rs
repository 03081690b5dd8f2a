//! Scheduler errors

use serde::Serialize;
use thiserror::Error;

use super::task::TaskId;
use crate::runtime::clock::Frame;

/// Scheduler result
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Scheduler errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("Invalid wait: duration must be at least one frame, got {frames}")]
    InvalidWait { frames: u32 },

    #[error("Unknown task handle: {0}")]
    UnknownTaskHandle(TaskId),

    #[error(transparent)]
    TaskFault(#[from] TaskFault),

    #[error("Task limit exceeded: at most {limit} live tasks")]
    TaskLimitExceeded { limit: usize },
}

/// An uncaught fault inside a task body.
///
/// The task that raised it is terminated; nothing else is affected.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[error("Task fault in {task} ({name}) at frame {frame}, step {step}: {message}")]
pub struct TaskFault {
    /// Faulting task.
    pub task: TaskId,
    /// Task name.
    pub name: String,
    /// Frame the fault happened on.
    pub frame: Frame,
    /// Step index the task was executing.
    pub step: usize,
    /// Rendered error or panic payload.
    pub message: String,
    /// Whether the fault was a panic rather than a returned error.
    pub panicked: bool,
}

/// Render a panic payload as text.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
