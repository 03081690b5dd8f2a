//! Where task faults go.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::error;

use crate::runtime::scheduler::TaskFault;

/// Receives faults caught at the scheduler boundary.
pub trait DiagnosticsSink {
    fn report(
        &mut self,
        stage: &str,
        fault: &TaskFault,
    );
}

impl<F> DiagnosticsSink for F
where
    F: FnMut(&str, &TaskFault),
{
    fn report(
        &mut self,
        stage: &str,
        fault: &TaskFault,
    ) {
        self(stage, fault)
    }
}

/// Logs faults through `tracing`. Default sink of every stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticsSink for TracingSink {
    fn report(
        &mut self,
        stage: &str,
        fault: &TaskFault,
    ) {
        error!(
            stage,
            task = %fault.task,
            name = %fault.name,
            frame = fault.frame,
            step = fault.step,
            panicked = fault.panicked,
            "task fault: {}",
            fault.message
        );
    }
}

/// Shared, read-only view of the faults a [`CollectingSink`] recorded.
#[derive(Debug, Clone, Default)]
pub struct FaultLog(Rc<RefCell<Vec<TaskFault>>>);

impl FaultLog {
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// Copy of every fault recorded so far, oldest first.
    pub fn faults(&self) -> Vec<TaskFault> {
        self.0.borrow().clone()
    }
}

/// Records faults in memory and logs them like [`TracingSink`].
#[derive(Debug, Clone, Default)]
pub struct CollectingSink {
    log: FaultLog,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle that stays readable after the sink moved into a stage.
    pub fn log(&self) -> FaultLog {
        self.log.clone()
    }
}

impl DiagnosticsSink for CollectingSink {
    fn report(
        &mut self,
        stage: &str,
        fault: &TaskFault,
    ) {
        TracingSink.report(stage, fault);
        self.log.0.borrow_mut().push(fault.clone());
    }
}
