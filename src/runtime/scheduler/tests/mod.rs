//! Scheduler 单元测试
//!
//! 测试任务状态、等待原语、推进顺序与取消行为


use crate::runtime::clock::Frame;
use crate::runtime::scheduler::{
    AdvanceReport, Script, SchedulerConfig, Step, TaskBuilder, TaskContext, TaskId, TaskScheduler, Termination,
};

/// Shared state the test tasks write to.
#[derive(Debug, Default)]
pub(super) struct Trace {
    /// `"<frame>:<event>"` entries in the order they happened.
    pub events: Vec<String>,
    pub value: i64,
}

impl Trace {
    pub fn events(&self) -> Vec<&str> {
        self.events.iter().map(String::as_str).collect()
    }
}

/// Record `event` tagged with the current frame.
pub(super) fn log(
    ctx: &mut TaskContext<'_, Trace>,
    event: &str,
) {
    let frame = ctx.frame();
    ctx.state_mut().events.push(format!("{}:{}", frame, event));
}

pub(super) fn task<F>(
    name: &str,
    body: F,
) -> TaskBuilder<Trace>
where
    F: FnMut(&mut TaskContext<'_, Trace>) -> anyhow::Result<Step<Trace>> + 'static,
{
    TaskBuilder::from_fn(name, body)
}

/// Task that logs its name and finishes.
pub(super) fn once(name: &'static str) -> TaskBuilder<Trace> {
    task(name, move |ctx| {
        log(ctx, name);
        Ok(Step::Done)
    })
}

/// Task that logs its name every frame forever and records its termination.
pub(super) struct Recorder {
    pub name: &'static str,
}

impl Script<Trace> for Recorder {
    fn name(&self) -> &str {
        self.name
    }

    fn step(
        &mut self,
        ctx: &mut TaskContext<'_, Trace>,
    ) -> anyhow::Result<Step<Trace>> {
        log(ctx, self.name);
        Ok(Step::yield_frame(ctx.step() + 1))
    }

    fn on_terminate(
        &mut self,
        state: &mut Trace,
        reason: Termination,
    ) {
        state.events.push(format!("{}:end:{:?}", self.name, reason));
    }
}

pub(super) fn recorder(name: &'static str) -> TaskBuilder<Trace> {
    TaskBuilder::new(Recorder { name })
}

/// Scheduler plus the state and clock a stage would own.
pub(super) struct Harness {
    pub scheduler: TaskScheduler<Trace>,
    pub state: Trace,
    pub frame: Frame,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    pub fn with_config(config: SchedulerConfig) -> Self {
        Self {
            scheduler: TaskScheduler::with_config(config),
            state: Trace::default(),
            frame: 0,
        }
    }

    pub fn spawn(
        &mut self,
        builder: TaskBuilder<Trace>,
    ) -> TaskId {
        self.scheduler.spawn(builder).unwrap()
    }

    pub fn advance(&mut self) -> AdvanceReport {
        self.frame += 1;
        self.scheduler.advance(self.frame, &mut self.state)
    }

    pub fn cancel(
        &mut self,
        id: TaskId,
    ) -> usize {
        self.scheduler.cancel(id, &mut self.state)
    }

    pub fn events(&self) -> Vec<&str> {
        self.state.events()
    }
}
