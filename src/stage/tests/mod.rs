//! Stage 单元测试

use std::cell::RefCell;
use std::rc::Rc;

use proptest::prelude::*;

use super::*;
use crate::runtime::scheduler::{SchedulerError, Step};

#[derive(Debug, Default)]
struct Lamp {
    /// Written by tasks.
    brightness: i32,
    /// Brightness seen by the derived update, per frame.
    observed: Vec<(Frame, i32)>,
    done: bool,
}

impl StageState for Lamp {
    fn update_derived(
        &mut self,
        frame: Frame,
    ) {
        self.observed.push((frame, self.brightness));
    }

    fn status(&self) -> StageStatus {
        if self.done {
            StageStatus::Finished
        } else {
            StageStatus::Continue
        }
    }
}

fn lamp_task<F>(
    name: &str,
    body: F,
) -> TaskBuilder<Lamp>
where
    F: FnMut(&mut crate::runtime::scheduler::TaskContext<'_, Lamp>) -> anyhow::Result<Step<Lamp>> + 'static,
{
    TaskBuilder::from_fn(name, body)
}

fn brighten() -> TaskBuilder<Lamp> {
    lamp_task("brighten", |ctx| {
        ctx.state_mut().brightness += 1;
        Ok(Step::yield_frame(0))
    })
}

fn finish_at(frame: Frame) -> TaskBuilder<Lamp> {
    lamp_task("finish", move |ctx| {
        if ctx.frame() >= frame {
            ctx.state_mut().done = true;
            return Ok(Step::Done);
        }
        Ok(Step::yield_frame(0))
    })
}

#[test]
fn test_new_stage() {
    let stage = Stage::new("lamp", Lamp::default());
    assert_eq!(stage.name(), "lamp");
    assert_eq!(stage.frame(), 0);
    assert_eq!(stage.status(), StageStatus::Continue);
    assert!(stage.scheduler().is_empty());
}

#[test]
fn test_derived_update_runs_after_tasks() {
    let mut stage = Stage::new("lamp", Lamp::default());
    stage.spawn(brighten()).unwrap();

    stage.update();
    stage.update();
    assert_eq!(stage.state().observed, vec![(1, 1), (2, 2)]);
}

#[test]
fn test_derived_update_runs_without_tasks() {
    let mut stage = Stage::new("lamp", Lamp::default());
    stage.update();
    assert_eq!(stage.state().observed, vec![(1, 0)]);
}

#[test]
fn test_finished_status() {
    let mut stage = Stage::new("lamp", Lamp::default());
    stage.spawn(finish_at(3)).unwrap();

    assert_eq!(stage.update(), StageStatus::Continue);
    assert_eq!(stage.update(), StageStatus::Continue);
    assert_eq!(stage.update(), StageStatus::Finished);
    assert!(stage.status().is_finished());
}

#[test]
fn test_run_for_stops_when_finished() {
    let mut stage = Stage::new("lamp", Lamp::default());
    stage.spawn(finish_at(5)).unwrap();

    assert_eq!(stage.run_for(100), StageStatus::Finished);
    assert_eq!(stage.frame(), 5);
}

#[test]
fn test_run_for_respects_budget() {
    let mut stage = Stage::new("lamp", Lamp::default());
    stage.spawn(brighten()).unwrap();

    assert_eq!(stage.run_for(7), StageStatus::Continue);
    assert_eq!(stage.frame(), 7);
    assert_eq!(stage.state().brightness, 7);
}

#[test]
fn test_faults_reach_sink() {
    let sink = CollectingSink::new();
    let log = sink.log();
    let mut stage = Stage::new("lamp", Lamp::default()).with_diagnostics(sink);
    stage.spawn(brighten()).unwrap();
    stage
        .spawn(lamp_task("broken", |_| anyhow::bail!("bulb missing")))
        .unwrap();

    assert_eq!(stage.update(), StageStatus::Continue);
    assert_eq!(log.len(), 1);
    let fault = &log.faults()[0];
    assert_eq!(fault.name, "broken");
    assert_eq!(fault.frame, 1);
    assert_eq!(fault.message, "bulb missing");

    // The sibling keeps running.
    stage.update();
    assert_eq!(stage.state().brightness, 2);
    assert_eq!(log.len(), 1);
}

#[test]
fn test_closure_sink() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = {
        let seen = Rc::clone(&seen);
        move |stage: &str, fault: &crate::runtime::scheduler::TaskFault| {
            seen.borrow_mut().push(format!("{}/{}", stage, fault.name));
        }
    };
    let mut stage = Stage::new("lamp", Lamp::default()).with_diagnostics(sink);
    stage
        .spawn(lamp_task("broken", |_| anyhow::bail!("bulb missing")))
        .unwrap();
    stage.update();

    assert_eq!(*seen.borrow(), vec!["lamp/broken".to_string()]);
}

#[test]
fn test_update_checked_surfaces_fault() {
    let mut stage = Stage::new("lamp", Lamp::default()).with_diagnostics(CollectingSink::new());
    stage.spawn(brighten()).unwrap();
    stage
        .spawn(lamp_task("broken", |_| anyhow::bail!("bulb missing")))
        .unwrap();

    let err = stage.update_checked().unwrap_err();
    assert!(matches!(err, SchedulerError::TaskFault(ref f) if f.name == "broken"));
    // The frame was still processed.
    assert_eq!(stage.frame(), 1);
    assert_eq!(stage.state().observed, vec![(1, 1)]);

    assert_eq!(stage.update_checked(), Ok(StageStatus::Continue));
}

#[test]
fn test_cancel_through_stage() {
    let mut stage = Stage::new("lamp", Lamp::default());
    let id = stage.spawn(brighten()).unwrap();
    stage.update();

    assert_eq!(stage.cancel(id), 1);
    assert_eq!(stage.cancel(id), 0);
    stage.update();
    assert_eq!(stage.state().brightness, 1);
}

#[test]
fn test_reset_rewinds_clock_and_tasks() {
    let mut stage = Stage::new("lamp", Lamp::default());
    stage.spawn(brighten()).unwrap();
    stage.spawn(finish_at(2)).unwrap();
    stage.run_for(10);
    assert!(stage.status().is_finished());

    stage.reset(Lamp::default());
    assert_eq!(stage.frame(), 0);
    assert_eq!(stage.status(), StageStatus::Continue);
    assert!(stage.scheduler().is_empty());
    assert_eq!(stage.scheduler().frame(), 0);

    stage.spawn(brighten()).unwrap();
    stage.update();
    assert_eq!(stage.state().observed, vec![(1, 1)]);
}

#[test]
fn test_teardown_cancels_everything() {
    let mut stage = Stage::new("lamp", Lamp::default());
    let parent = stage.spawn(brighten()).unwrap();
    stage.spawn_child(parent, brighten()).unwrap();
    stage.spawn(brighten()).unwrap();

    assert_eq!(stage.teardown(), 3);
    assert!(stage.scheduler().is_empty());
}

#[test]
fn test_debug_output() {
    let stage = Stage::new("lamp", Lamp::default());
    let debug = format!("{:?}", stage);
    assert!(debug.contains("lamp"));
    assert!(debug.contains("TaskScheduler"));
}

proptest! {
    /// The frame counter equals the number of updates.
    #[test]
    fn test_frame_counter_equals_updates(k in 0..200u64) {
        let mut stage = Stage::new("lamp", Lamp::default());
        for _ in 0..k {
            stage.update();
        }
        prop_assert_eq!(stage.frame(), k);
        prop_assert_eq!(stage.clock().current(), k);
        prop_assert_eq!(stage.state().observed.len() as u64, k);
    }
}
