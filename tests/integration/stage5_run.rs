//! Headless stage 5 runs.

use stageflow::runtime::scheduler::SchedulerConfig;
use stageflow::stage::stage5::{
    new_stage5, stage5_update, BackgroundPhase, SpinPhase, Stage5Config,
};
use stageflow::stage::StageStatus;
use stageflow::util::config::{parse_config, AppConfig};
use stageflow::{run_stage5, verify_determinism, RunOptions};

fn short_config() -> AppConfig {
    AppConfig {
        stage5: Stage5Config {
            climb_speed: 2.0,
            boss_altitude: 100.0,
            brake_frames: 5,
            storm_delay: 10,
            storm_interval: [3, 6],
            boss_frames: 30,
            outro_frames: 10,
            spin_program: vec![SpinPhase {
                omega: 0.25,
                hold_frames: 20,
            }],
            ..Stage5Config::default()
        },
        ..AppConfig::default()
    }
}

#[test]
fn test_run_to_completion() {
    let mut phases = Vec::new();
    let summary = run_stage5(&short_config(), RunOptions::default(), |_, stage, _| {
        let phase = stage.state().phase;
        if phases.last() != Some(&phase) {
            phases.push(phase);
        }
    })
    .unwrap();

    assert_eq!(summary.status, StageStatus::Finished);
    assert_eq!(summary.faults, 0);
    assert_eq!(summary.live_tasks, 0);
    assert!(summary.frames < RunOptions::default().max_frames);
    assert!(summary.state.flashes > 0);
    assert_eq!(
        phases,
        vec![
            BackgroundPhase::Ascent,
            BackgroundPhase::Storm,
            BackgroundPhase::Boss,
            BackgroundPhase::Outro,
            BackgroundPhase::Finished,
        ]
    );
}

#[test]
fn test_run_stops_at_frame_budget() {
    let options = RunOptions {
        max_frames: 25,
        strict: true,
    };
    let mut frames = Vec::new();
    let summary = run_stage5(&short_config(), options, |frame, _, report| {
        assert_eq!(report.frame, frame);
        frames.push(frame);
    })
    .unwrap();

    assert_eq!(summary.frames, 25);
    assert_eq!(summary.status, StageStatus::Continue);
    assert_eq!(frames, (1..=25).collect::<Vec<_>>());
    assert!(summary.stats.resumes > 0);
}

#[test]
fn test_default_stage_reaches_boss_floor() {
    let mut stage = new_stage5(&Stage5Config::default(), SchedulerConfig::default()).unwrap();
    // 1500 units at half a unit per frame.
    for _ in 0..3000 {
        stage5_update(&mut stage);
    }
    assert_eq!(stage.state().phase, BackgroundPhase::Storm);
    stage5_update(&mut stage);
    assert_eq!(stage.state().phase, BackgroundPhase::Boss);
    assert!(!stage.state().storm_active);
}

#[test]
fn test_runs_are_reproducible() {
    let config = parse_config("(stage5: (seed: 42, boss_altitude: 60.0, lightning_chance: 0.3))").unwrap();
    let state = verify_determinism(&config, 400, 4).unwrap();
    assert!(state.contains("\"phase\""));

    let first = run_stage5(&config, RunOptions::default(), |_, _, _| {}).unwrap();
    let second = run_stage5(&config, RunOptions::default(), |_, _, _| {}).unwrap();
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[test]
fn test_seed_changes_the_storm() {
    let summaries: Vec<u32> = [1u64, 2, 3, 4]
        .iter()
        .map(|seed| {
            let mut config = short_config();
            config.stage5.seed = *seed;
            config.stage5.boss_altitude = 400.0;
            config.stage5.storm_interval = [1, 40];
            run_stage5(&config, RunOptions::default(), |_, _, _| {})
                .unwrap()
                .state
                .flashes
        })
        .collect();
    assert!(summaries.iter().any(|f| *f != summaries[0]), "{:?}", summaries);
}
