//! End-to-end checks of the `stageflow` binary.

use std::io::Write;
use std::process::{Command, Output};

fn stageflow(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_stageflow"))
        .args(args)
        .output()
        .expect("Failed to spawn stageflow")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_version() {
    let output = stageflow(&["version"]);
    assert!(output.status.success());
    assert!(stdout(&output).starts_with("stageflow "));
}

#[test]
fn test_config_prints_defaults() {
    let output = stageflow(&["config"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("max_live_tasks"));
    assert!(text.contains("boss_altitude"));
}

#[test]
fn test_run_with_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "(stage5: (climb_speed: 5.0, boss_altitude: 50.0, boss_frames: 5, outro_frames: 5))"
    )
    .unwrap();
    let path = file.path().to_str().unwrap();

    let output = stageflow(&["run", "--config", path, "--frames", "100", "--every", "0"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let summary: serde_json::Value = serde_json::from_str(stdout(&output).trim()).unwrap();
    assert_eq!(summary["status"], "Finished");
    assert_eq!(summary["faults"], 0);
}

#[test]
fn test_tasks_lists_background_scripts() {
    let output = stageflow(&["tasks", "--frames", "1"]);
    assert!(output.status.success());
    let text = stdout(&output);
    for name in ["camera_climb", "stair_spin", "lightning_storm", "boss_approach"] {
        assert!(text.contains(name), "missing {} in {}", name, text);
    }
}

#[test]
fn test_invalid_config_fails() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "(stage5: (lightning_chance: 4.0))").unwrap();
    let path = file.path().to_str().unwrap();

    let output = stageflow(&["run", "--config", path]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("lightning_chance"));
}
