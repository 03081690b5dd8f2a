//! 配置与日志单元测试

use std::io::Write;

use tempfile::NamedTempFile;

use crate::util::config::{load_config, load_or_default, parse_config, to_ron, AppConfig, ConfigError};
use crate::util::logger::{self, LogLevel};

#[test]
fn test_parse_empty_config() {
    let config = parse_config("()").unwrap();
    assert_eq!(config, AppConfig::default());
}

#[test]
fn test_parse_partial_config() {
    let config = parse_config(
        r#"(
            log: (level: debug),
            scheduler: (max_live_tasks: 64),
            stage5: (seed: 7, boss_altitude: 300.0),
        )"#,
    )
    .unwrap();
    assert_eq!(config.log.level, LogLevel::Debug);
    assert_eq!(config.scheduler.max_live_tasks, 64);
    assert!(config.scheduler.catch_panics);
    assert_eq!(config.stage5.seed, 7);
    assert_eq!(config.stage5.boss_altitude, 300.0);
    assert_eq!(config.stage5.boss_frames, 1200);
}

#[test]
fn test_parse_syntax_error() {
    let err = parse_config("(log: ").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn test_parse_unknown_level() {
    let err = parse_config("(log: (level: loud))").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn test_invalid_values() {
    let err = parse_config("(scheduler: (max_live_tasks: 0))").unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { field: "scheduler.max_live_tasks", .. }));

    let err = parse_config("(stage5: (lightning_chance: 2.0))").unwrap_err();
    match err {
        ConfigError::Invalid { field, reason } => {
            assert_eq!(field, "lightning_chance");
            assert!(reason.contains("[0, 1]"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_load_config_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "(stage5: (storm_delay: 30))").unwrap();

    let config = load_config(file.path()).unwrap();
    assert_eq!(config.stage5.storm_delay, 30);

    let config = load_or_default(Some(file.path())).unwrap();
    assert_eq!(config.stage5.storm_delay, 30);
}

#[test]
fn test_load_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.ron");
    let err = load_config(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
    assert!(err.to_string().contains("missing.ron"));
}

#[test]
fn test_load_or_default_without_path() {
    assert_eq!(load_or_default(None).unwrap(), AppConfig::default());
}

#[test]
fn test_default_config_survives_ron() {
    let rendered = to_ron(&AppConfig::default()).unwrap();
    assert!(rendered.contains("spin_program"));
    assert_eq!(parse_config(&rendered).unwrap(), AppConfig::default());
}

#[test]
fn test_log_level_conversion() {
    assert_eq!(tracing::Level::from(LogLevel::Trace), tracing::Level::TRACE);
    assert_eq!(tracing::Level::from(LogLevel::Warn), tracing::Level::WARN);
    assert_eq!(LogLevel::default(), LogLevel::Info);
}

#[test]
fn test_logger_init_is_idempotent() {
    logger::init_debug();
    logger::init();
    tracing::debug!("logger ready");
}
