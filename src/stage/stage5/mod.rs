//! Stage 5: the tower climb.
//!
//! # Usage
//!
//! ```rust
//! use stageflow::stage::stage5::{new_stage5, stage5_update, Stage5Config};
//! use stageflow::runtime::scheduler::SchedulerConfig;
//!
//! let mut stage = new_stage5(&Stage5Config::default(), SchedulerConfig::default()).unwrap();
//! let status = stage5_update(&mut stage);
//! assert!(!status.is_finished());
//! assert_eq!(stage.frame(), 1);
//! ```

pub mod background_anim;
pub mod scripts;

pub use background_anim::{
    stage5_update, BackgroundPhase, Camera3D, Stage5, Stage5State, Stairs, BASE_PITCH,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::runtime::scheduler::{SchedulerConfig, SchedulerError, SchedulerResult, TaskBuilder};
use crate::stage::Stage;
use scripts::{BossApproach, CameraClimb, LightningStorm, StairSpin};

/// One entry of the staircase rotation program.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpinPhase {
    /// Target rotation speed, degrees per frame.
    pub omega: f32,
    /// Frames to hold it before the next phase. Must be positive.
    pub hold_frames: u32,
}

/// A config value outside its allowed range.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid value for {field}: {reason}")]
pub struct InvalidValue {
    pub field: &'static str,
    pub reason: String,
}

impl InvalidValue {
    fn new(
        field: &'static str,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Stage 5 setup errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Stage5Error {
    #[error("Invalid stage5 config: {0}")]
    Config(#[from] InvalidValue),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

/// Stage 5 tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Stage5Config {
    /// Seed of the stage's random generator.
    pub seed: u64,
    pub camera_start: [f32; 3],
    pub fovy: f32,
    /// Climb speed, units per frame.
    pub climb_speed: f32,
    /// Altitude at which the boss section starts.
    pub boss_altitude: f32,
    /// Frames spent braking after reaching the boss floor.
    pub brake_frames: u32,
    /// Per-frame velocity factor while braking.
    pub brake_factor: f32,
    pub spin_program: Vec<SpinPhase>,
    /// Fraction of the gap to the target rotation speed closed per frame.
    pub omega_smoothing: f32,
    /// Rotation speed during the boss section.
    pub boss_omega: f32,
    /// Per-frame multiplier of the flash intensity.
    pub light_decay: f32,
    /// Chance of a random strike per frame.
    pub lightning_chance: f64,
    /// Frames before the storm starts.
    pub storm_delay: u32,
    /// Inclusive range of frames between storm flashes.
    pub storm_interval: [u32; 2],
    pub flash_frames: u32,
    pub flash_peak: f32,
    pub boss_frames: u32,
    pub outro_frames: u32,
}

impl Default for Stage5Config {
    fn default() -> Self {
        Self {
            seed: 0x5eed_0005,
            camera_start: [0.0, 0.0, 0.0],
            fovy: 45.0,
            climb_speed: 0.5,
            boss_altitude: 1500.0,
            brake_frames: 60,
            brake_factor: 0.92,
            spin_program: vec![
                SpinPhase {
                    omega: 0.0,
                    hold_frames: 600,
                },
                SpinPhase {
                    omega: 0.12,
                    hold_frames: 1200,
                },
                SpinPhase {
                    omega: -0.2,
                    hold_frames: 900,
                },
                SpinPhase {
                    omega: 0.05,
                    hold_frames: 600,
                },
            ],
            omega_smoothing: 0.05,
            boss_omega: 0.3,
            light_decay: 0.98,
            lightning_chance: 0.01,
            storm_delay: 900,
            storm_interval: [40, 160],
            flash_frames: 12,
            flash_peak: 10.0,
            boss_frames: 1200,
            outro_frames: 240,
        }
    }
}

impl Stage5Config {
    /// Check value ranges.
    pub fn validate(&self) -> Result<(), InvalidValue> {
        if !(0.0..=1.0).contains(&self.lightning_chance) {
            return Err(InvalidValue::new(
                "lightning_chance",
                format!("must be within [0, 1], got {}", self.lightning_chance),
            ));
        }
        if !(0.0..=1.0).contains(&self.omega_smoothing) {
            return Err(InvalidValue::new(
                "omega_smoothing",
                format!("must be within [0, 1], got {}", self.omega_smoothing),
            ));
        }
        if self.storm_interval[0] == 0 || self.storm_interval[0] > self.storm_interval[1] {
            return Err(InvalidValue::new(
                "storm_interval",
                format!(
                    "must be a non-empty range of positive frames, got {:?}",
                    self.storm_interval
                ),
            ));
        }
        let positive = [
            ("storm_delay", self.storm_delay),
            ("boss_frames", self.boss_frames),
            ("outro_frames", self.outro_frames),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(InvalidValue::new(field, "must be at least one frame"));
            }
        }
        if let Some(i) = self.spin_program.iter().position(|p| p.hold_frames == 0) {
            return Err(InvalidValue::new("spin_program", format!("phase {i} has a zero hold time")));
        }
        Ok(())
    }
}

/// Build stage 5 with its background scripts spawned.
///
/// Fails with [`Stage5Error::Config`] before spawning anything if `config`
/// is out of range.
pub fn new_stage5(
    config: &Stage5Config,
    scheduler: SchedulerConfig,
) -> Result<Stage5, Stage5Error> {
    config.validate()?;
    let mut stage = Stage::with_config("stage5", Stage5State::new(config), scheduler);
    spawn_background(&mut stage, config)?;
    Ok(stage)
}

/// Spawn the background choreography into `stage`.
pub fn spawn_background(
    stage: &mut Stage5,
    config: &Stage5Config,
) -> SchedulerResult<()> {
    stage.spawn(TaskBuilder::new(CameraClimb::new(config)))?;
    stage.spawn(TaskBuilder::new(StairSpin::new(config.spin_program.clone())))?;
    let storm = stage.spawn(TaskBuilder::new(LightningStorm::new(config)).delay(config.storm_delay))?;
    let boss_altitude = config.boss_altitude;
    stage.spawn(
        TaskBuilder::new(BossApproach::new(storm, config))
            .start_when(move |s: &Stage5State| s.altitude() >= boss_altitude),
    )?;
    Ok(())
}

/// Re-initialize `stage` from `config`: clock back to zero, fresh state and
/// scripts.
///
/// An invalid config leaves `stage` untouched.
pub fn restart_stage5(
    stage: &mut Stage5,
    config: &Stage5Config,
) -> Result<(), Stage5Error> {
    config.validate()?;
    stage.reset(Stage5State::new(config));
    spawn_background(stage, config)?;
    Ok(())
}
