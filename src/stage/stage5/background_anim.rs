//! Stage 5 background: a lightning-lit spiral staircase seen from a camera
//! climbing the tower.
//!
//! Tasks in [`super::scripts`] drive the long-running choreography. This file
//! holds the state they share and the per-frame math that does not belong to
//! any task.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use super::Stage5Config;
use crate::runtime::clock::Frame;
use crate::stage::{Stage, StageState, StageStatus};

/// Resting camera pitch, in degrees.
pub const BASE_PITCH: f32 = 80.0;
/// Amplitude of the idle pitch wobble, in degrees.
pub const PITCH_WOBBLE: f32 = 1.5;
/// Pitch wobble angular speed, in radians per frame.
const WOBBLE_RATE: f32 = 0.03;
/// A random strike sets the flash to `STRIKE_BASE + STRIKE_BASE * r`, r in [0, 1).
pub const STRIKE_BASE: f32 = 5.0;

/// Stage 5 stage context.
pub type Stage5 = Stage<Stage5State>;

/// Perspective camera of the 3D background.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Camera3D {
    pub pos: [f32; 3],
    /// Added to `pos` once per frame.
    pub vel: [f32; 3],
    /// Pitch, yaw, roll in degrees.
    pub rot: [f32; 3],
    pub fovy: f32,
}

/// Staircase and lighting parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stairs {
    /// Current rotation speed, degrees per frame.
    pub omega: f32,
    /// Rotation speed `omega` is eased towards.
    pub omega_target: f32,
    /// Accumulated staircase rotation.
    pub rotshift: f32,
    /// Lightning flash intensity; decays every frame.
    pub light_strength: f32,
    /// Horizontal offset of the light source.
    pub light_pos: f32,
}

/// Choreography phase, advanced by the stage scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BackgroundPhase {
    Ascent,
    Storm,
    Boss,
    Outro,
    Finished,
}

/// Per-frame tuning copied from the config.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Tuning {
    omega_smoothing: f32,
    light_decay: f32,
    lightning_chance: f64,
}

/// Shared animation state of stage 5.
#[derive(Debug, Clone, Serialize)]
pub struct Stage5State {
    pub camera: Camera3D,
    pub stairs: Stairs,
    pub phase: BackgroundPhase,
    /// Whether the lightning storm script is running.
    pub storm_active: bool,
    /// Flashes triggered by the storm script.
    pub flashes: u32,
    #[serde(skip)]
    tuning: Tuning,
    #[serde(skip)]
    rng: StdRng,
}

impl Stage5State {
    pub fn new(config: &Stage5Config) -> Self {
        Self {
            camera: Camera3D {
                pos: config.camera_start,
                vel: [0.0; 3],
                rot: [BASE_PITCH, 0.0, 0.0],
                fovy: config.fovy,
            },
            stairs: Stairs {
                omega: 0.0,
                omega_target: 0.0,
                rotshift: 0.0,
                light_strength: 0.0,
                light_pos: 0.0,
            },
            phase: BackgroundPhase::Ascent,
            storm_active: false,
            flashes: 0,
            tuning: Tuning {
                omega_smoothing: config.omega_smoothing,
                light_decay: config.light_decay,
                lightning_chance: config.lightning_chance,
            },
            rng: StdRng::seed_from_u64(config.seed),
        }
    }

    /// Camera altitude.
    #[inline]
    pub fn altitude(&self) -> f32 {
        self.camera.pos[2]
    }

    /// Uniform integer in `[min, max]`, from the stage's seeded generator.
    pub fn random_frames(
        &mut self,
        min: u32,
        max: u32,
    ) -> u32 {
        if max <= min {
            return min;
        }
        self.rng.random_range(min..=max)
    }

    /// Uniform float in `[0, 1)`, from the stage's seeded generator.
    pub fn random_unit(&mut self) -> f32 {
        self.rng.random::<f32>()
    }
}

impl StageState for Stage5State {
    fn update_derived(
        &mut self,
        frame: Frame,
    ) {
        let cam = &mut self.camera;
        for (pos, vel) in cam.pos.iter_mut().zip(cam.vel) {
            *pos += vel;
        }

        let stairs = &mut self.stairs;
        stairs.omega += (stairs.omega_target - stairs.omega) * self.tuning.omega_smoothing;
        cam.rot[2] += stairs.omega;
        stairs.rotshift += stairs.omega;
        cam.rot[0] = BASE_PITCH + PITCH_WOBBLE * (WOBBLE_RATE * frame as f32).sin();

        stairs.light_strength *= self.tuning.light_decay;
        if self.phase != BackgroundPhase::Finished && self.rng.random_bool(self.tuning.lightning_chance) {
            stairs.light_strength = STRIKE_BASE + STRIKE_BASE * self.rng.random::<f32>();
        }
    }

    fn status(&self) -> StageStatus {
        match self.phase {
            BackgroundPhase::Finished => StageStatus::Finished,
            _ => StageStatus::Continue,
        }
    }
}

/// Per-frame update of stage 5's background.
pub fn stage5_update(stage: &mut Stage5) -> StageStatus {
    stage.update()
}
