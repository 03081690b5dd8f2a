//! Background choreography of stage 5, one script per long-running behavior.

use anyhow::Context;

use super::background_anim::{BackgroundPhase, Stage5State};
use super::{SpinPhase, Stage5Config};
use crate::runtime::scheduler::{Script, Step, TaskBuilder, TaskContext, TaskId, Termination};

type Ctx<'a> = TaskContext<'a, Stage5State>;
type StepResult = anyhow::Result<Step<Stage5State>>;

/// Starts the climb, then brakes once the camera reaches the boss floor.
#[derive(Debug, Clone)]
pub struct CameraClimb {
    speed: f32,
    boss_altitude: f32,
    brake_factor: f32,
    brake_left: u32,
}

impl CameraClimb {
    pub fn new(config: &Stage5Config) -> Self {
        Self {
            speed: config.climb_speed,
            boss_altitude: config.boss_altitude,
            brake_factor: config.brake_factor,
            brake_left: config.brake_frames,
        }
    }
}

impl Script<Stage5State> for CameraClimb {
    fn name(&self) -> &str {
        "camera_climb"
    }

    fn step(
        &mut self,
        ctx: &mut Ctx<'_>,
    ) -> StepResult {
        match ctx.step() {
            0 => {
                ctx.state_mut().camera.vel[2] = self.speed;
                let target = self.boss_altitude;
                Ok(Step::wait_until(1, move |s: &Stage5State| s.altitude() >= target))
            }
            _ => {
                let vel = &mut ctx.state_mut().camera.vel[2];
                if self.brake_left == 0 {
                    *vel = 0.0;
                    return Ok(Step::Done);
                }
                self.brake_left -= 1;
                *vel *= self.brake_factor;
                Ok(Step::yield_frame(1))
            }
        }
    }

    fn on_terminate(
        &mut self,
        state: &mut Stage5State,
        _reason: Termination,
    ) {
        state.camera.vel = [0.0; 3];
    }
}

/// Walks a list of staircase rotation speeds, holding each for a while.
///
/// The step index is the index of the phase being applied.
#[derive(Debug, Clone)]
pub struct StairSpin {
    program: Vec<SpinPhase>,
}

impl StairSpin {
    pub fn new(program: Vec<SpinPhase>) -> Self {
        Self { program }
    }
}

impl Script<Stage5State> for StairSpin {
    fn name(&self) -> &str {
        "stair_spin"
    }

    fn step(
        &mut self,
        ctx: &mut Ctx<'_>,
    ) -> StepResult {
        let index = ctx.step();
        let Some(phase) = self.program.get(index) else {
            return Ok(Step::Done);
        };
        ctx.state_mut().stairs.omega_target = phase.omega;
        let step = Step::wait_frames(index + 1, phase.hold_frames)
            .with_context(|| format!("spin phase {index} has no hold time"))?;
        Ok(step)
    }
}

/// Fires lightning flashes at random intervals until cancelled.
#[derive(Debug, Clone)]
pub struct LightningStorm {
    min_interval: u32,
    max_interval: u32,
    flash_frames: u32,
    flash_peak: f32,
}

impl LightningStorm {
    pub fn new(config: &Stage5Config) -> Self {
        Self {
            min_interval: config.storm_interval[0],
            max_interval: config.storm_interval[1],
            flash_frames: config.flash_frames,
            flash_peak: config.flash_peak,
        }
    }

    fn next_strike(
        &self,
        ctx: &mut Ctx<'_>,
    ) -> StepResult {
        let wait = ctx
            .state_mut()
            .random_frames(self.min_interval, self.max_interval);
        Ok(Step::wait_frames(1, wait)?)
    }
}

impl Script<Stage5State> for LightningStorm {
    fn name(&self) -> &str {
        "lightning_storm"
    }

    fn step(
        &mut self,
        ctx: &mut Ctx<'_>,
    ) -> StepResult {
        if ctx.step() == 0 {
            let state = ctx.state_mut();
            state.storm_active = true;
            if state.phase == BackgroundPhase::Ascent {
                state.phase = BackgroundPhase::Storm;
            }
            return self.next_strike(ctx);
        }

        ctx.spawn_child(TaskBuilder::new(FlashPulse::new(self.flash_frames, self.flash_peak)))?;
        ctx.state_mut().flashes += 1;
        self.next_strike(ctx)
    }

    fn on_terminate(
        &mut self,
        state: &mut Stage5State,
        _reason: Termination,
    ) {
        state.storm_active = false;
    }
}

/// A single flash: holds the light up, fading linearly over a few frames.
#[derive(Debug, Clone)]
pub struct FlashPulse {
    total: u32,
    left: u32,
    peak: f32,
}

impl FlashPulse {
    pub fn new(
        frames: u32,
        peak: f32,
    ) -> Self {
        Self {
            total: frames.max(1),
            left: frames.max(1),
            peak,
        }
    }
}

impl Script<Stage5State> for FlashPulse {
    fn name(&self) -> &str {
        "flash_pulse"
    }

    fn step(
        &mut self,
        ctx: &mut Ctx<'_>,
    ) -> StepResult {
        if ctx.step() == 0 {
            let offset = ctx.state_mut().random_unit() * 2.0 - 1.0;
            ctx.state_mut().stairs.light_pos = offset;
        }
        let level = self.peak * self.left as f32 / self.total as f32;
        let stairs = &mut ctx.state_mut().stairs;
        stairs.light_strength = stairs.light_strength.max(level);

        self.left -= 1;
        if self.left == 0 {
            return Ok(Step::Done);
        }
        Ok(Step::yield_frame(1))
    }
}

/// Takes over once the boss floor is reached: silences the storm, keeps a
/// bound aura running through the fight, then plays the outro.
#[derive(Debug, Clone)]
pub struct BossApproach {
    storm: TaskId,
    boss_frames: u32,
    outro_frames: u32,
    boss_omega: f32,
}

impl BossApproach {
    pub fn new(
        storm: TaskId,
        config: &Stage5Config,
    ) -> Self {
        Self {
            storm,
            boss_frames: config.boss_frames,
            outro_frames: config.outro_frames,
            boss_omega: config.boss_omega,
        }
    }
}

impl Script<Stage5State> for BossApproach {
    fn name(&self) -> &str {
        "boss_approach"
    }

    fn step(
        &mut self,
        ctx: &mut Ctx<'_>,
    ) -> StepResult {
        match ctx.step() {
            0 => {
                ctx.cancel(self.storm);
                ctx.spawn_child(TaskBuilder::new(BossAura))?;
                let state = ctx.state_mut();
                state.phase = BackgroundPhase::Boss;
                state.stairs.omega_target = self.boss_omega;
                Ok(Step::wait_frames(1, self.boss_frames)?)
            }
            1 => {
                let state = ctx.state_mut();
                state.phase = BackgroundPhase::Outro;
                state.stairs.omega_target = 0.0;
                Ok(Step::wait_frames(2, self.outro_frames)?)
            }
            _ => {
                ctx.state_mut().phase = BackgroundPhase::Finished;
                Ok(Step::Done)
            }
        }
    }
}

/// Sways the light source while the boss is on screen.
#[derive(Debug, Clone, Copy)]
pub struct BossAura;

impl Script<Stage5State> for BossAura {
    fn name(&self) -> &str {
        "boss_aura"
    }

    fn step(
        &mut self,
        ctx: &mut Ctx<'_>,
    ) -> StepResult {
        let t = ctx.elapsed() as f32;
        ctx.state_mut().stairs.light_pos = (t * 0.05).sin();
        Ok(Step::yield_frame(1))
    }

    fn on_terminate(
        &mut self,
        state: &mut Stage5State,
        _reason: Termination,
    ) {
        state.stairs.light_pos = 0.0;
    }
}
