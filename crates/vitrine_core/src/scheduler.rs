//! Frame scheduler.
//!
//! One `tick` per display refresh. Within a tick the order is fixed:
//! completions are collected, the camera is advanced, uniforms are written,
//! the asset is animated, and only then is the frame rendered. Once torn
//! down the scheduler stays stopped and every later tick is a no-op.

use std::fmt;

use crate::clock::Clock;
use crate::settings::StageConfig;

/// The per-frame surface the scheduler drives.
pub trait FrameStage {
    type Error: fmt::Display;

    /// Collect finished background work and queued control changes.
    fn dispatch_completions(&mut self);

    fn update_camera(&mut self);

    /// Rate of the backdrop shader clock relative to wall time.
    fn time_scale(&self) -> f32;

    fn write_time(&mut self, shader_time: f32);

    /// Set the asset's idle offset. Returns `false` while no asset is attached.
    fn animate_asset(&mut self, offset_y: f32) -> bool;

    fn render(&mut self) -> Result<(), Self::Error>;

    /// Free GPU-side resources and listeners.
    fn release(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Running,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Rendered,
    /// Render failed; the error was logged and the loop keeps going
    Failed,
    Stopped,
}

/// Frames-per-second estimate refreshed twice a second.
#[derive(Debug, Clone, Default)]
pub struct FpsCounter {
    pub fps: f32,
    frame_count: u32,
    update_timer: f32,
}

impl FpsCounter {
    pub const UPDATE_INTERVAL: f32 = 0.5;

    /// Count one frame. Returns `true` when the estimate was refreshed.
    pub fn update(&mut self, delta_time: f32) -> bool {
        self.frame_count += 1;
        self.update_timer += delta_time;

        if self.update_timer >= Self::UPDATE_INTERVAL {
            self.fps = self.frame_count as f32 / self.update_timer;
            self.frame_count = 0;
            self.update_timer = 0.0;
            return true;
        }
        false
    }
}

pub struct FrameScheduler {
    clock: Clock,
    state: SchedulerState,
    last_elapsed: f32,
    shader_time: f32,
    bob_amplitude: f32,
    bob_rate: f32,

    pub fps: FpsCounter,
    frames: u64,
    failed_frames: u64,
}

impl FrameScheduler {
    pub fn new(stage: &StageConfig) -> Self {
        Self::with_clock(Clock::new(), stage)
    }

    pub fn with_clock(clock: Clock, stage: &StageConfig) -> Self {
        Self {
            clock,
            state: SchedulerState::Running,
            last_elapsed: 0.0,
            shader_time: 0.0,
            bob_amplitude: stage.bob_amplitude,
            bob_rate: stage.bob_rate,
            fps: FpsCounter::default(),
            frames: 0,
            failed_frames: 0,
        }
    }

    /// Run one frame at the clock's current time.
    pub fn tick<S: FrameStage>(&mut self, stage: &mut S) -> TickOutcome {
        let elapsed = self.clock.elapsed_time();
        self.tick_at(elapsed, stage)
    }

    /// Run one frame as if `elapsed` seconds had passed since start.
    pub fn tick_at<S: FrameStage>(&mut self, elapsed: f32, stage: &mut S) -> TickOutcome {
        if self.state == SchedulerState::Stopped {
            return TickOutcome::Stopped;
        }

        let delta = (elapsed - self.last_elapsed).max(0.0);
        self.last_elapsed = elapsed;

        stage.dispatch_completions();
        stage.update_camera();

        self.shader_time += delta * stage.time_scale();
        stage.write_time(self.shader_time);

        stage.animate_asset(self.bob_offset(elapsed));

        self.frames += 1;
        self.fps.update(delta);

        match stage.render() {
            Ok(()) => TickOutcome::Rendered,
            Err(err) => {
                self.failed_frames += 1;
                log::error!("Frame {} failed: {}", self.frames, err);
                TickOutcome::Failed
            }
        }
    }

    /// Idle bob height at `elapsed` seconds.
    pub fn bob_offset(&self, elapsed: f32) -> f32 {
        (elapsed * self.bob_rate).sin() * self.bob_amplitude
    }

    /// Stop scheduling and release the stage. Returns `false` if already stopped.
    pub fn teardown<S: FrameStage>(&mut self, stage: &mut S) -> bool {
        if self.state == SchedulerState::Stopped {
            return false;
        }
        self.state = SchedulerState::Stopped;
        stage.release();
        log::info!(
            "Frame loop stopped after {} frames ({} failed)",
            self.frames,
            self.failed_frames
        );
        true
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == SchedulerState::Running
    }

    pub fn shader_time(&self) -> f32 {
        self.shader_time
    }

    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    pub fn failed_frame_count(&self) -> u64 {
        self.failed_frames
    }
}
