//! Camera rig: perspective camera driven by damped orbit controls.

use std::f32::consts::PI;

use vitrine_math::{Camera, Vec3};

use crate::settings::StageConfig;

/// Keeps the camera off the poles.
const PHI_EPSILON: f32 = 1e-4;

/// Residual deltas below this are dropped.
const REST_EPSILON: f32 = 1e-6;

/// Drawable size in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewportState {
    pub width: u32,
    pub height: u32,
}

impl ViewportState {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn aspect(&self) -> f32 {
        self.width.max(1) as f32 / self.height.max(1) as f32
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Orbit around a target with damped rotation.
///
/// Input accumulates into a pending angular delta. Each `update` applies
/// `damping_factor` of the remainder and keeps the rest for later frames,
/// so the orbit eases toward where the pointer sent it and stops exactly
/// there.
#[derive(Debug, Clone)]
pub struct OrbitControls {
    pub target: Vec3,
    radius: f32,
    /// Azimuth around +Y, measured from +Z
    theta: f32,
    /// Polar angle from +Y
    phi: f32,

    pending_theta: f32,
    pending_phi: f32,

    pub damping_factor: f32,
    pub enable_damping: bool,
    pub enable_pan: bool,
    pub min_distance: f32,
    pub max_distance: f32,
}

impl OrbitControls {
    /// Controls that start at `position` looking at `target`.
    pub fn new(position: Vec3, target: Vec3) -> Self {
        let offset = position - target;
        let radius = offset.length().max(REST_EPSILON);
        let theta = offset.x.atan2(offset.z);
        let phi = (offset.y / radius).clamp(-1.0, 1.0).acos();

        Self {
            target,
            radius,
            theta,
            phi,
            pending_theta: 0.0,
            pending_phi: 0.0,
            damping_factor: 0.05,
            enable_damping: true,
            enable_pan: false,
            min_distance: 0.0,
            max_distance: f32::INFINITY,
        }
    }

    pub fn from_stage(stage: &StageConfig) -> Self {
        let mut controls = Self::new(stage.camera_position, stage.orbit_target);
        controls.damping_factor = stage.damping_factor;
        controls.min_distance = stage.min_distance;
        controls.max_distance = stage.max_distance;
        controls.radius = controls.radius.clamp(controls.min_distance, controls.max_distance);
        controls
    }

    /// Queue a rotation: azimuth and polar deltas in radians.
    pub fn rotate(&mut self, d_theta: f32, d_phi: f32) {
        self.pending_theta += d_theta;
        self.pending_phi += d_phi;
    }

    /// Scale the orbit radius. `scale < 1` moves closer.
    pub fn dolly(&mut self, scale: f32) {
        if scale <= 0.0 || !scale.is_finite() {
            return;
        }
        self.radius = (self.radius * scale).clamp(self.min_distance, self.max_distance);
    }

    /// Move the target in the view plane. Ignored unless panning is enabled.
    pub fn pan(&mut self, dx: f32, dy: f32) {
        if !self.enable_pan {
            return;
        }
        let forward = (self.target - self.position()).normalize_or_zero();
        let right = forward.cross(Vec3::Y).normalize_or_zero();
        let up = right.cross(forward);
        self.target += (right * -dx + up * dy) * self.radius;
    }

    /// Advance one frame. Returns whether the pose changed.
    pub fn update(&mut self) -> bool {
        let (step_theta, step_phi) = if self.enable_damping {
            (
                self.pending_theta * self.damping_factor,
                self.pending_phi * self.damping_factor,
            )
        } else {
            (self.pending_theta, self.pending_phi)
        };

        if step_theta == 0.0 && step_phi == 0.0 {
            return false;
        }

        self.theta += step_theta;
        let phi = (self.phi + step_phi).clamp(PHI_EPSILON, PI - PHI_EPSILON);
        // Polar motion blocked by the clamp is discarded, not stored up
        let blocked = phi != self.phi + step_phi;
        self.phi = phi;

        self.pending_theta -= step_theta;
        self.pending_phi = if blocked { 0.0 } else { self.pending_phi - step_phi };

        if self.pending_theta.abs() < REST_EPSILON {
            self.pending_theta = 0.0;
        }
        if self.pending_phi.abs() < REST_EPSILON {
            self.pending_phi = 0.0;
        }
        true
    }

    pub fn position(&self) -> Vec3 {
        let sin_phi = self.phi.sin();
        self.target
            + self.radius
                * Vec3::new(sin_phi * self.theta.sin(), self.phi.cos(), sin_phi * self.theta.cos())
    }

    pub fn azimuth(&self) -> f32 {
        self.theta
    }

    pub fn polar(&self) -> f32 {
        self.phi
    }

    pub fn distance(&self) -> f32 {
        self.radius
    }

    pub fn is_settled(&self) -> bool {
        self.pending_theta == 0.0 && self.pending_phi == 0.0
    }
}

/// The scene camera and the controls that move it.
#[derive(Debug, Clone)]
pub struct CameraRig {
    pub camera: Camera,
    pub controls: OrbitControls,
    viewport: ViewportState,
}

impl CameraRig {
    pub fn from_stage(stage: &StageConfig, viewport: ViewportState) -> Self {
        let controls = OrbitControls::from_stage(stage);
        let camera = Camera::new(controls.position(), controls.target, viewport.aspect())
            .with_fov_degrees(stage.fov_y_degrees)
            .with_clip(stage.near, stage.far);

        Self {
            camera,
            controls,
            viewport,
        }
    }

    /// Step the controls and copy the result into the camera.
    ///
    /// Called once per frame before anything reads the camera.
    pub fn update(&mut self) -> bool {
        let changed = self.controls.update();
        self.camera.position = self.controls.position();
        self.camera.target = self.controls.target;
        changed
    }

    pub fn set_viewport(&mut self, viewport: ViewportState) {
        self.viewport = viewport;
        self.camera.set_aspect(viewport.aspect());
    }

    pub fn viewport(&self) -> ViewportState {
        self.viewport
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rig() -> CameraRig {
        CameraRig::from_stage(&StageConfig::default(), ViewportState::new(1280, 720))
    }

    #[test]
    fn test_initial_pose() {
        let rig = rig();
        assert!((rig.camera.position - Vec3::new(0.0, 0.0, 5.0)).length() < 1e-5);
        assert!((rig.controls.distance() - 5.0).abs() < 1e-5);
        assert!((rig.camera.aspect - 1280.0 / 720.0).abs() < 1e-6);
    }

    #[test]
    fn test_damping_converges_without_overshoot() {
        let mut controls = OrbitControls::from_stage(&StageConfig::default());
        let start = controls.azimuth();
        let target = start + 1.0;
        controls.rotate(1.0, 0.0);

        let mut last = start;
        for _ in 0..2000 {
            controls.update();
            let theta = controls.azimuth();
            assert!(theta >= last, "azimuth moved backwards");
            assert!(theta <= target + 1e-6, "azimuth overshot target");
            last = theta;
        }
        assert!((last - target).abs() < 1e-4);
    }

    #[test]
    fn test_update_without_input_is_noop() {
        let mut rig = rig();
        let before = rig.camera.position;
        for _ in 0..10 {
            assert!(!rig.update());
        }
        assert_eq!(rig.camera.position, before);
        assert!(rig.controls.is_settled());
    }

    #[test]
    fn test_dolly_is_clamped() {
        let mut controls = OrbitControls::from_stage(&StageConfig::default());
        controls.dolly(0.01);
        assert!((controls.distance() - 1.5).abs() < 1e-6);
        controls.dolly(1000.0);
        assert!((controls.distance() - 20.0).abs() < 1e-6);
    }

    #[test]
    fn test_pan_disabled() {
        let mut controls = OrbitControls::from_stage(&StageConfig::default());
        controls.pan(0.5, 0.5);
        assert_eq!(controls.target, Vec3::ZERO);

        controls.enable_pan = true;
        controls.pan(0.5, 0.0);
        assert!(controls.target.length() > 0.0);
    }

    #[test]
    fn test_polar_angle_clamped() {
        let mut controls = OrbitControls::from_stage(&StageConfig::default());
        controls.enable_damping = false;
        controls.rotate(0.0, -10.0);
        controls.update();
        assert!(controls.polar() > 0.0);
        assert!(controls.is_settled());
        assert!(controls.position().is_finite());
    }

    #[test]
    fn test_set_viewport_updates_aspect() {
        let mut rig = rig();
        rig.set_viewport(ViewportState::new(800, 800));
        assert!((rig.camera.aspect - 1.0).abs() < 1e-6);
        assert_eq!(rig.viewport(), ViewportState::new(800, 800));
    }
}
