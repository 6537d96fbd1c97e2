// Re-export glam for convenience
pub use glam::*;

// vitrine math types
mod camera;
mod color;
pub use camera::Camera;
pub use color::{Color, ColorParseError};

/// Hermite interpolation between `edge0` and `edge1`, matching WGSL `smoothstep`.
pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Fractional part, matching WGSL `fract` (`x - floor(x)`), so it is never negative.
pub fn fract(x: f32) -> f32 {
    x - x.floor()
}
