//! Procedural backdrop field.
//!
//! CPU reference of `background.wgsl`: the same constants and the same
//! arithmetic, so the shader's behaviour can be checked without a GPU.
//!
//! The field is a two-term sum:
//! - a low-frequency interference of two phase-shifted waves that mixes
//!   `color1` into `color2`;
//! - a diagonal scan-line overlay, `fract((v - u * 0.5) * 15 + time * line_speed)`
//!   pushed through `smoothstep(1 - line_width, 1, ..)`, tinted by `line_color`
//!   and scaled by `line_intensity`.

use std::fmt;

use thiserror::Error;
use vitrine_math::{fract, smoothstep, Vec3};

use crate::params::{ParamKey, ParameterStore};
use crate::settings::SceneSettings;

pub const WAVE_FREQ_U: f32 = 3.0;
pub const WAVE_RATE_U: f32 = 1.0;
pub const WAVE_FREQ_V: f32 = 2.0;
pub const WAVE_RATE_V: f32 = 0.7;
/// `v - u * LINE_SHEAR` gives the 2:1 diagonal
pub const LINE_SHEAR: f32 = 0.5;
pub const LINE_DENSITY: f32 = 15.0;

/// Errors from uniform writes.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UniformError {
    #[error("uniform {name} expects a {expected} value")]
    KindMismatch {
        name: UniformName,
        expected: &'static str,
    },
}

/// Uniforms of the backdrop program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformName {
    Time,
    Color1,
    Color2,
    LineColor,
    LineSpeed,
    LineIntensity,
    LineWidth,
}

impl UniformName {
    pub const ALL: [UniformName; 7] = [
        UniformName::Time,
        UniformName::Color1,
        UniformName::Color2,
        UniformName::LineColor,
        UniformName::LineSpeed,
        UniformName::LineIntensity,
        UniformName::LineWidth,
    ];

    fn slot(self) -> usize {
        self as usize
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UniformName::Time => "uTime",
            UniformName::Color1 => "uColor1",
            UniformName::Color2 => "uColor2",
            UniformName::LineColor => "uLineColor",
            UniformName::LineSpeed => "uLineSpeed",
            UniformName::LineIntensity => "uLineIntensity",
            UniformName::LineWidth => "uLineWidth",
        }
    }

    /// Uniform fed by a parameter key, if any.
    pub fn for_param(key: ParamKey) -> Option<UniformName> {
        match key {
            ParamKey::BgColor1 => Some(UniformName::Color1),
            ParamKey::BgColor2 => Some(UniformName::Color2),
            ParamKey::LineColor => Some(UniformName::LineColor),
            ParamKey::LineSpeed => Some(UniformName::LineSpeed),
            ParamKey::LineIntensity => Some(UniformName::LineIntensity),
            ParamKey::LineWidth => Some(UniformName::LineWidth),
            _ => None,
        }
    }
}

impl fmt::Display for UniformName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A uniform value: scalar or linear RGB triple.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Scalar(f32),
    Rgb(Vec3),
}

impl UniformValue {
    fn same_kind(&self, other: &UniformValue) -> bool {
        matches!(
            (self, other),
            (UniformValue::Scalar(_), UniformValue::Scalar(_))
                | (UniformValue::Rgb(_), UniformValue::Rgb(_))
        )
    }

    fn kind_name(&self) -> &'static str {
        match self {
            UniformValue::Scalar(_) => "scalar",
            UniformValue::Rgb(_) => "rgb",
        }
    }
}

/// Current uniform values of the backdrop.
///
/// Every uniform has a slot from construction on; only values change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShaderUniformSet {
    values: [UniformValue; 7],
}

impl ShaderUniformSet {
    /// Initial uniforms from settings, time zero.
    pub fn from_settings(settings: &SceneSettings) -> Self {
        let mut values = [UniformValue::Scalar(0.0); 7];
        values[UniformName::Color1.slot()] = UniformValue::Rgb(settings.bg_color1.to_linear());
        values[UniformName::Color2.slot()] = UniformValue::Rgb(settings.bg_color2.to_linear());
        values[UniformName::LineColor.slot()] = UniformValue::Rgb(settings.line_color.to_linear());
        values[UniformName::LineSpeed.slot()] = UniformValue::Scalar(settings.line_speed);
        values[UniformName::LineIntensity.slot()] = UniformValue::Scalar(settings.line_intensity);
        values[UniformName::LineWidth.slot()] = UniformValue::Scalar(settings.line_width);
        Self { values }
    }

    /// Initial uniforms from whatever a parameter store currently holds.
    pub fn from_store(store: &ParameterStore) -> Self {
        let mut set = Self::from_settings(&SceneSettings::default());
        for key in ParamKey::ALL {
            let (Some(name), Ok(value)) = (UniformName::for_param(key), store.value(key)) else {
                continue;
            };
            let value = match value {
                crate::params::ParamValue::Scalar(v) => UniformValue::Scalar(v),
                crate::params::ParamValue::Color(c) => UniformValue::Rgb(c.to_linear()),
            };
            // Kinds line up by construction of `for_param`
            let _ = set.set(name, value);
        }
        set
    }

    pub fn get(&self, name: UniformName) -> UniformValue {
        self.values[name.slot()]
    }

    /// Replace a value. The kind must match the slot's kind.
    pub fn set(&mut self, name: UniformName, value: UniformValue) -> Result<(), UniformError> {
        let slot = &mut self.values[name.slot()];
        if !slot.same_kind(&value) {
            return Err(UniformError::KindMismatch {
                name,
                expected: slot.kind_name(),
            });
        }
        *slot = value;
        Ok(())
    }

    pub fn set_time(&mut self, time: f32) {
        self.values[UniformName::Time.slot()] = UniformValue::Scalar(time);
    }

    pub fn scalar(&self, name: UniformName) -> f32 {
        match self.get(name) {
            UniformValue::Scalar(v) => v,
            UniformValue::Rgb(c) => c.x,
        }
    }

    pub fn rgb(&self, name: UniformName) -> Vec3 {
        match self.get(name) {
            UniformValue::Rgb(c) => c,
            UniformValue::Scalar(v) => Vec3::splat(v),
        }
    }

    pub fn time(&self) -> f32 {
        self.scalar(UniformName::Time)
    }
}

/// Whether a backdrop of `size` at `distance` fills a view of `fov_y`
/// radians and `aspect`.
pub fn backdrop_covers_view(size: f32, distance: f32, fov_y: f32, aspect: f32) -> bool {
    let half_height = distance * (fov_y * 0.5).tan();
    let half_width = half_height * aspect;
    size * 0.5 >= half_height && size * 0.5 >= half_width
}

/// Interference term remapped to `[0, 1]`.
pub fn base_intensity(u: f32, v: f32, time: f32) -> f32 {
    let wave = (u * WAVE_FREQ_U + time * WAVE_RATE_U).sin()
        * (v * WAVE_FREQ_V + time * WAVE_RATE_V).cos();
    wave * 0.5 + 0.5
}

/// Periodic scan-line coordinate in `[0, 1)`.
pub fn line_phase(u: f32, v: f32, time: f32, line_speed: f32) -> f32 {
    let line_pos = v - u * LINE_SHEAR;
    fract(line_pos * LINE_DENSITY + time * line_speed)
}

/// Soft threshold of the scan-line coordinate: 0 below `1 - width`, rising to 1 at 1.
pub fn scan_line_mask(lines: f32, line_width: f32) -> f32 {
    smoothstep(1.0 - line_width, 1.0, lines)
}

/// Color of the backdrop at surface coordinates `(u, v)`.
pub fn evaluate(u: f32, v: f32, uniforms: &ShaderUniformSet) -> Vec3 {
    let time = uniforms.time();

    let intensity = base_intensity(u, v, time);
    let base = uniforms
        .rgb(UniformName::Color1)
        .lerp(uniforms.rgb(UniformName::Color2), intensity);

    let lines = line_phase(u, v, time, uniforms.scalar(UniformName::LineSpeed));
    let mask = scan_line_mask(lines, uniforms.scalar(UniformName::LineWidth));

    base + uniforms.rgb(UniformName::LineColor) * mask * uniforms.scalar(UniformName::LineIntensity)
}
