//! Scene settings and stage constants.
//!
//! `SceneSettings` holds the live-tunable defaults (readable from a JSON file),
//! `StageConfig` the fixed layout of the stage: camera, orbit limits, backdrop
//! placement, asset pose and lighting.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use vitrine_math::{Color, Vec3};

use crate::params::{ParamKey, ParamValue, ParameterStore};

/// Errors that can occur while reading settings.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Tunable scene parameters with their default values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SceneSettings {
    // Model
    pub scale: f32,
    pub metalness: f32,
    pub roughness: f32,

    // Background haze
    pub bg_speed: f32,
    pub bg_color1: Color,
    pub bg_color2: Color,

    // Scan lines
    pub line_speed: f32,
    pub line_color: Color,
    pub line_intensity: f32,
    pub line_width: f32,

    // Bloom
    pub bloom_strength: f32,
    pub bloom_radius: f32,
    pub bloom_threshold: f32,
}

impl Default for SceneSettings {
    fn default() -> Self {
        Self {
            scale: 0.5,
            metalness: 0.9,
            roughness: 0.1,
            bg_speed: 0.5,
            bg_color1: Color::new(6.0 / 255.0, 9.0 / 255.0, 15.0 / 255.0),
            bg_color2: Color::new(76.0 / 255.0, 29.0 / 255.0, 149.0 / 255.0),
            line_speed: 0.8,
            line_color: Color::new(58.0 / 255.0, 59.0 / 255.0, 196.0 / 255.0),
            line_intensity: 0.4,
            line_width: 0.05,
            bloom_strength: 0.8,
            bloom_radius: 0.4,
            bloom_threshold: 0.9,
        }
    }
}

impl SceneSettings {
    /// Parse settings from JSON. Missing keys keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load settings from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let settings = Self::from_json(&text)?;
        log::info!("Loaded settings from {:?}", path.as_ref());
        Ok(settings)
    }

    /// Declared control range for a scalar key. Colors have none.
    pub fn range(key: ParamKey) -> Option<(f32, f32)> {
        match key {
            ParamKey::Scale => Some((0.1, 2.0)),
            ParamKey::Metalness | ParamKey::Roughness => Some((0.0, 1.0)),
            ParamKey::BgSpeed => Some((0.0, 2.0)),
            ParamKey::LineSpeed => Some((0.0, 3.0)),
            ParamKey::LineIntensity => Some((0.0, 2.0)),
            ParamKey::LineWidth => Some((0.01, 0.2)),
            ParamKey::BloomStrength => Some((0.0, 3.0)),
            ParamKey::BloomRadius | ParamKey::BloomThreshold => Some((0.0, 1.0)),
            ParamKey::BgColor1 | ParamKey::BgColor2 | ParamKey::LineColor => None,
        }
    }

    /// Value of a key as stored in these settings.
    pub fn value(&self, key: ParamKey) -> ParamValue {
        match key {
            ParamKey::Scale => ParamValue::Scalar(self.scale),
            ParamKey::Metalness => ParamValue::Scalar(self.metalness),
            ParamKey::Roughness => ParamValue::Scalar(self.roughness),
            ParamKey::BgSpeed => ParamValue::Scalar(self.bg_speed),
            ParamKey::BgColor1 => ParamValue::Color(self.bg_color1),
            ParamKey::BgColor2 => ParamValue::Color(self.bg_color2),
            ParamKey::LineSpeed => ParamValue::Scalar(self.line_speed),
            ParamKey::LineColor => ParamValue::Color(self.line_color),
            ParamKey::LineIntensity => ParamValue::Scalar(self.line_intensity),
            ParamKey::LineWidth => ParamValue::Scalar(self.line_width),
            ParamKey::BloomStrength => ParamValue::Scalar(self.bloom_strength),
            ParamKey::BloomRadius => ParamValue::Scalar(self.bloom_radius),
            ParamKey::BloomThreshold => ParamValue::Scalar(self.bloom_threshold),
        }
    }

    /// Build a store seeded with every key and its declared range.
    pub fn to_parameter_store(&self) -> ParameterStore {
        let mut store = ParameterStore::new();
        for key in ParamKey::ALL {
            store.register(key, self.value(key), Self::range(key));
        }
        store
    }
}

/// Fixed layout of the stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageConfig {
    pub fov_y_degrees: f32,
    pub near: f32,
    pub far: f32,
    pub camera_position: Vec3,
    pub orbit_target: Vec3,

    /// Fraction of the remaining rotation applied per update
    pub damping_factor: f32,
    pub min_distance: f32,
    pub max_distance: f32,

    /// Backdrop plane edge length
    pub backdrop_size: f32,
    /// Camera-local distance of the backdrop plane
    pub backdrop_distance: f32,

    /// Rotation about +Y applied to the loaded asset
    pub asset_yaw: f32,
    pub bob_amplitude: f32,
    pub bob_rate: f32,

    pub lighting: Lighting,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            fov_y_degrees: 75.0,
            near: 0.1,
            far: 1000.0,
            camera_position: Vec3::new(0.0, 0.0, 5.0),
            orbit_target: Vec3::ZERO,
            damping_factor: 0.05,
            min_distance: 1.5,
            max_distance: 20.0,
            backdrop_size: 200.0,
            backdrop_distance: 50.0,
            asset_yaw: -std::f32::consts::FRAC_PI_2,
            bob_amplitude: 0.08,
            bob_rate: 0.5,
            lighting: Lighting::default(),
        }
    }
}

/// Ambient term plus one directional light.
#[derive(Debug, Clone, PartialEq)]
pub struct Lighting {
    pub ambient_color: Color,
    pub ambient_intensity: f32,
    pub key_color: Color,
    pub key_intensity: f32,
    /// Position the directional light shines from (towards the origin)
    pub key_position: Vec3,
}

impl Default for Lighting {
    fn default() -> Self {
        Self {
            ambient_color: Color::WHITE,
            ambient_intensity: 0.4,
            key_color: Color::WHITE,
            key_intensity: 2.0,
            key_position: Vec3::new(5.0, 5.0, 5.0),
        }
    }
}

impl Lighting {
    /// Unit vector pointing from the surface towards the key light.
    pub fn key_direction(&self) -> Vec3 {
        self.key_position.normalize_or_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_colors_match_hex() {
        let s = SceneSettings::default();
        assert_eq!(s.bg_color1.to_hex(), "#06090f");
        assert_eq!(s.bg_color2.to_hex(), "#4c1d95");
        assert_eq!(s.line_color.to_hex(), "#3a3bc4");
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let s = SceneSettings::from_json(r##"{ "lineSpeed": 1.5, "bgColor2": "#ff0000" }"##)
            .unwrap();
        assert_eq!(s.line_speed, 1.5);
        assert_eq!(s.bg_color2.to_hex(), "#ff0000");
        assert_eq!(s.line_width, 0.05);
        assert_eq!(s.bloom_threshold, 0.9);
    }

    #[test]
    fn test_bad_color_is_rejected() {
        assert!(SceneSettings::from_json(r#"{ "lineColor": "teal" }"#).is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = SceneSettings::load("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, SettingsError::Io(_)));
    }

    #[test]
    fn test_store_has_every_key() {
        let store = SceneSettings::default().to_parameter_store();
        for key in ParamKey::ALL {
            assert!(store.get(key).is_some(), "missing {}", key);
            assert_eq!(store.range(key), SceneSettings::range(key));
        }
        assert_eq!(store.scalar(ParamKey::BloomStrength).unwrap(), 0.8);
        assert_eq!(store.color(ParamKey::LineColor).unwrap().to_hex(), "#3a3bc4");
    }

    #[test]
    fn test_settings_serialize_camel_case() {
        let json = serde_json::to_string(&SceneSettings::default()).unwrap();
        assert!(json.contains("\"bgColor1\":\"#06090f\""));
        assert!(json.contains("\"bloomThreshold\""));
    }

    #[test]
    fn test_key_light_direction() {
        let dir = Lighting::default().key_direction();
        assert!((dir.length() - 1.0).abs() < 1e-5);
        assert!(dir.x > 0.0 && dir.y > 0.0 && dir.z > 0.0);
    }
}
