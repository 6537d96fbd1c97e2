//! RGB colors as authored (`#rrggbb`, sRGB encoded) with conversion to the
//! linear working space used for shading.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when a `#rrggbb` string cannot be parsed.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("invalid color '{0}', expected #rrggbb")]
pub struct ColorParseError(pub String);

/// An sRGB-encoded color with components in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const WHITE: Color = Color { r: 1.0, g: 1.0, b: 1.0 };
    pub const BLACK: Color = Color { r: 0.0, g: 0.0, b: 0.0 };

    pub fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// Parse `#rrggbb` (the leading `#` is optional).
    pub fn from_hex(hex: &str) -> Result<Self, ColorParseError> {
        let digits = hex.trim().trim_start_matches('#');
        // from_str_radix alone would accept a sign, as in "+0"
        if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ColorParseError(hex.to_string()));
        }
        let channel = |i: usize| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map(|v| v as f32 / 255.0)
                .map_err(|_| ColorParseError(hex.to_string()))
        };
        Ok(Self::new(channel(0)?, channel(2)?, channel(4)?))
    }

    /// Format as lowercase `#rrggbb`.
    pub fn to_hex(&self) -> String {
        let byte = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        format!("#{:02x}{:02x}{:02x}", byte(self.r), byte(self.g), byte(self.b))
    }

    /// Decode to linear RGB.
    pub fn to_linear(&self) -> Vec3 {
        Vec3::new(
            srgb_to_linear(self.r),
            srgb_to_linear(self.g),
            srgb_to_linear(self.b),
        )
    }

    /// Encode a linear RGB triple.
    pub fn from_linear(linear: Vec3) -> Self {
        Self::new(
            linear_to_srgb(linear.x),
            linear_to_srgb(linear.y),
            linear_to_srgb(linear.z),
        )
    }

    pub fn to_array(&self) -> [f32; 3] {
        [self.r, self.g, self.b]
    }

    pub fn from_array(rgb: [f32; 3]) -> Self {
        Self::new(rgb[0], rgb[1], rgb[2])
    }
}

impl TryFrom<String> for Color {
    type Error = ColorParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Color::from_hex(&value)
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_hex()
    }
}

fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn linear_to_srgb(c: f32) -> f32 {
    if c <= 0.003_130_8 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex() {
        let c = Color::from_hex("#4c1d95").unwrap();
        assert!((c.r - 0x4c as f32 / 255.0).abs() < 1e-6);
        assert!((c.g - 0x1d as f32 / 255.0).abs() < 1e-6);
        assert!((c.b - 0x95 as f32 / 255.0).abs() < 1e-6);
        assert_eq!(c.to_hex(), "#4c1d95");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Color::from_hex("#12345").is_err());
        assert!(Color::from_hex("#zz0000").is_err());
        assert!(Color::from_hex("").is_err());
    }

    #[test]
    fn test_rejects_sign_characters() {
        assert!(Color::from_hex("#+0+0+0").is_err());
        assert!(Color::from_hex("-10000").is_err());
        assert_eq!(Color::from_hex("000000").unwrap(), Color::BLACK);
    }

    #[test]
    fn test_linear_conversion_endpoints() {
        assert_eq!(Color::BLACK.to_linear(), Vec3::ZERO);
        assert!((Color::WHITE.to_linear() - Vec3::ONE).length() < 1e-6);

        // Mid grey is darker in linear space
        let grey = Color::new(0.5, 0.5, 0.5).to_linear();
        assert!(grey.x > 0.2 && grey.x < 0.22);

        let back = Color::from_linear(grey);
        assert!((back.r - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_serde_as_hex_string() {
        let c: Color = serde_json::from_str("\"#06090f\"").unwrap();
        assert_eq!(c.to_hex(), "#06090f");
        assert_eq!(serde_json::to_string(&c).unwrap(), "\"#06090f\"");
        assert!(serde_json::from_str::<Color>("\"blue\"").is_err());
    }
}
