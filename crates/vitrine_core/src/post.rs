//! Post-process parameters and render-target bookkeeping.
//!
//! The bloom chain follows the usual "unreal" layout: a luminosity high-pass,
//! a mip chain of separable Gaussian blurs with growing kernels, and a
//! weighted additive composite. The math lives here so the GPU side only
//! has to upload numbers.

use thiserror::Error;

use crate::params::{ParamKey, ParameterStore};
use crate::rig::ViewportState;
use crate::settings::SceneSettings;

pub const BLOOM_LEVELS: usize = 5;

/// Blur kernel radius per mip level, in texels.
pub const KERNEL_RADII: [usize; BLOOM_LEVELS] = [3, 5, 7, 9, 11];

/// Per-level composite factors before the radius lerp.
pub const BLOOM_FACTORS: [f32; BLOOM_LEVELS] = [1.0, 0.8, 0.6, 0.4, 0.2];

/// Soft knee of the high-pass above the threshold.
pub const HIGH_PASS_SMOOTH_WIDTH: f32 = 0.01;

/// Longest kernel, in taps including the center.
pub const MAX_KERNEL_TAPS: usize = 12;

/// A render target guard was asked for a size it was not built for.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("render targets are {actual:?}, frame expects {expected:?}")]
pub struct StaleTargets {
    pub expected: ViewportState,
    pub actual: ViewportState,
}

/// Tunable bloom fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BloomField {
    Strength,
    Radius,
    Threshold,
}

impl BloomField {
    pub fn param(&self) -> ParamKey {
        match self {
            BloomField::Strength => ParamKey::BloomStrength,
            BloomField::Radius => ParamKey::BloomRadius,
            BloomField::Threshold => ParamKey::BloomThreshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PostProcessConfig {
    pub strength: f32,
    pub radius: f32,
    pub threshold: f32,
}

impl Default for PostProcessConfig {
    fn default() -> Self {
        Self::from_settings(&SceneSettings::default())
    }
}

impl PostProcessConfig {
    pub fn from_settings(settings: &SceneSettings) -> Self {
        Self {
            strength: settings.bloom_strength,
            radius: settings.bloom_radius,
            threshold: settings.bloom_threshold,
        }
    }

    /// Bloom values as currently held (and clamped) by `store`.
    pub fn from_store(store: &ParameterStore) -> Self {
        let mut config = Self::default();
        for field in [BloomField::Strength, BloomField::Radius, BloomField::Threshold] {
            if let Ok(value) = store.scalar(field.param()) {
                config.set(field, value);
            }
        }
        config
    }

    pub fn set(&mut self, field: BloomField, value: f32) {
        match field {
            BloomField::Strength => self.strength = value,
            BloomField::Radius => self.radius = value,
            BloomField::Threshold => self.threshold = value,
        }
    }

    pub fn get(&self, field: BloomField) -> f32 {
        match field {
            BloomField::Strength => self.strength,
            BloomField::Radius => self.radius,
            BloomField::Threshold => self.threshold,
        }
    }

    /// Final additive weight of each mip level.
    pub fn composite_weights(&self) -> [f32; BLOOM_LEVELS] {
        BLOOM_FACTORS.map(|f| self.strength * (f + (1.2 - 2.0 * f) * self.radius))
    }
}

/// One-sided Gaussian taps for `radius`, normalised so the full
/// symmetric kernel sums to one. Unused taps are zero.
pub fn gaussian_weights(radius: usize) -> [f32; MAX_KERNEL_TAPS] {
    let radius = radius.min(MAX_KERNEL_TAPS - 1);
    let sigma = radius.max(1) as f32;
    let mut weights = [0.0; MAX_KERNEL_TAPS];
    for (i, w) in weights.iter_mut().enumerate().take(radius + 1) {
        let x = i as f32;
        *w = 0.398_94 * (-0.5 * x * x / (sigma * sigma)).exp() / sigma;
    }

    let total = weights[0] + 2.0 * weights[1..].iter().sum::<f32>();
    for w in &mut weights {
        *w /= total;
    }
    weights
}

/// Size of each bloom level: half of the viewport, then halving.
pub fn bloom_mip_extents(viewport: ViewportState) -> [ViewportState; BLOOM_LEVELS] {
    let mut width = viewport.width.max(1);
    let mut height = viewport.height.max(1);
    let mut levels = [viewport; BLOOM_LEVELS];
    for level in &mut levels {
        width = (width / 2).max(1);
        height = (height / 2).max(1);
        *level = ViewportState::new(width, height);
    }
    levels
}

/// Targets that only hand themselves out for the size they were built at.
#[derive(Debug)]
pub struct SizedTargets<T> {
    extent: ViewportState,
    targets: T,
}

impl<T> SizedTargets<T> {
    pub fn new(extent: ViewportState, make: impl FnOnce(ViewportState) -> T) -> Self {
        Self {
            extent,
            targets: make(extent),
        }
    }

    /// Rebuild the targets for `extent`. No-op when the size is unchanged.
    pub fn resize(&mut self, extent: ViewportState, make: impl FnOnce(ViewportState) -> T) -> bool {
        if extent == self.extent {
            return false;
        }
        self.targets = make(extent);
        self.extent = extent;
        true
    }

    pub fn get(&self, expected: ViewportState) -> Result<&T, StaleTargets> {
        if expected != self.extent {
            return Err(StaleTargets {
                expected,
                actual: self.extent,
            });
        }
        Ok(&self.targets)
    }

    pub fn extent(&self) -> ViewportState {
        self.extent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PostProcessConfig::default();
        assert_eq!(config.strength, 0.8);
        assert_eq!(config.radius, 0.4);
        assert_eq!(config.threshold, 0.9);
    }

    #[test]
    fn test_composite_weights_follow_radius() {
        let mut config = PostProcessConfig {
            strength: 1.0,
            radius: 0.0,
            threshold: 0.9,
        };
        assert_eq!(config.composite_weights(), BLOOM_FACTORS);

        config.set(BloomField::Radius, 1.0);
        let weights = config.composite_weights();
        for (w, f) in weights.iter().zip(BLOOM_FACTORS) {
            assert!((w - (1.2 - f)).abs() < 1e-6);
        }

        config.set(BloomField::Strength, 0.0);
        assert!(config.composite_weights().iter().all(|w| *w == 0.0));
    }

    #[test]
    fn test_from_store_uses_clamped_values() {
        let settings =
            SceneSettings::from_json(r#"{"bloomStrength": 50.0, "bloomThreshold": -1.0}"#).unwrap();
        let store = settings.to_parameter_store();
        let config = PostProcessConfig::from_store(&store);

        assert_eq!(config.strength, store.scalar(ParamKey::BloomStrength).unwrap());
        assert!(config.strength <= 3.0);
        assert_eq!(config.threshold, 0.0);
        assert_eq!(config.radius, 0.4);
    }

    #[test]
    fn test_gaussian_weights_normalised() {
        for radius in KERNEL_RADII {
            let weights = gaussian_weights(radius);
            let total = weights[0] + 2.0 * weights[1..].iter().sum::<f32>();
            assert!((total - 1.0).abs() < 1e-5);
            assert!(weights[radius + 1..].iter().all(|w| *w == 0.0));
            assert!(weights[0] > weights[radius]);
        }
    }

    #[test]
    fn test_mip_extents_halve() {
        let levels = bloom_mip_extents(ViewportState::new(1280, 720));
        assert_eq!(levels[0], ViewportState::new(640, 360));
        assert_eq!(levels[4], ViewportState::new(40, 22));

        let tiny = bloom_mip_extents(ViewportState::new(3, 3));
        assert_eq!(tiny[4], ViewportState::new(1, 1));
    }

    #[test]
    fn test_sized_targets_reject_stale_size() {
        let small = ViewportState::new(640, 480);
        let large = ViewportState::new(1920, 1080);
        let mut targets = SizedTargets::new(small, |e| e.width * e.height);

        assert_eq!(*targets.get(small).unwrap(), 640 * 480);
        assert_eq!(
            targets.get(large).unwrap_err(),
            StaleTargets {
                expected: large,
                actual: small
            }
        );

        assert!(targets.resize(large, |e| e.width * e.height));
        assert_eq!(*targets.get(large).unwrap(), 1920 * 1080);
        assert!(targets.get(small).is_err());
        assert!(!targets.resize(large, |_| unreachable!()));
    }
}
