//! Live, render-facing state of the stage.
//!
//! Everything here is seeded from a [`ParameterStore`], so the first frame
//! shows exactly what the store holds (clamped), and is then kept in step by
//! routing the panel's queued changes through [`StageState::dispatch`].

use crate::asset::{AssetEvent, AssetOverrides, AssetSlot};
use crate::background::ShaderUniformSet;
use crate::panel::{AssetTarget, BindingTargets, ControlPanel, PanelError};
use crate::params::{ParamKey, ParameterStore};
use crate::post::PostProcessConfig;
use crate::scene::Scene;
use crate::settings::{SceneSettings, StageConfig};

pub struct StageState {
    pub uniforms: ShaderUniformSet,
    pub post: PostProcessConfig,
    /// Rate of the backdrop's shader clock
    pub shader_speed: f32,
    pub overrides: AssetOverrides,
    pub scene: Scene,
    pub asset: AssetSlot,
}

impl StageState {
    pub fn new(store: &ParameterStore, stage: &StageConfig, asset: AssetSlot) -> Self {
        let shader_speed = store
            .scalar(ParamKey::BgSpeed)
            .unwrap_or(SceneSettings::default().bg_speed);
        Self {
            uniforms: ShaderUniformSet::from_store(store),
            post: PostProcessConfig::from_store(store),
            shader_speed,
            overrides: AssetOverrides::from_store(store, stage),
            scene: Scene::new("stage"),
            asset,
        }
    }

    /// Collect a finished load.
    ///
    /// The model controls are registered with `panel` only when the asset
    /// resolves; a failed load leaves the panel as it was.
    pub fn poll_asset(&mut self, panel: &mut ControlPanel) -> Option<AssetEvent> {
        let event = self.asset.poll(&mut self.scene, &self.overrides)?;
        if let AssetEvent::Resolved(_) = event {
            panel.register_asset_bindings();
        }
        Some(event)
    }

    /// Route the panel's queued changes into this state.
    pub fn dispatch(&mut self, panel: &ControlPanel) -> Result<usize, PanelError> {
        let asset = self.asset.handle().map(|handle| AssetTarget {
            scene: &mut self.scene,
            handle,
            overrides: &mut self.overrides,
        });
        let mut targets = BindingTargets {
            uniforms: &mut self.uniforms,
            post: &mut self.post,
            shader_speed: &mut self.shader_speed,
            asset,
        };
        panel.dispatch(&mut targets)
    }

    /// Move the resolved asset to `offset_y`. False while there is none.
    pub fn set_asset_offset(&mut self, offset_y: f32) -> bool {
        match self.asset.handle() {
            Some(handle) => {
                handle.set_vertical_offset(&mut self.scene, offset_y);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::fixtures::{wait_for_loader, TRIANGLE_GLTF};
    use crate::asset::AssetSource;
    use crate::background::UniformName;
    use crate::params::ParamValue;
    use std::path::PathBuf;
    use vitrine_math::Vec3;

    fn no_asset() -> AssetSlot {
        AssetSlot::Failed("none".into())
    }

    fn collect(state: &mut StageState, panel: &mut ControlPanel) -> AssetEvent {
        wait_for_loader(&state.asset);
        state.poll_asset(panel).expect("load finished")
    }

    #[test]
    fn test_seeded_from_clamped_store() {
        let settings =
            SceneSettings::from_json(r#"{"lineWidth": 5.0, "bloomStrength": 50.0, "bgSpeed": 100.0}"#)
                .unwrap();
        let store = settings.to_parameter_store();
        let state = StageState::new(&store, &StageConfig::default(), no_asset());

        let width = store.scalar(ParamKey::LineWidth).unwrap();
        assert!((width - 0.2).abs() < 1e-6);
        assert_eq!(state.uniforms.scalar(UniformName::LineWidth), width);

        assert_eq!(state.post.strength, store.scalar(ParamKey::BloomStrength).unwrap());
        assert!((state.post.strength - 3.0).abs() < 1e-6);

        assert_eq!(state.shader_speed, store.scalar(ParamKey::BgSpeed).unwrap());
        assert!((state.shader_speed - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_failed_load_registers_no_model_controls() {
        let mut store = SceneSettings::default().to_parameter_store();
        let mut panel = ControlPanel::new(&mut store);
        let slot = AssetSlot::load(PathBuf::from("/definitely/not/here.glb"));
        let mut state = StageState::new(&store, &StageConfig::default(), slot);

        let event = collect(&mut state, &mut panel);
        assert!(matches!(event, AssetEvent::Failed(_)));
        assert_eq!(panel.asset_binding_count(), 0);
        assert_eq!(state.scene.node_count(), 0);

        assert!(state.poll_asset(&mut panel).is_none());
        assert_eq!(panel.asset_binding_count(), 0);
        assert!(!state.set_asset_offset(0.1));
    }

    #[test]
    fn test_resolved_load_registers_model_controls() {
        let mut store = SceneSettings::default().to_parameter_store();
        let mut panel = ControlPanel::new(&mut store);
        let slot = AssetSlot::load(AssetSource::Bytes(TRIANGLE_GLTF.as_bytes().to_vec()));
        let mut state = StageState::new(&store, &StageConfig::default(), slot);
        assert_eq!(panel.asset_binding_count(), 0);

        let event = collect(&mut state, &mut panel);
        let AssetEvent::Resolved(handle) = event else {
            panic!("expected a resolved asset");
        };
        assert_eq!(panel.asset_binding_count(), 3);

        panel
            .set(ParamKey::Scale, ParamValue::Scalar(1.5), &mut store)
            .unwrap();
        assert_eq!(state.dispatch(&panel).unwrap(), 1);
        let root = state.scene.node(handle.root).unwrap();
        assert!((root.transform.scale - Vec3::splat(1.5)).length() < 1e-6);

        assert!(state.set_asset_offset(0.08));
        let root = state.scene.node(handle.root).unwrap();
        assert!((root.transform.translation.y - 0.08).abs() < 1e-6);
    }

    #[test]
    fn test_edit_lands_in_the_same_dispatch() {
        let mut store = SceneSettings::default().to_parameter_store();
        let panel = ControlPanel::new(&mut store);
        let mut state = StageState::new(&store, &StageConfig::default(), no_asset());

        panel
            .set(ParamKey::LineWidth, ParamValue::Scalar(0.15), &mut store)
            .unwrap();
        panel
            .set(ParamKey::BloomRadius, ParamValue::Scalar(0.7), &mut store)
            .unwrap();
        assert_eq!(panel.pending_changes(), 2);

        assert_eq!(state.dispatch(&panel).unwrap(), 2);
        assert_eq!(panel.pending_changes(), 0);
        assert!((state.uniforms.scalar(UniformName::LineWidth) - 0.15).abs() < 1e-6);
        assert!((state.post.radius - 0.7).abs() < 1e-6);
    }
}
