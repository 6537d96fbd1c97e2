//! Control panel binding table.
//!
//! Each [`Binding`] ties a parameter key to a label, a folder, a range and
//! the component field it drives. Panel edits go through
//! [`ParameterStore::set`]; a store subscription queues every change, and
//! [`ControlPanel::dispatch`] routes the queue to the bound components on the
//! frame thread.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use thiserror::Error;
use vitrine_math::Vec3;

use crate::asset::{AssetHandle, AssetOverrides};
use crate::background::{ShaderUniformSet, UniformError, UniformName, UniformValue};
use crate::params::{ParamError, ParamKey, ParamValue, ParameterStore, SubscriptionId};
use crate::post::{BloomField, PostProcessConfig};
use crate::scene::Scene;
use crate::settings::SceneSettings;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PanelError {
    #[error("no control is bound to {0}")]
    Unbound(ParamKey),

    #[error(transparent)]
    Param(#[from] ParamError),

    #[error(transparent)]
    Uniform(#[from] UniformError),
}

/// Panel section a control is shown in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Folder {
    Haze,
    Lines,
    Bloom,
    Model,
}

impl Folder {
    pub const ALL: [Folder; 4] = [Folder::Haze, Folder::Lines, Folder::Bloom, Folder::Model];

    pub fn title(&self) -> &'static str {
        match self {
            Folder::Haze => "Background (haze)",
            Folder::Lines => "Background (lines)",
            Folder::Bloom => "Bloom",
            Folder::Model => "Model",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetField {
    Scale,
    Metalness,
    Roughness,
}

/// What a binding writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingTarget {
    Uniform(UniformName),
    Bloom(BloomField),
    Asset(AssetField),
    /// Rate of the backdrop's shader clock
    ShaderSpeed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub key: ParamKey,
    pub label: &'static str,
    pub folder: Folder,
    pub range: Option<(f32, f32)>,
    pub target: BindingTarget,
}

impl Binding {
    fn new(key: ParamKey, label: &'static str, folder: Folder, target: BindingTarget) -> Self {
        Self {
            key,
            label,
            folder,
            range: SceneSettings::range(key),
            target,
        }
    }

    pub fn is_color(&self) -> bool {
        self.key.is_color()
    }
}

fn base_bindings() -> Vec<Binding> {
    use BindingTarget::*;
    vec![
        Binding::new(ParamKey::BgSpeed, "Speed", Folder::Haze, ShaderSpeed),
        Binding::new(ParamKey::BgColor1, "Color 1", Folder::Haze, Uniform(UniformName::Color1)),
        Binding::new(ParamKey::BgColor2, "Color 2", Folder::Haze, Uniform(UniformName::Color2)),
        Binding::new(ParamKey::LineSpeed, "Speed", Folder::Lines, Uniform(UniformName::LineSpeed)),
        Binding::new(ParamKey::LineColor, "Color", Folder::Lines, Uniform(UniformName::LineColor)),
        Binding::new(
            ParamKey::LineIntensity,
            "Intensity",
            Folder::Lines,
            Uniform(UniformName::LineIntensity),
        ),
        Binding::new(ParamKey::LineWidth, "Width", Folder::Lines, Uniform(UniformName::LineWidth)),
        Binding::new(ParamKey::BloomStrength, "Strength", Folder::Bloom, Bloom(BloomField::Strength)),
        Binding::new(ParamKey::BloomRadius, "Radius", Folder::Bloom, Bloom(BloomField::Radius)),
        Binding::new(
            ParamKey::BloomThreshold,
            "Threshold",
            Folder::Bloom,
            Bloom(BloomField::Threshold),
        ),
    ]
}

fn asset_bindings() -> Vec<Binding> {
    use BindingTarget::Asset;
    vec![
        Binding::new(ParamKey::Scale, "Scale", Folder::Model, Asset(AssetField::Scale)),
        Binding::new(ParamKey::Metalness, "Metalness", Folder::Model, Asset(AssetField::Metalness)),
        Binding::new(ParamKey::Roughness, "Roughness", Folder::Model, Asset(AssetField::Roughness)),
    ]
}

/// The resolved asset, as a binding target.
pub struct AssetTarget<'a> {
    pub scene: &'a mut Scene,
    pub handle: AssetHandle,
    pub overrides: &'a mut AssetOverrides,
}

/// Everything a binding can write to, borrowed for one dispatch.
pub struct BindingTargets<'a> {
    pub uniforms: &'a mut ShaderUniformSet,
    pub post: &'a mut PostProcessConfig,
    pub shader_speed: &'a mut f32,
    pub asset: Option<AssetTarget<'a>>,
}

type ChangeQueue = Rc<RefCell<VecDeque<(ParamKey, ParamValue)>>>;

/// Declarative table of live-tuning controls.
pub struct ControlPanel {
    bindings: Vec<Binding>,
    changes: ChangeQueue,
    subscription: Option<SubscriptionId>,
    pub visible: bool,
}

impl ControlPanel {
    /// Register the always-present controls and start listening to `store`.
    pub fn new(store: &mut ParameterStore) -> Self {
        let changes: ChangeQueue = Rc::default();
        let queue = Rc::clone(&changes);
        let subscription = store.subscribe(move |param| {
            queue.borrow_mut().push_back((param.key, param.value));
        });

        Self {
            bindings: base_bindings(),
            changes,
            subscription: Some(subscription),
            visible: true,
        }
    }

    /// Add the model controls. Call only once the asset has resolved.
    ///
    /// Returns the number of bindings added (zero if already present).
    pub fn register_asset_bindings(&mut self) -> usize {
        if self.has_asset_bindings() {
            return 0;
        }
        let added = asset_bindings();
        let count = added.len();
        self.bindings.extend(added);
        log::debug!("Registered {} model controls", count);
        count
    }

    pub fn has_asset_bindings(&self) -> bool {
        self.asset_binding_count() > 0
    }

    pub fn asset_binding_count(&self) -> usize {
        self.bindings
            .iter()
            .filter(|b| matches!(b.target, BindingTarget::Asset(_)))
            .count()
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn binding(&self, key: ParamKey) -> Option<&Binding> {
        self.bindings.iter().find(|b| b.key == key)
    }

    /// Bindings of one folder, in table order.
    pub fn folder(&self, folder: Folder) -> impl Iterator<Item = &Binding> {
        self.bindings.iter().filter(move |b| b.folder == folder)
    }

    /// Write a control's value into the store. The store clamps and notifies.
    pub fn set(
        &self,
        key: ParamKey,
        value: ParamValue,
        store: &mut ParameterStore,
    ) -> Result<ParamValue, PanelError> {
        if self.binding(key).is_none() {
            return Err(PanelError::Unbound(key));
        }
        Ok(store.set(key, value)?)
    }

    /// Route queued changes to their targets. Returns how many were applied.
    pub fn dispatch(&self, targets: &mut BindingTargets<'_>) -> Result<usize, PanelError> {
        let mut applied = 0;
        loop {
            // Release the queue borrow before touching any target
            let next = self.changes.borrow_mut().pop_front();
            let Some((key, value)) = next else {
                break;
            };
            let Some(binding) = self.binding(key) else {
                continue;
            };
            if route(binding.target, value, targets)? {
                applied += 1;
            }
        }
        Ok(applied)
    }

    /// `set` followed by `dispatch`.
    pub fn apply(
        &self,
        key: ParamKey,
        value: ParamValue,
        store: &mut ParameterStore,
        targets: &mut BindingTargets<'_>,
    ) -> Result<ParamValue, PanelError> {
        let stored = self.set(key, value, store)?;
        self.dispatch(targets)?;
        Ok(stored)
    }

    pub fn pending_changes(&self) -> usize {
        self.changes.borrow().len()
    }

    /// Drop every binding and the store listener. Safe to call twice.
    pub fn release(&mut self, store: &mut ParameterStore) -> bool {
        let Some(id) = self.subscription.take() else {
            return false;
        };
        store.unsubscribe(id);
        self.bindings.clear();
        self.changes.borrow_mut().clear();
        log::debug!("Control panel released");
        true
    }

    pub fn is_released(&self) -> bool {
        self.subscription.is_none()
    }
}

fn route(
    target: BindingTarget,
    value: ParamValue,
    targets: &mut BindingTargets<'_>,
) -> Result<bool, PanelError> {
    match target {
        BindingTarget::Uniform(name) => {
            let value = match value {
                ParamValue::Scalar(v) => UniformValue::Scalar(v),
                ParamValue::Color(c) => UniformValue::Rgb(c.to_linear()),
            };
            targets.uniforms.set(name, value)?;
        }
        BindingTarget::Bloom(field) => {
            if let ParamValue::Scalar(v) = value {
                targets.post.set(field, v);
            }
        }
        BindingTarget::ShaderSpeed => {
            if let ParamValue::Scalar(v) = value {
                *targets.shader_speed = v;
            }
        }
        BindingTarget::Asset(field) => {
            let (Some(asset), ParamValue::Scalar(v)) = (targets.asset.as_mut(), value) else {
                return Ok(false);
            };
            match field {
                AssetField::Scale => {
                    asset.overrides.scale = Vec3::splat(v);
                    asset.overrides.apply(asset.scene, asset.handle.root);
                }
                AssetField::Metalness => {
                    asset.overrides.metalness = v;
                    asset.overrides.apply_materials(asset.scene, asset.handle.root);
                }
                AssetField::Roughness => {
                    asset.overrides.roughness = v;
                    asset.overrides.apply_materials(asset.scene, asset.handle.root);
                }
            }
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{Material, SceneNode, Transform};
    use crate::settings::StageConfig;
    use std::sync::Arc;
    use vitrine_math::Color;

    struct Fixture {
        store: ParameterStore,
        uniforms: ShaderUniformSet,
        post: PostProcessConfig,
        speed: f32,
    }

    fn fixture() -> Fixture {
        let store = SceneSettings::default().to_parameter_store();
        Fixture {
            uniforms: ShaderUniformSet::from_store(&store),
            post: PostProcessConfig::from_store(&store),
            speed: store.scalar(ParamKey::BgSpeed).unwrap(),
            store,
        }
    }

    #[test]
    fn test_base_table_has_no_model_controls() {
        let mut f = fixture();
        let panel = ControlPanel::new(&mut f.store);

        assert_eq!(panel.bindings().len(), 10);
        assert_eq!(panel.asset_binding_count(), 0);
        assert_eq!(panel.folder(Folder::Lines).count(), 4);
        assert_eq!(panel.folder(Folder::Model).count(), 0);

        let err = panel
            .set(ParamKey::Scale, ParamValue::Scalar(1.0), &mut f.store)
            .unwrap_err();
        assert_eq!(err, PanelError::Unbound(ParamKey::Scale));
        assert_eq!(f.store.scalar(ParamKey::Scale).unwrap(), 0.5);
    }

    #[test]
    fn test_routes_to_uniforms_and_bloom() {
        let mut f = fixture();
        let panel = ControlPanel::new(&mut f.store);
        let mut targets = BindingTargets {
            uniforms: &mut f.uniforms,
            post: &mut f.post,
            shader_speed: &mut f.speed,
            asset: None,
        };

        panel
            .apply(ParamKey::LineWidth, ParamValue::Scalar(0.12), &mut f.store, &mut targets)
            .unwrap();
        panel
            .apply(ParamKey::BloomThreshold, ParamValue::Scalar(0.5), &mut f.store, &mut targets)
            .unwrap();
        panel
            .apply(ParamKey::BgSpeed, ParamValue::Scalar(1.5), &mut f.store, &mut targets)
            .unwrap();
        panel
            .apply(
                ParamKey::BgColor1,
                ParamValue::Color(Color::WHITE),
                &mut f.store,
                &mut targets,
            )
            .unwrap();

        assert_eq!(targets.uniforms.scalar(UniformName::LineWidth), 0.12);
        assert_eq!(targets.post.threshold, 0.5);
        assert_eq!(*targets.shader_speed, 1.5);
        assert!((targets.uniforms.rgb(UniformName::Color1) - Vec3::ONE).length() < 1e-6);
    }

    #[test]
    fn test_out_of_range_is_clamped_before_routing() {
        let mut f = fixture();
        let panel = ControlPanel::new(&mut f.store);
        let mut targets = BindingTargets {
            uniforms: &mut f.uniforms,
            post: &mut f.post,
            shader_speed: &mut f.speed,
            asset: None,
        };

        let stored = panel
            .apply(ParamKey::BloomStrength, ParamValue::Scalar(10.0), &mut f.store, &mut targets)
            .unwrap();
        assert_eq!(stored, ParamValue::Scalar(3.0));
        assert_eq!(targets.post.strength, 3.0);
    }

    #[test]
    fn test_model_controls_after_resolve() {
        let mut f = fixture();
        let mut panel = ControlPanel::new(&mut f.store);
        assert_eq!(panel.register_asset_bindings(), 3);
        assert_eq!(panel.register_asset_bindings(), 0);

        let mut scene = Scene::new("stage");
        let root = scene.add_node(None, SceneNode::group("asset", Transform::default()));
        let mesh = Arc::new(crate::mesh::Mesh::new(
            vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            vec![0, 1, 2],
            None,
        ));
        let part = scene.add_node(Some(root), SceneNode::with_mesh("part", mesh, Material::default()));
        let mut overrides = AssetOverrides::from_store(&f.store, &StageConfig::default());
        overrides.apply(&mut scene, root);

        let mut targets = BindingTargets {
            uniforms: &mut f.uniforms,
            post: &mut f.post,
            shader_speed: &mut f.speed,
            asset: Some(AssetTarget {
                scene: &mut scene,
                handle: AssetHandle { root },
                overrides: &mut overrides,
            }),
        };

        panel
            .apply(ParamKey::Roughness, ParamValue::Scalar(0.6), &mut f.store, &mut targets)
            .unwrap();
        panel
            .apply(ParamKey::Scale, ParamValue::Scalar(1.25), &mut f.store, &mut targets)
            .unwrap();
        drop(targets);

        let material = scene.node(part).unwrap().material.as_ref().unwrap();
        assert_eq!(material.roughness, 0.6);
        assert_eq!(scene.node(root).unwrap().transform.scale, Vec3::splat(1.25));
        assert_eq!(overrides.scale, Vec3::splat(1.25));
    }

    #[test]
    fn test_release_is_idempotent() {
        let mut f = fixture();
        let mut panel = ControlPanel::new(&mut f.store);
        assert_eq!(f.store.subscriber_count(), 1);

        assert!(panel.release(&mut f.store));
        assert!(!panel.release(&mut f.store));
        assert!(panel.is_released());
        assert_eq!(f.store.subscriber_count(), 0);
        assert!(panel.bindings().is_empty());

        // Store writes no longer reach the panel
        f.store.set(ParamKey::LineWidth, ParamValue::Scalar(0.1)).unwrap();
        assert_eq!(panel.pending_changes(), 0);
    }
}
