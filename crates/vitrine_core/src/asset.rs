//! Asynchronous glTF loading.
//!
//! [`AssetStage::load`] parses the file on a worker thread and hands the
//! finished [`Scene`] back over a channel. The frame loop polls an
//! [`AssetSlot`] once per frame; the slot resolves exactly once, at which
//! point the hierarchy is grafted into the live scene with the configured
//! overrides applied.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, TryRecvError};
use thiserror::Error;
use vitrine_math::{Quat, Vec3};

use crate::mesh::Mesh;
use crate::params::{ParamKey, ParameterStore};
use crate::scene::{Material, NodeId, Scene, SceneNode, Transform};
use crate::settings::{SceneSettings, StageConfig};

/// Errors that can occur while loading an asset.
#[derive(Error, Debug)]
pub enum AssetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("glTF error: {0}")]
    Gltf(#[from] gltf::Error),

    #[error("asset {0} contains no triangle geometry")]
    NoGeometry(String),

    #[error("asset loader stopped before producing a result")]
    LoaderDisconnected,
}

/// Where to read an asset from.
#[derive(Debug, Clone)]
pub enum AssetSource {
    Path(PathBuf),
    /// A complete `.glb` or self-contained `.gltf` payload
    Bytes(Vec<u8>),
}

impl AssetSource {
    /// Human-readable name, used for the attached root node.
    pub fn label(&self) -> String {
        match self {
            AssetSource::Path(path) => path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "asset".to_string()),
            AssetSource::Bytes(_) => "asset".to_string(),
        }
    }
}

impl From<PathBuf> for AssetSource {
    fn from(path: PathBuf) -> Self {
        AssetSource::Path(path)
    }
}

impl From<&Path> for AssetSource {
    fn from(path: &Path) -> Self {
        AssetSource::Path(path.to_path_buf())
    }
}

/// Parse a glTF document into a standalone scene.
pub fn import(source: &AssetSource) -> Result<Scene, AssetError> {
    let label = source.label();
    let (document, buffers, _images) = match source {
        AssetSource::Path(path) => gltf::import(path)?,
        AssetSource::Bytes(bytes) => gltf::import_slice(bytes)?,
    };

    let mut scene = Scene::new(label.clone());
    let gltf_scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .ok_or_else(|| AssetError::NoGeometry(label.clone()))?;

    for node in gltf_scene.nodes() {
        import_node(&mut scene, None, &node, &buffers);
    }

    if scene.mesh_count() == 0 {
        return Err(AssetError::NoGeometry(label));
    }

    log::debug!(
        "Parsed {}: {} nodes, {} meshes, {} triangles",
        scene.name,
        scene.node_count(),
        scene.mesh_count(),
        scene.total_triangle_count()
    );
    Ok(scene)
}

fn import_node(
    scene: &mut Scene,
    parent: Option<NodeId>,
    node: &gltf::Node,
    buffers: &[gltf::buffer::Data],
) {
    let (translation, rotation, scale) = node.transform().decomposed();
    let transform = Transform {
        translation: Vec3::from(translation),
        rotation: Quat::from_array(rotation),
        scale: Vec3::from(scale),
    };
    let name = node
        .name()
        .map(str::to_string)
        .unwrap_or_else(|| format!("node{}", node.index()));

    let id = scene.add_node(parent, SceneNode::group(name.clone(), transform));

    if let Some(mesh) = node.mesh() {
        for (i, primitive) in mesh.primitives().enumerate() {
            let Some((geometry, material)) = import_primitive(&primitive, buffers) else {
                continue;
            };
            let prim_name = format!("{}.{}", mesh.name().unwrap_or(&name), i);
            scene.add_node(
                Some(id),
                SceneNode::with_mesh(prim_name, Arc::new(geometry), material),
            );
        }
    }

    for child in node.children() {
        import_node(scene, Some(id), &child, buffers);
    }
}

fn import_primitive(
    primitive: &gltf::Primitive,
    buffers: &[gltf::buffer::Data],
) -> Option<(Mesh, Material)> {
    if primitive.mode() != gltf::mesh::Mode::Triangles {
        log::warn!("Skipping primitive with mode {:?}", primitive.mode());
        return None;
    }

    let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| data.0.as_slice()));

    let positions: Vec<Vec3> = reader.read_positions()?.map(Vec3::from).collect();
    let normals: Option<Vec<Vec3>> = reader
        .read_normals()
        .map(|normals| normals.map(Vec3::from).collect());
    let indices: Vec<u32> = match reader.read_indices() {
        Some(indices) => indices.into_u32().collect(),
        None => (0..positions.len() as u32).collect(),
    };

    let mut mesh = Mesh::new(positions, indices, normals);
    mesh.ensure_normals();

    let source = primitive.material();
    let pbr = source.pbr_metallic_roughness();
    let [r, g, b, _] = pbr.base_color_factor();
    let material = Material {
        name: source.name().unwrap_or("default").to_string(),
        base_color: Vec3::new(r, g, b),
        metalness: pbr.metallic_factor(),
        roughness: pbr.roughness_factor(),
        emissive: Vec3::from(source.emissive_factor()),
    };

    Some((mesh, material))
}

/// Starts background loads.
pub struct AssetStage;

impl AssetStage {
    /// Begin loading `source` off the calling thread.
    ///
    /// Never blocks. The result arrives through the returned [`PendingAsset`].
    pub fn load(source: impl Into<AssetSource>) -> PendingAsset {
        let source = source.into();
        let label = source.label();
        let (tx, rx) = bounded(1);
        let fallback = tx.clone();

        log::info!("Loading asset {}", label);
        let spawned = thread::Builder::new()
            .name("vitrine-asset-loader".into())
            .spawn(move || {
                let _ = tx.send(import(&source));
            });

        if let Err(err) = spawned {
            let _ = fallback.send(Err(AssetError::Io(err)));
        }

        PendingAsset { label, rx }
    }
}

/// A load that has been started but not yet collected.
pub struct PendingAsset {
    label: String,
    rx: Receiver<Result<Scene, AssetError>>,
}

impl PendingAsset {
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Non-blocking check for completion.
    pub fn poll(&self) -> Option<Result<Scene, AssetError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(AssetError::LoaderDisconnected)),
        }
    }

    /// Block for up to `timeout`. `None` means the load is still running.
    pub fn wait(&self, timeout: Duration) -> Option<Result<Scene, AssetError>> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(AssetError::LoaderDisconnected)),
        }
    }
}

/// Fixed pose and material overrides applied to a loaded asset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssetOverrides {
    pub scale: Vec3,
    /// Rotation about +Y, radians
    pub yaw: f32,
    pub metalness: f32,
    pub roughness: f32,
}

impl AssetOverrides {
    /// Overrides from the values `store` holds, falling back to the
    /// default look for any key it lacks.
    pub fn from_store(store: &ParameterStore, stage: &StageConfig) -> Self {
        let defaults = SceneSettings::default();
        let scalar = |key, fallback| store.scalar(key).unwrap_or(fallback);
        Self {
            scale: Vec3::splat(scalar(ParamKey::Scale, defaults.scale)),
            yaw: stage.asset_yaw,
            metalness: scalar(ParamKey::Metalness, defaults.metalness),
            roughness: scalar(ParamKey::Roughness, defaults.roughness),
        }
    }

    /// Set the root's scale and yaw, and the material of every mesh below it.
    pub fn apply(&self, scene: &mut Scene, root: NodeId) {
        if let Some(node) = scene.node_mut(root) {
            node.transform.scale = self.scale;
            node.transform.rotation = Quat::from_rotation_y(self.yaw);
        }
        self.apply_materials(scene, root);
    }

    /// Material-only part of [`apply`](Self::apply).
    pub fn apply_materials(&self, scene: &mut Scene, root: NodeId) {
        for id in scene.mesh_nodes_under(root) {
            let Some(material) = scene.node_mut(id).and_then(|n| n.material.as_mut()) else {
                continue;
            };
            material.metalness = self.metalness;
            material.roughness = self.roughness;
        }
    }
}

/// The attached asset, as seen by the frame loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssetHandle {
    pub root: NodeId,
}

impl AssetHandle {
    /// Set the vertical offset of the asset root.
    pub fn set_vertical_offset(&self, scene: &mut Scene, offset: f32) {
        if let Some(node) = scene.node_mut(self.root) {
            node.transform.translation.y = offset;
        }
    }
}

/// Outcome reported by [`AssetSlot::poll`] on the frame it happens.
#[derive(Debug)]
pub enum AssetEvent {
    Resolved(AssetHandle),
    Failed(AssetError),
}

/// Single-assignment holder for the stage's one asset.
pub enum AssetSlot {
    Loading(PendingAsset),
    Resolved(AssetHandle),
    Failed(String),
}

impl AssetSlot {
    pub fn load(source: impl Into<AssetSource>) -> Self {
        AssetSlot::Loading(AssetStage::load(source))
    }

    /// Collect a finished load.
    ///
    /// On success the hierarchy is attached to `scene` with `overrides`
    /// applied. On failure `scene` is left untouched. Returns `Some` only on
    /// the transition out of `Loading`.
    pub fn poll(&mut self, scene: &mut Scene, overrides: &AssetOverrides) -> Option<AssetEvent> {
        let AssetSlot::Loading(pending) = self else {
            return None;
        };

        match pending.poll()? {
            Ok(loaded) => {
                let name = pending.label().to_string();
                let root = scene.attach(loaded, name.clone(), Transform::default());
                overrides.apply(scene, root);
                log::info!(
                    "Loaded {}: {} meshes, {} triangles",
                    name,
                    scene.mesh_nodes_under(root).len(),
                    scene.total_triangle_count()
                );
                let handle = AssetHandle { root };
                *self = AssetSlot::Resolved(handle);
                Some(AssetEvent::Resolved(handle))
            }
            Err(err) => {
                log::error!("Failed to load {}: {}", pending.label(), err);
                *self = AssetSlot::Failed(err.to_string());
                Some(AssetEvent::Failed(err))
            }
        }
    }

    pub fn handle(&self) -> Option<AssetHandle> {
        match self {
            AssetSlot::Resolved(handle) => Some(*handle),
            _ => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, AssetSlot::Resolved(_))
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::{wait_for_loader, TRIANGLE_GLTF};
    use super::*;

    fn overrides() -> AssetOverrides {
        AssetOverrides::from_store(
            &SceneSettings::default().to_parameter_store(),
            &StageConfig::default(),
        )
    }

    fn resolve(slot: &mut AssetSlot, scene: &mut Scene) -> AssetEvent {
        wait_for_loader(slot);
        slot.poll(scene, &overrides()).expect("slot resolved")
    }

    #[test]
    fn test_overrides_follow_clamped_store() {
        let settings =
            SceneSettings::from_json(r#"{"scale": 40.0, "metalness": -3.0, "roughness": 0.25}"#)
                .unwrap();
        let store = settings.to_parameter_store();
        let overrides = AssetOverrides::from_store(&store, &StageConfig::default());

        assert_eq!(overrides.scale, Vec3::splat(2.0));
        assert_eq!(overrides.metalness, 0.0);
        assert!((overrides.roughness - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_import_triangle() {
        let scene = import(&AssetSource::Bytes(TRIANGLE_GLTF.as_bytes().to_vec())).unwrap();

        assert_eq!(scene.mesh_count(), 1);
        assert_eq!(scene.total_triangle_count(), 1);

        let mesh_node = scene
            .all_nodes()
            .into_iter()
            .find(|id| scene.node(*id).unwrap().is_mesh())
            .unwrap();
        let node = scene.node(mesh_node).unwrap();
        let material = node.material.as_ref().unwrap();
        assert_eq!(material.name, "paint");
        assert!((material.roughness - 0.7).abs() < 1e-6);

        // Smooth normals are generated for normal-less primitives
        let normals = node.mesh.as_ref().unwrap().normals.as_ref().unwrap();
        assert!((normals[0].z - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_load_resolves_off_thread() {
        let pending = AssetStage::load(AssetSource::Bytes(TRIANGLE_GLTF.as_bytes().to_vec()));
        let scene = pending.wait(Duration::from_secs(10)).unwrap().unwrap();
        assert_eq!(scene.mesh_count(), 1);
    }

    #[test]
    fn test_successful_load_applies_overrides() {
        let mut scene = Scene::new("stage");
        let mut slot = AssetSlot::load(AssetSource::Bytes(TRIANGLE_GLTF.as_bytes().to_vec()));

        let event = resolve(&mut slot, &mut scene);
        let AssetEvent::Resolved(handle) = event else {
            panic!("expected a resolved asset");
        };
        assert!(slot.is_resolved());
        assert_eq!(slot.handle(), Some(handle));

        let expected = overrides();
        let root = scene.node(handle.root).unwrap();
        assert!((root.transform.scale - expected.scale).length() < 1e-6);
        let yaw = Quat::from_rotation_y(expected.yaw);
        assert!(root.transform.rotation.dot(yaw).abs() > 0.9999);

        let meshes = scene.mesh_nodes_under(handle.root);
        assert_eq!(meshes.len(), 1);
        for id in meshes {
            let material = scene.node(id).unwrap().material.as_ref().unwrap();
            assert_eq!(material.metalness, expected.metalness);
            assert_eq!(material.roughness, expected.roughness);
        }

        // Resolves once
        assert!(slot.poll(&mut scene, &expected).is_none());
    }

    #[test]
    fn test_missing_file_leaves_scene_untouched() {
        let mut scene = Scene::new("stage");
        scene.add_node(None, SceneNode::group("lights", Transform::default()));
        let before = scene.node_count();

        let mut slot = AssetSlot::load(PathBuf::from("/definitely/not/here.glb"));
        let event = resolve(&mut slot, &mut scene);

        assert!(matches!(event, AssetEvent::Failed(AssetError::Gltf(_))));
        assert!(matches!(slot, AssetSlot::Failed(_)));
        assert!(slot.handle().is_none());
        assert_eq!(scene.node_count(), before);
    }

    #[test]
    fn test_corrupt_payload_fails() {
        let mut scene = Scene::new("stage");
        let mut slot = AssetSlot::load(AssetSource::Bytes(b"not a gltf".to_vec()));
        let event = resolve(&mut slot, &mut scene);

        assert!(matches!(event, AssetEvent::Failed(_)));
        assert_eq!(scene.node_count(), 0);
    }

    #[test]
    fn test_vertical_offset_moves_root() {
        let mut scene = Scene::new("stage");
        let root = scene.add_node(None, SceneNode::group("asset", Transform::default()));
        let handle = AssetHandle { root };

        handle.set_vertical_offset(&mut scene, 0.08);
        assert_eq!(scene.node(root).unwrap().transform.translation.y, 0.08);
    }

    #[test]
    fn test_source_label_uses_file_stem() {
        assert_eq!(AssetSource::from(PathBuf::from("models/phantom.glb")).label(), "phantom");
    }
}
