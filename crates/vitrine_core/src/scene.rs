//! Scene graph types.
//!
//! Nodes live in a flat arena owned by [`Scene`] and are addressed by
//! [`NodeId`]. Handles stay valid for the life of the scene because nodes
//! are never removed individually.

use std::sync::Arc;

use vitrine_math::{Mat4, Quat, Vec3};

use crate::mesh::Mesh;

/// A metallic/roughness material.
#[derive(Clone, Debug, PartialEq)]
pub struct Material {
    pub name: String,

    /// Base color (linear RGB, 0-1)
    pub base_color: Vec3,

    /// Metallic factor (0=dielectric, 1=metal)
    pub metalness: f32,

    /// Roughness factor (0=smooth, 1=rough)
    pub roughness: f32,

    /// Emissive color (linear RGB)
    pub emissive: Vec3,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: String::new(),
            base_color: Vec3::new(0.8, 0.8, 0.8),
            metalness: 0.0,
            roughness: 0.5,
            emissive: Vec3::ZERO,
        }
    }
}

/// Transform components that can be composed into a matrix.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Default::default()
        }
    }

    /// Order: Scale -> Rotate -> Translate (SRT)
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

/// Index of a node in its [`Scene`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// A node in the hierarchy. Mesh-bearing nodes carry geometry and a material.
#[derive(Clone, Debug, Default)]
pub struct SceneNode {
    pub name: String,
    pub transform: Transform,
    pub mesh: Option<Arc<Mesh>>,
    pub material: Option<Material>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl SceneNode {
    /// An empty grouping node.
    pub fn group(name: impl Into<String>, transform: Transform) -> Self {
        Self {
            name: name.into(),
            transform,
            ..Default::default()
        }
    }

    /// A node that draws `mesh` with `material`.
    pub fn with_mesh(name: impl Into<String>, mesh: Arc<Mesh>, material: Material) -> Self {
        Self {
            name: name.into(),
            mesh: Some(mesh),
            material: Some(material),
            ..Default::default()
        }
    }

    pub fn is_mesh(&self) -> bool {
        self.mesh.is_some()
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

/// A node hierarchy.
#[derive(Clone, Debug, Default)]
pub struct Scene {
    pub name: String,
    nodes: Vec<SceneNode>,
    roots: Vec<NodeId>,
}

impl Scene {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add a node under `parent` (or as a root) and return its id.
    pub fn add_node(&mut self, parent: Option<NodeId>, mut node: SceneNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        node.parent = parent;
        node.children.clear();
        self.nodes.push(node);
        match parent {
            Some(p) => self.nodes[p.0].children.push(id),
            None => self.roots.push(id),
        }
        id
    }

    /// Graft every node of `other` under a new group root and return that root.
    pub fn attach(&mut self, other: Scene, name: impl Into<String>, transform: Transform) -> NodeId {
        let root = self.add_node(None, SceneNode::group(name, transform));
        let offset = self.nodes.len();

        let remap = |id: NodeId| NodeId(id.0 + offset);
        for other_root in &other.roots {
            self.nodes[root.0].children.push(remap(*other_root));
        }
        for mut node in other.nodes {
            node.parent = Some(node.parent.map(remap).unwrap_or(root));
            node.children = node.children.into_iter().map(remap).collect();
            self.nodes.push(node);
        }
        root
    }

    pub fn node(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(id.0)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut SceneNode> {
        self.nodes.get_mut(id.0)
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn mesh_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_mesh()).count()
    }

    pub fn total_triangle_count(&self) -> usize {
        self.nodes
            .iter()
            .filter_map(|n| n.mesh.as_ref())
            .map(|m| m.triangle_count())
            .sum()
    }

    /// `id` and all of its descendants, depth first.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get(current.0) else {
                continue;
            };
            out.push(current);
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }

    /// Mesh-bearing nodes in the subtree rooted at `id`.
    pub fn mesh_nodes_under(&self, id: NodeId) -> Vec<NodeId> {
        self.descendants(id)
            .into_iter()
            .filter(|n| self.nodes[n.0].is_mesh())
            .collect()
    }

    /// Every node in the scene, roots first then their subtrees.
    pub fn all_nodes(&self) -> Vec<NodeId> {
        self.roots
            .iter()
            .flat_map(|root| self.descendants(*root))
            .collect()
    }

    /// Local → world matrix, composing parent transforms.
    pub fn world_matrix(&self, id: NodeId) -> Mat4 {
        let mut matrix = Mat4::IDENTITY;
        let mut current = Some(id);
        while let Some(node_id) = current {
            let Some(node) = self.nodes.get(node_id.0) else {
                break;
            };
            matrix = node.transform.to_matrix() * matrix;
            current = node.parent;
        }
        matrix
    }
}
