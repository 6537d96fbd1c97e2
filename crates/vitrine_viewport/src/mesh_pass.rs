//! Lit mesh drawing for the scene's mesh nodes.

use std::collections::BTreeMap;

use wgpu::{util::DeviceExt, Device, Queue};

use vitrine_core::{Lighting, Mesh, NodeId, Scene};
use vitrine_math::{Camera, Vec3};

use crate::{DEPTH_FORMAT, SCENE_FORMAT};

/// Vertex data for rendering
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

impl Vertex {
    const ATTRIBS: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3];

    pub fn desc<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }

    /// Interleave a core mesh. Missing normals fall back to +Y.
    pub fn from_mesh(mesh: &Mesh) -> Vec<Self> {
        mesh.positions
            .iter()
            .enumerate()
            .map(|(i, pos)| {
                let normal = mesh
                    .normals
                    .as_ref()
                    .and_then(|n| n.get(i))
                    .copied()
                    .unwrap_or(Vec3::Y);
                Vertex {
                    position: pos.to_array(),
                    normal: normal.to_array(),
                }
            })
            .collect()
    }
}

/// Camera and lighting uniform data for GPU
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub(crate) struct CameraUniform {
    view_proj: [[f32; 4]; 4],
    position: [f32; 3],
    _pad0: f32,
    ambient: [f32; 3],
    _pad1: f32,
    key_direction: [f32; 3],
    _pad2: f32,
    key_radiance: [f32; 3],
    _pad3: f32,
}

impl CameraUniform {
    pub(crate) fn new(camera: &Camera, lighting: &Lighting) -> Self {
        Self {
            view_proj: camera.view_projection_matrix().to_cols_array_2d(),
            position: camera.position.to_array(),
            _pad0: 0.0,
            ambient: (lighting.ambient_color.to_linear() * lighting.ambient_intensity).to_array(),
            _pad1: 0.0,
            key_direction: lighting.key_direction().to_array(),
            _pad2: 0.0,
            key_radiance: (lighting.key_color.to_linear() * lighting.key_intensity).to_array(),
            _pad3: 0.0,
        }
    }
}

/// Per-draw transform and material.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub(crate) struct DrawUniform {
    model: [[f32; 4]; 4],
    normal_matrix: [[f32; 4]; 4],
    base_color: [f32; 3],
    metalness: f32,
    emissive: [f32; 3],
    roughness: f32,
}

impl DrawUniform {
    pub(crate) fn new(scene: &Scene, id: NodeId) -> Option<Self> {
        let node = scene.node(id)?;
        let material = node.material.clone().unwrap_or_default();
        let model = scene.world_matrix(id);
        Some(Self {
            model: model.to_cols_array_2d(),
            normal_matrix: model.inverse().transpose().to_cols_array_2d(),
            base_color: material.base_color.to_array(),
            metalness: material.metalness,
            emissive: material.emissive.to_array(),
            roughness: material.roughness,
        })
    }
}

struct GpuMesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    num_indices: u32,
    draw_buffer: wgpu::Buffer,
    draw_bind_group: wgpu::BindGroup,
}

/// Pipeline plus one uploaded mesh per scene mesh node.
pub struct MeshPass {
    pipeline: wgpu::RenderPipeline,
    camera_buffer: wgpu::Buffer,
    camera_bind_group: wgpu::BindGroup,
    draw_bind_group_layout: wgpu::BindGroupLayout,
    meshes: BTreeMap<NodeId, GpuMesh>,
}

impl MeshPass {
    pub fn new(device: &Device, camera: CameraUniform) -> Self {
        let camera_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Camera Buffer"),
            contents: bytemuck::cast_slice(&[camera]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let uniform_entry = |visibility| wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let camera_bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Camera Bind Group Layout"),
            entries: &[uniform_entry(wgpu::ShaderStages::VERTEX_FRAGMENT)],
        });

        let draw_bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Draw Bind Group Layout"),
            entries: &[uniform_entry(wgpu::ShaderStages::VERTEX_FRAGMENT)],
        });

        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Camera Bind Group"),
            layout: &camera_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_buffer.as_entire_binding(),
            }],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Mesh Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/mesh.wgsl").into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Mesh Pipeline Layout"),
            bind_group_layouts: &[&camera_bind_group_layout, &draw_bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Mesh Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &[Vertex::desc()],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: SCENE_FORMAT,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw, // glTF winding
                cull_mode: Some(wgpu::Face::Back),
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            multiview: None,
            cache: None,
        });

        Self {
            pipeline,
            camera_buffer,
            camera_bind_group,
            draw_bind_group_layout,
            meshes: BTreeMap::new(),
        }
    }

    /// Upload every mesh node of `scene` that is not on the GPU yet.
    pub fn sync(&mut self, device: &Device, scene: &Scene) -> usize {
        let mut uploaded = 0;
        for id in scene.all_nodes() {
            if self.meshes.contains_key(&id) {
                continue;
            }
            let (Some(node), Some(draw)) = (scene.node(id), DrawUniform::new(scene, id)) else {
                continue;
            };
            let Some(mesh) = node.mesh.as_ref() else {
                continue;
            };

            let vertices = Vertex::from_mesh(mesh);
            let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{} Vertex Buffer", node.name)),
                contents: bytemuck::cast_slice(&vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
            let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{} Index Buffer", node.name)),
                contents: bytemuck::cast_slice(&mesh.indices),
                usage: wgpu::BufferUsages::INDEX,
            });
            let draw_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{} Draw Buffer", node.name)),
                contents: bytemuck::cast_slice(&[draw]),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });
            let draw_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Draw Bind Group"),
                layout: &self.draw_bind_group_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: draw_buffer.as_entire_binding(),
                }],
            });

            self.meshes.insert(
                id,
                GpuMesh {
                    vertex_buffer,
                    index_buffer,
                    num_indices: mesh.indices.len() as u32,
                    draw_buffer,
                    draw_bind_group,
                },
            );
            uploaded += 1;
        }

        if uploaded > 0 {
            log::info!("Uploaded {} meshes to the GPU", uploaded);
        }
        uploaded
    }

    pub fn write_camera(&self, queue: &Queue, camera: &CameraUniform) {
        queue.write_buffer(&self.camera_buffer, 0, bytemuck::cast_slice(&[*camera]));
    }

    /// Refresh transforms and materials from the scene.
    pub fn write_draws(&self, queue: &Queue, scene: &Scene) {
        for (id, mesh) in &self.meshes {
            if let Some(draw) = DrawUniform::new(scene, *id) {
                queue.write_buffer(&mesh.draw_buffer, 0, bytemuck::cast_slice(&[draw]));
            }
        }
    }

    pub fn draw<'a>(&'a self, pass: &mut wgpu::RenderPass<'a>) {
        if self.meshes.is_empty() {
            return;
        }
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.camera_bind_group, &[]);
        for mesh in self.meshes.values() {
            pass.set_bind_group(1, &mesh.draw_bind_group, &[]);
            pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
            pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..mesh.num_indices, 0, 0..1);
        }
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    pub fn destroy(self) {
        self.camera_buffer.destroy();
        for mesh in self.meshes.into_values() {
            mesh.vertex_buffer.destroy();
            mesh.index_buffer.destroy();
            mesh.draw_buffer.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use vitrine_core::{Material, SceneNode, Transform};

    #[test]
    fn test_uniform_sizes() {
        assert_eq!(std::mem::size_of::<CameraUniform>(), 128);
        assert_eq!(std::mem::size_of::<DrawUniform>(), 160);
    }

    #[test]
    fn test_vertices_from_mesh() {
        let mut mesh = Mesh::new(vec![Vec3::ZERO, Vec3::X, Vec3::Y], vec![0, 1, 2], None);
        mesh.ensure_normals();
        let vertices = Vertex::from_mesh(&mesh);

        assert_eq!(vertices.len(), 3);
        assert_eq!(vertices[1].position, [1.0, 0.0, 0.0]);
        assert!((vertices[0].normal[2] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_draw_uniform_uses_world_transform_and_material() {
        let mut scene = Scene::new("stage");
        let root = scene.add_node(
            None,
            SceneNode::group("asset", Transform::from_translation(Vec3::new(0.0, 0.08, 0.0))),
        );
        let mesh = Arc::new(Mesh::new(vec![Vec3::ZERO, Vec3::X, Vec3::Y], vec![0, 1, 2], None));
        let material = Material {
            metalness: 0.9,
            roughness: 0.1,
            ..Default::default()
        };
        let part = scene.add_node(Some(root), SceneNode::with_mesh("part", mesh, material));

        let draw = DrawUniform::new(&scene, part).unwrap();
        assert!((draw.model[3][1] - 0.08).abs() < 1e-6);
        assert_eq!(draw.metalness, 0.9);
        assert_eq!(draw.roughness, 0.1);
    }
}
