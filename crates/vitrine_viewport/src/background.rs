//! GPU side of the procedural backdrop.

use wgpu::{util::DeviceExt, Device, Queue};

use vitrine_core::{ShaderUniformSet, StageConfig, UniformName};
use vitrine_math::Camera;

use crate::SCENE_FORMAT;

/// Backdrop uniform block, laid out to match `background.wgsl`.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub(crate) struct BackgroundUniform {
    projection: [[f32; 4]; 4],
    color1: [f32; 3],
    time: f32,
    color2: [f32; 3],
    line_speed: f32,
    line_color: [f32; 3],
    line_intensity: f32,
    line_width: f32,
    half_size: f32,
    distance: f32,
    _pad: f32,
}

impl BackgroundUniform {
    pub(crate) fn new(uniforms: &ShaderUniformSet, camera: &Camera, stage: &StageConfig) -> Self {
        Self {
            projection: camera.projection_matrix().to_cols_array_2d(),
            color1: uniforms.rgb(UniformName::Color1).to_array(),
            time: uniforms.time(),
            color2: uniforms.rgb(UniformName::Color2).to_array(),
            line_speed: uniforms.scalar(UniformName::LineSpeed),
            line_color: uniforms.rgb(UniformName::LineColor).to_array(),
            line_intensity: uniforms.scalar(UniformName::LineIntensity),
            line_width: uniforms.scalar(UniformName::LineWidth),
            half_size: stage.backdrop_size * 0.5,
            distance: stage.backdrop_distance,
            _pad: 0.0,
        }
    }
}

/// Backdrop pipeline and its uniform buffer.
///
/// Drawn first in the scene pass with depth writes off, so anything opaque
/// drawn afterwards lands on top of it.
pub struct BackgroundPass {
    pipeline: wgpu::RenderPipeline,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl BackgroundPass {
    pub fn new(device: &Device, initial: BackgroundUniform) -> Self {
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Background Uniform Buffer"),
            contents: bytemuck::cast_slice(&[initial]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Background Bind Group Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Background Bind Group"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Background Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/background.wgsl").into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Background Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Background Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &[],
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
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: crate::DEPTH_FORMAT,
                depth_write_enabled: false,
                depth_compare: wgpu::CompareFunction::Always,
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
            uniform_buffer,
            bind_group,
        }
    }

    pub fn write(&self, queue: &Queue, uniform: &BackgroundUniform) {
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::cast_slice(&[*uniform]));
    }

    pub fn draw<'a>(&'a self, pass: &mut wgpu::RenderPass<'a>) {
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.bind_group, &[]);
        pass.draw(0..6, 0..1);
    }

    pub fn destroy(self) {
        self.uniform_buffer.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vitrine_core::SceneSettings;
    use vitrine_math::Vec3;

    #[test]
    fn test_uniform_layout_matches_shader() {
        assert_eq!(std::mem::size_of::<BackgroundUniform>(), 128);
    }

    #[test]
    fn test_uniform_carries_linear_colors() {
        let settings = SceneSettings::default();
        let uniforms = ShaderUniformSet::from_settings(&settings);
        let camera = Camera::new(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, 16.0 / 9.0);
        let uniform = BackgroundUniform::new(&uniforms, &camera, &StageConfig::default());

        assert_eq!(uniform.color2, settings.bg_color2.to_linear().to_array());
        assert_eq!(uniform.half_size, 100.0);
        assert_eq!(uniform.distance, 50.0);
        assert_eq!(uniform.line_width, 0.05);
    }
}
