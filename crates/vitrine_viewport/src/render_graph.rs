//! Scene pass and bloom chain.
//!
//! Frame order: the scene (backdrop first, then meshes) renders into an HDR
//! target; a high-pass extracts what is over the threshold; each bloom level
//! blurs horizontally then vertically, feeding the next, smaller level; the
//! composite adds the weighted levels onto the scene, tone maps and writes
//! the surface.
//!
//! Every size-dependent texture and bind group lives in one
//! [`SizedTargets`] that is rebuilt inside [`RenderGraph::resize`].

use wgpu::{util::DeviceExt, Device, Queue};

use vitrine_core::post::{bloom_mip_extents, gaussian_weights, KERNEL_RADII, HIGH_PASS_SMOOTH_WIDTH};
use vitrine_core::{PostProcessConfig, SizedTargets, StaleTargets, ViewportState, BLOOM_LEVELS};

use crate::background::BackgroundPass;
use crate::mesh_pass::MeshPass;
use crate::{DEPTH_FORMAT, SCENE_FORMAT};

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct HighPassUniform {
    threshold: f32,
    smooth_width: f32,
    _pad: [f32; 2],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct BlurUniform {
    direction: [f32; 2],
    texel_size: [f32; 2],
    radius: f32,
    _pad: [f32; 3],
    weights: [[f32; 4]; 3],
}

impl BlurUniform {
    fn new(direction: [f32; 2], extent: ViewportState, radius: usize) -> Self {
        let taps = gaussian_weights(radius);
        let mut weights = [[0.0; 4]; 3];
        for (i, w) in taps.iter().enumerate() {
            weights[i / 4][i % 4] = *w;
        }
        Self {
            direction,
            texel_size: [1.0 / extent.width as f32, 1.0 / extent.height as f32],
            radius: radius as f32,
            _pad: [0.0; 3],
            weights,
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct CompositeUniform {
    weights: [f32; 4],
    weight4: f32,
    exposure: f32,
    _pad: [f32; 2],
}

impl CompositeUniform {
    fn new(post: &PostProcessConfig) -> Self {
        let w = post.composite_weights();
        Self {
            weights: [w[0], w[1], w[2], w[3]],
            weight4: w[4],
            exposure: 1.0,
            _pad: [0.0; 2],
        }
    }
}

const HORIZONTAL: [f32; 2] = [1.0, 0.0];
const VERTICAL: [f32; 2] = [0.0, 1.0];

fn create_target(
    device: &Device,
    label: &str,
    extent: ViewportState,
    format: wgpu::TextureFormat,
) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: extent.width.max(1),
            height: extent.height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

/// Layouts and static resources the size-dependent bind groups refer to.
struct GraphLayouts {
    filter_layout: wgpu::BindGroupLayout,
    composite_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    high_pass_buffer: wgpu::Buffer,
    composite_buffer: wgpu::Buffer,
    blur_buffers: Vec<[wgpu::Buffer; 2]>,
}

impl GraphLayouts {
    fn filter_bind_group(
        &self,
        device: &Device,
        label: &str,
        source: &wgpu::TextureView,
        uniform: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &self.filter_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(source),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: uniform.as_entire_binding(),
                },
            ],
        })
    }
}

struct BloomLevel {
    extent: ViewportState,
    horizontal: (wgpu::Texture, wgpu::TextureView),
    vertical: (wgpu::Texture, wgpu::TextureView),
    bind_groups: [wgpu::BindGroup; 2],
}

/// Everything that depends on the viewport size.
struct FrameTargets {
    scene_color: (wgpu::Texture, wgpu::TextureView),
    depth: (wgpu::Texture, wgpu::TextureView),
    bright: (wgpu::Texture, wgpu::TextureView),
    high_pass_bind_group: wgpu::BindGroup,
    levels: Vec<BloomLevel>,
    composite_bind_group: wgpu::BindGroup,
}

impl FrameTargets {
    fn new(device: &Device, layouts: &GraphLayouts, extent: ViewportState) -> Self {
        let scene_color = create_target(device, "Scene Color", extent, SCENE_FORMAT);
        let depth = create_target(device, "Depth Texture", extent, DEPTH_FORMAT);

        let mips = bloom_mip_extents(extent);
        let bright = create_target(device, "Bloom Bright", mips[0], SCENE_FORMAT);
        let high_pass_bind_group = layouts.filter_bind_group(
            device,
            "High Pass Bind Group",
            &scene_color.1,
            &layouts.high_pass_buffer,
        );

        let mut levels: Vec<BloomLevel> = Vec::with_capacity(BLOOM_LEVELS);
        for (i, mip) in mips.iter().enumerate() {
            let horizontal = create_target(device, &format!("Bloom {} H", i), *mip, SCENE_FORMAT);
            let vertical = create_target(device, &format!("Bloom {} V", i), *mip, SCENE_FORMAT);

            let source = match levels.last() {
                Some(previous) => &previous.vertical.1,
                None => &bright.1,
            };
            let bind_groups = [
                layouts.filter_bind_group(
                    device,
                    "Blur Bind H",
                    source,
                    &layouts.blur_buffers[i][0],
                ),
                layouts.filter_bind_group(
                    device,
                    "Blur Bind V",
                    &horizontal.1,
                    &layouts.blur_buffers[i][1],
                ),
            ];

            levels.push(BloomLevel {
                extent: *mip,
                horizontal,
                vertical,
                bind_groups,
            });
        }

        let mut entries = vec![
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&scene_color.1),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(&layouts.sampler),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: layouts.composite_buffer.as_entire_binding(),
            },
        ];
        for (i, level) in levels.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: 3 + i as u32,
                resource: wgpu::BindingResource::TextureView(&level.vertical.1),
            });
        }
        let composite_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Composite Bind Group"),
            layout: &layouts.composite_layout,
            entries: &entries,
        });

        Self {
            scene_color,
            depth,
            bright,
            high_pass_bind_group,
            levels,
            composite_bind_group,
        }
    }

    fn destroy(&self) {
        self.scene_color.0.destroy();
        self.depth.0.destroy();
        self.bright.0.destroy();
        for level in &self.levels {
            level.horizontal.0.destroy();
            level.vertical.0.destroy();
        }
    }
}

const HIGH_PASS_SHADER: &str = concat!(
    include_str!("shaders/fullscreen.wgsl"),
    include_str!("shaders/high_pass.wgsl")
);
const BLUR_SHADER: &str = concat!(
    include_str!("shaders/fullscreen.wgsl"),
    include_str!("shaders/blur.wgsl")
);
const COMPOSITE_SHADER: &str = concat!(
    include_str!("shaders/fullscreen.wgsl"),
    include_str!("shaders/composite.wgsl")
);

fn fullscreen_pipeline(
    device: &Device,
    label: &str,
    source: &str,
    layout: &wgpu::BindGroupLayout,
    fragment: &str,
    format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[layout],
        push_constant_ranges: &[],
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: "vs_fullscreen",
            buffers: &[],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: fragment,
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

fn fullscreen_pass(
    encoder: &mut wgpu::CommandEncoder,
    label: &str,
    target: &wgpu::TextureView,
    pipeline: &wgpu::RenderPipeline,
    bind_group: &wgpu::BindGroup,
) {
    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: target,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
    });
    pass.set_pipeline(pipeline);
    pass.set_bind_group(0, bind_group, &[]);
    pass.draw(0..3, 0..1);
}

/// Scene pass plus bloom, ending on the surface.
pub struct RenderGraph {
    layouts: GraphLayouts,
    high_pass_pipeline: wgpu::RenderPipeline,
    blur_pipeline: wgpu::RenderPipeline,
    composite_pipeline: wgpu::RenderPipeline,
    targets: SizedTargets<FrameTargets>,
}

impl RenderGraph {
    pub fn new(
        device: &Device,
        queue: &Queue,
        surface_format: wgpu::TextureFormat,
        viewport: ViewportState,
        post: &PostProcessConfig,
    ) -> Self {
        let texture_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };
        let sampler_entry = wgpu::BindGroupLayoutEntry {
            binding: 1,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        };
        let uniform_entry = wgpu::BindGroupLayoutEntry {
            binding: 2,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let filter_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Bloom Filter Bind Group Layout"),
            entries: &[texture_entry(0), sampler_entry, uniform_entry],
        });

        let mut composite_entries = vec![texture_entry(0), sampler_entry, uniform_entry];
        composite_entries.extend((0..BLOOM_LEVELS as u32).map(|i| texture_entry(3 + i)));
        let composite_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Composite Bind Group Layout"),
            entries: &composite_entries,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Bloom Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let high_pass_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("High Pass Uniform"),
            contents: bytemuck::cast_slice(&[HighPassUniform {
                threshold: post.threshold,
                smooth_width: HIGH_PASS_SMOOTH_WIDTH,
                _pad: [0.0; 2],
            }]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let composite_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Composite Uniform"),
            contents: bytemuck::cast_slice(&[CompositeUniform::new(post)]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let blur_buffers = (0..BLOOM_LEVELS)
            .map(|i| {
                [HORIZONTAL, VERTICAL].map(|_| {
                    device.create_buffer(&wgpu::BufferDescriptor {
                        label: Some(&format!("Blur Uniform {}", i)),
                        size: std::mem::size_of::<BlurUniform>() as wgpu::BufferAddress,
                        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                        mapped_at_creation: false,
                    })
                })
            })
            .collect();

        let layouts = GraphLayouts {
            filter_layout,
            composite_layout,
            sampler,
            high_pass_buffer,
            composite_buffer,
            blur_buffers,
        };

        let high_pass_pipeline = fullscreen_pipeline(
            device,
            "High Pass Pipeline",
            HIGH_PASS_SHADER,
            &layouts.filter_layout,
            "fs_high_pass",
            SCENE_FORMAT,
        );
        let blur_pipeline = fullscreen_pipeline(
            device,
            "Blur Pipeline",
            BLUR_SHADER,
            &layouts.filter_layout,
            "fs_blur",
            SCENE_FORMAT,
        );
        let composite_pipeline = fullscreen_pipeline(
            device,
            "Composite Pipeline",
            COMPOSITE_SHADER,
            &layouts.composite_layout,
            "fs_composite",
            surface_format,
        );

        let targets = SizedTargets::new(viewport, |extent| FrameTargets::new(device, &layouts, extent));
        let graph = Self {
            layouts,
            high_pass_pipeline,
            blur_pipeline,
            composite_pipeline,
            targets,
        };
        graph.write_blur_uniforms(queue, viewport);
        graph
    }

    fn write_blur_uniforms(&self, queue: &Queue, viewport: ViewportState) {
        for (i, mip) in bloom_mip_extents(viewport).iter().enumerate() {
            for (buffer, direction) in self.layouts.blur_buffers[i].iter().zip([HORIZONTAL, VERTICAL]) {
                let uniform = BlurUniform::new(direction, *mip, KERNEL_RADII[i]);
                queue.write_buffer(buffer, 0, bytemuck::cast_slice(&[uniform]));
            }
        }
    }

    /// Rebuild every size-dependent target. Runs before the next frame renders.
    pub fn resize(&mut self, device: &Device, queue: &Queue, viewport: ViewportState) {
        let previous = self.targets.extent();
        if previous != viewport {
            if let Ok(stale) = self.targets.get(previous) {
                stale.destroy();
            }
        }

        let layouts = &self.layouts;
        let rebuilt = self
            .targets
            .resize(viewport, |extent| FrameTargets::new(device, layouts, extent));
        if rebuilt {
            self.write_blur_uniforms(queue, viewport);
            log::debug!(
                "Render targets {}x{} -> {}x{}",
                previous.width,
                previous.height,
                viewport.width,
                viewport.height
            );
        }
    }

    /// Upload per-frame bloom parameters.
    pub fn prepare(&self, queue: &Queue, post: &PostProcessConfig) {
        let high_pass = HighPassUniform {
            threshold: post.threshold,
            smooth_width: HIGH_PASS_SMOOTH_WIDTH,
            _pad: [0.0; 2],
        };
        queue.write_buffer(&self.layouts.high_pass_buffer, 0, bytemuck::cast_slice(&[high_pass]));
        queue.write_buffer(
            &self.layouts.composite_buffer,
            0,
            bytemuck::cast_slice(&[CompositeUniform::new(post)]),
        );
    }

    /// Encode the whole frame into `output`.
    ///
    /// Fails without encoding anything if the targets were built for a
    /// different viewport than `viewport`.
    pub fn encode(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        output: &wgpu::TextureView,
        viewport: ViewportState,
        background: &BackgroundPass,
        meshes: &MeshPass,
    ) -> Result<(), StaleTargets> {
        let targets = self.targets.get(viewport)?;

        // Scene pass
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Scene Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &targets.scene_color.1,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &targets.depth.1,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            background.draw(&mut pass);
            meshes.draw(&mut pass);
        }

        fullscreen_pass(
            encoder,
            "High Pass",
            &targets.bright.1,
            &self.high_pass_pipeline,
            &targets.high_pass_bind_group,
        );

        for level in &targets.levels {
            fullscreen_pass(
                encoder,
                "Blur H Pass",
                &level.horizontal.1,
                &self.blur_pipeline,
                &level.bind_groups[0],
            );
            fullscreen_pass(
                encoder,
                "Blur V Pass",
                &level.vertical.1,
                &self.blur_pipeline,
                &level.bind_groups[1],
            );
        }

        fullscreen_pass(
            encoder,
            "Composite Pass",
            output,
            &self.composite_pipeline,
            &targets.composite_bind_group,
        );

        Ok(())
    }

    pub fn destroy(self) {
        if let Ok(targets) = self.targets.get(self.targets.extent()) {
            targets.destroy();
        }
        self.layouts.high_pass_buffer.destroy();
        self.layouts.composite_buffer.destroy();
        for pair in &self.layouts.blur_buffers {
            for buffer in pair {
                buffer.destroy();
            }
        }
    }
}
