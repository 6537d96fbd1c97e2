//! wgpu viewport for the product stage.
//!
//! Owns the GPU device, the surface, the render passes and the egui control
//! panel, and exposes them to the frame scheduler through [`FrameStage`].

mod background;
mod control_panel;
mod mesh_pass;
mod render_graph;

use std::sync::Arc;

use anyhow::Result;
use wgpu::{Device, Instance, Queue, Surface, SurfaceConfiguration};
use winit::window::Window;

use vitrine_core::background::backdrop_covers_view;
use vitrine_core::{
    AssetEvent, AssetSlot, AssetSource, CameraRig, ControlPanel, FrameStage, OrbitControls,
    ParameterStore, Scene, SceneSettings, StageConfig, StageState, ViewportState,
};

use background::{BackgroundPass, BackgroundUniform};
use control_panel::PanelStats;
use mesh_pass::{CameraUniform, MeshPass};
use render_graph::RenderGraph;

/// HDR format of the scene and bloom targets.
pub const SCENE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;

/// Startup inputs for a [`Viewport`].
#[derive(Debug, Clone)]
pub struct ViewportOptions {
    pub settings: SceneSettings,
    pub stage: StageConfig,
    pub asset: AssetSource,
    pub show_panel: bool,
}

struct Passes {
    background: BackgroundPass,
    meshes: MeshPass,
    graph: RenderGraph,
}

pub struct Viewport {
    window: Arc<Window>,
    surface: Surface<'static>,
    device: Device,
    queue: Queue,
    config: SurfaceConfiguration,
    viewport: ViewportState,

    stage: StageConfig,
    rig: CameraRig,

    store: ParameterStore,
    panel: ControlPanel,
    state: StageState,

    // None once released
    passes: Option<Passes>,

    // egui state
    egui_ctx: egui::Context,
    egui_state: egui_winit::State,
    egui_renderer: egui_wgpu::Renderer,

    fps: f32,
    frames: u64,
    failed_frames: u64,
    out_of_memory: bool,
}

impl Viewport {
    /// Create the GPU context and passes. The asset starts loading in the
    /// background and shows up on a later frame.
    pub async fn new(window: Arc<Window>, options: ViewportOptions) -> Result<Self> {
        let ViewportOptions {
            settings,
            stage,
            asset,
            show_panel,
        } = options;

        // Kick off the load before the slow GPU setup
        let asset = AssetSlot::load(asset);

        let size = window.inner_size();
        let viewport = ViewportState::new(size.width.max(1), size.height.max(1));

        let instance = Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let surface = instance.create_surface(window.clone())?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| anyhow::anyhow!("Failed to find suitable GPU adapter"))?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Vitrine Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| anyhow::anyhow!("Surface reports no supported formats"))?;
        let present_mode = if surface_caps.present_modes.contains(&wgpu::PresentMode::Mailbox) {
            wgpu::PresentMode::Mailbox
        } else {
            wgpu::PresentMode::Fifo
        };

        let config = SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: viewport.width,
            height: viewport.height,
            present_mode,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);
        log::info!(
            "Surface configured: {}x{} {:?} {:?}",
            viewport.width,
            viewport.height,
            surface_format,
            present_mode
        );

        let mut store = settings.to_parameter_store();
        let mut panel = ControlPanel::new(&mut store);
        panel.visible = show_panel;

        let state = StageState::new(&store, &stage, asset);
        let rig = CameraRig::from_stage(&stage, viewport);

        if !backdrop_covers_view(
            stage.backdrop_size,
            stage.backdrop_distance,
            rig.camera.fov_y,
            viewport.aspect(),
        ) {
            log::warn!(
                "Backdrop ({} at {}) does not fill the view",
                stage.backdrop_size,
                stage.backdrop_distance
            );
        }

        let passes = Passes {
            background: BackgroundPass::new(
                &device,
                BackgroundUniform::new(&state.uniforms, &rig.camera, &stage),
            ),
            meshes: MeshPass::new(&device, CameraUniform::new(&rig.camera, &stage.lighting)),
            graph: RenderGraph::new(&device, &queue, surface_format, viewport, &state.post),
        };

        let egui_ctx = egui::Context::default();
        let egui_state = egui_winit::State::new(
            egui_ctx.clone(),
            egui::ViewportId::ROOT,
            &window,
            Some(window.scale_factor() as f32),
            None,
            None,
        );
        let egui_renderer = egui_wgpu::Renderer::new(&device, surface_format, None, 1, false);

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            viewport,
            stage,
            rig,
            store,
            panel,
            state,
            passes: Some(passes),
            egui_ctx,
            egui_state,
            egui_renderer,
            fps: 0.0,
            frames: 0,
            failed_frames: 0,
            out_of_memory: false,
        })
    }

    pub fn window(&self) -> &Arc<Window> {
        &self.window
    }

    /// Reconfigure the surface and rebuild size-dependent targets.
    /// Zero-sized requests (minimized windows) are ignored.
    pub fn resize(&mut self, width: u32, height: u32) {
        let viewport = ViewportState::new(width, height);
        if viewport.is_empty() || viewport == self.viewport {
            return;
        }

        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);

        if let Some(passes) = &mut self.passes {
            passes.graph.resize(&self.device, &self.queue, viewport);
        }
        self.rig.set_viewport(viewport);
        self.viewport = viewport;
        log::info!("Viewport resized to {}x{}", width, height);
    }

    pub fn viewport(&self) -> ViewportState {
        self.viewport
    }

    /// Handle egui window event - returns true if event was consumed by egui
    pub fn handle_egui_event(&mut self, event: &winit::event::WindowEvent) -> bool {
        let response = self.egui_state.on_window_event(&self.window, event);
        response.consumed
    }

    pub fn toggle_panel(&mut self) {
        self.panel.visible = !self.panel.visible;
    }

    pub fn controls_mut(&mut self) -> &mut OrbitControls {
        &mut self.rig.controls
    }

    /// Frame counters shown in the panel.
    pub fn set_frame_stats(&mut self, fps: f32, frames: u64, failed_frames: u64) {
        self.fps = fps;
        self.frames = frames;
        self.failed_frames = failed_frames;
    }

    /// Set once the surface ran out of memory; the caller should exit.
    pub fn is_out_of_memory(&self) -> bool {
        self.out_of_memory
    }

    pub fn scene(&self) -> &Scene {
        &self.state.scene
    }

    fn panel_stats(&self) -> PanelStats {
        let asset = match &self.state.asset {
            AssetSlot::Loading(pending) => format!("{} (loading)", pending.label()),
            AssetSlot::Resolved(handle) => self
                .state
                .scene
                .node(handle.root)
                .map(|node| node.name.clone())
                .unwrap_or_default(),
            AssetSlot::Failed(err) => format!("failed: {}", err),
        };
        PanelStats {
            fps: self.fps,
            frames: self.frames,
            failed_frames: self.failed_frames,
            meshes: self.passes.as_ref().map_or(0, |p| p.meshes.mesh_count()),
            triangles: self.state.scene.total_triangle_count(),
            asset,
        }
    }

    /// Run the egui frame and push any edits into the store.
    fn run_ui(&mut self) -> egui::FullOutput {
        let raw_input = self.egui_state.take_egui_input(&self.window);
        let stats = self.panel_stats();

        let mut edits = Vec::new();
        let full_output = self.egui_ctx.run(raw_input, |ctx| {
            edits = control_panel::show(ctx, &self.panel, &self.store, &stats);
        });

        for (key, value) in edits {
            if let Err(err) = self.panel.set(key, value, &mut self.store) {
                log::warn!("Rejected {} edit: {}", key.as_str(), err);
            }
        }
        full_output
    }

    /// Route queued store changes to the live components.
    fn dispatch_panel(&mut self) {
        match self.state.dispatch(&self.panel) {
            Ok(0) => {}
            Ok(applied) => log::debug!("Applied {} control changes", applied),
            Err(err) => log::warn!("Control change failed: {}", err),
        }
    }
}

impl FrameStage for Viewport {
    type Error = anyhow::Error;

    fn dispatch_completions(&mut self) {
        match self.state.poll_asset(&mut self.panel) {
            Some(AssetEvent::Resolved(_)) => {
                if let Some(passes) = &mut self.passes {
                    passes.meshes.sync(&self.device, &self.state.scene);
                }
            }
            // Already logged; the stage keeps running without a model
            Some(AssetEvent::Failed(_)) | None => {}
        }
        self.dispatch_panel();
    }

    fn update_camera(&mut self) {
        self.rig.update();
        if let Some(passes) = &self.passes {
            let camera = CameraUniform::new(&self.rig.camera, &self.stage.lighting);
            passes.meshes.write_camera(&self.queue, &camera);
        }
    }

    fn time_scale(&self) -> f32 {
        self.state.shader_speed
    }

    fn write_time(&mut self, shader_time: f32) {
        // Uploaded in `render`, together with this frame's panel edits
        self.state.uniforms.set_time(shader_time);
    }

    fn animate_asset(&mut self, offset_y: f32) -> bool {
        self.state.set_asset_offset(offset_y)
    }

    fn render(&mut self) -> Result<()> {
        if self.passes.is_none() {
            return Ok(());
        }

        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&self.device, &self.config);
                return Ok(());
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                self.out_of_memory = true;
                anyhow::bail!("Surface out of memory");
            }
            Err(err) => return Err(err.into()),
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let full_output = self.run_ui();
        // This frame's edits reach the uniforms before they are uploaded
        self.dispatch_panel();
        self.egui_state
            .handle_platform_output(&self.window, full_output.platform_output);

        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [self.config.width, self.config.height],
            pixels_per_point: self.window.scale_factor() as f32,
        };
        let paint_jobs = self
            .egui_ctx
            .tessellate(full_output.shapes, full_output.pixels_per_point);

        let Some(passes) = &self.passes else {
            return Ok(());
        };

        let backdrop = BackgroundUniform::new(&self.state.uniforms, &self.rig.camera, &self.stage);
        passes.background.write(&self.queue, &backdrop);
        passes.meshes.write_draws(&self.queue, &self.state.scene);
        passes.graph.prepare(&self.queue, &self.state.post);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        for (id, image_delta) in &full_output.textures_delta.set {
            self.egui_renderer
                .update_texture(&self.device, &self.queue, *id, image_delta);
        }
        self.egui_renderer.update_buffers(
            &self.device,
            &self.queue,
            &mut encoder,
            &paint_jobs,
            &screen_descriptor,
        );

        passes.graph.encode(
            &mut encoder,
            &view,
            self.viewport,
            &passes.background,
            &passes.meshes,
        )?;

        // Render egui on top
        {
            let mut egui_pass = encoder
                .begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("egui Render Pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Load,
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                })
                .forget_lifetime();

            self.egui_renderer
                .render(&mut egui_pass, &paint_jobs, &screen_descriptor);
        }

        for id in &full_output.textures_delta.free {
            self.egui_renderer.free_texture(id);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        Ok(())
    }

    fn release(&mut self) {
        self.panel.release(&mut self.store);
        if let Some(passes) = self.passes.take() {
            passes.background.destroy();
            passes.meshes.destroy();
            passes.graph.destroy();
            log::info!("Released GPU resources");
        }
    }
}
