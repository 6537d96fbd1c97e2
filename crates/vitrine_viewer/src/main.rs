use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use vitrine_core::{AssetSource, FrameScheduler, SceneSettings, StageConfig};
use vitrine_viewport::{Viewport, ViewportOptions};
use winit::{
    application::ApplicationHandler,
    event::{ElementState, KeyEvent, MouseButton, MouseScrollDelta, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

const ORBIT_SENSITIVITY: f32 = 0.005;
const PAN_SENSITIVITY: f32 = 0.002;
const DOLLY_STEP: f32 = 0.95;

/// Product stage viewer
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// glTF or GLB model to display
    #[arg(value_name = "MODEL")]
    model: Option<PathBuf>,

    /// Same as the positional MODEL
    #[arg(long = "model", value_name = "PATH", conflicts_with = "model")]
    model_flag: Option<PathBuf>,

    /// JSON file with look settings; missing keys keep their defaults
    #[arg(long)]
    settings: Option<PathBuf>,

    #[arg(long, default_value_t = 1280)]
    width: u32,

    #[arg(long, default_value_t = 720)]
    height: u32,

    /// Start with the control panel hidden
    #[arg(long)]
    no_panel: bool,
}

impl Args {
    fn model_path(&self) -> PathBuf {
        self.model
            .clone()
            .or_else(|| self.model_flag.clone())
            .unwrap_or_else(|| PathBuf::from("models/phantom.glb"))
    }

    fn viewport_options(&self) -> Result<ViewportOptions> {
        let settings = match &self.settings {
            Some(path) => SceneSettings::load(path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?,
            None => SceneSettings::default(),
        };

        Ok(ViewportOptions {
            settings,
            stage: StageConfig::default(),
            asset: AssetSource::Path(self.model_path()),
            show_panel: !self.no_panel,
        })
    }
}

/// Application state
struct App {
    options: ViewportOptions,
    size: (u32, u32),
    viewport: Option<Viewport>,
    // Started with the viewport so GPU setup is not counted as frame time
    scheduler: Option<FrameScheduler>,

    // Input state
    left_mouse_pressed: bool,
    middle_mouse_pressed: bool,
    last_mouse_pos: Option<(f64, f64)>,
}

impl App {
    fn new(options: ViewportOptions, size: (u32, u32)) -> Self {
        Self {
            options,
            size,
            viewport: None,
            scheduler: None,
            left_mouse_pressed: false,
            middle_mouse_pressed: false,
            last_mouse_pos: None,
        }
    }

    fn create_viewport(&self, event_loop: &ActiveEventLoop) -> Result<Viewport> {
        let window_attrs = Window::default_attributes()
            .with_title("Vitrine")
            .with_inner_size(winit::dpi::PhysicalSize::new(self.size.0, self.size.1));
        let window = Arc::new(
            event_loop
                .create_window(window_attrs)
                .context("Failed to create window")?,
        );

        pollster::block_on(Viewport::new(window, self.options.clone()))
            .context("Failed to initialize viewport")
    }

    fn teardown(&mut self) {
        if let (Some(scheduler), Some(viewport)) = (&mut self.scheduler, &mut self.viewport) {
            scheduler.teardown(viewport);
        }
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        self.teardown();
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.viewport.is_some() {
            return;
        }

        match self.create_viewport(event_loop) {
            Ok(viewport) => {
                viewport.window().request_redraw();
                self.viewport = Some(viewport);
                self.scheduler = Some(FrameScheduler::new(&self.options.stage));
                log::info!("Window and viewport initialized");
            }
            Err(e) => {
                log::error!("{:#}", e);
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let (Some(viewport), Some(scheduler)) = (&mut self.viewport, &mut self.scheduler) else {
            return;
        };

        // Let egui handle the event first
        if viewport.handle_egui_event(&event) {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested");
                self.shutdown(event_loop);
            }
            WindowEvent::Resized(physical_size) => {
                viewport.resize(physical_size.width, physical_size.height);
            }
            WindowEvent::MouseInput { button, state, .. } => match button {
                MouseButton::Left => {
                    self.left_mouse_pressed = state == ElementState::Pressed;
                    if !self.left_mouse_pressed {
                        self.last_mouse_pos = None;
                    }
                }
                MouseButton::Middle => {
                    self.middle_mouse_pressed = state == ElementState::Pressed;
                    if !self.middle_mouse_pressed {
                        self.last_mouse_pos = None;
                    }
                }
                _ => {}
            },
            WindowEvent::CursorMoved { position, .. } => {
                if self.left_mouse_pressed || self.middle_mouse_pressed {
                    if let Some(last_pos) = self.last_mouse_pos {
                        let delta_x = (position.x - last_pos.0) as f32;
                        let delta_y = (position.y - last_pos.1) as f32;
                        let controls = viewport.controls_mut();

                        if self.left_mouse_pressed {
                            controls.rotate(-delta_x * ORBIT_SENSITIVITY, -delta_y * ORBIT_SENSITIVITY);
                        } else {
                            controls.pan(delta_x * PAN_SENSITIVITY, delta_y * PAN_SENSITIVITY);
                        }
                    }
                    self.last_mouse_pos = Some((position.x, position.y));
                }
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / 100.0,
                };
                viewport.controls_mut().dolly(DOLLY_STEP.powf(lines));
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::KeyH),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => {
                viewport.toggle_panel();
            }
            WindowEvent::RedrawRequested => {
                viewport.set_frame_stats(
                    scheduler.fps.fps,
                    scheduler.frame_count(),
                    scheduler.failed_frame_count(),
                );
                scheduler.tick(viewport);

                if viewport.is_out_of_memory() {
                    log::error!("Out of memory!");
                    self.shutdown(event_loop);
                    return;
                }

                if scheduler.is_running() {
                    viewport.window().request_redraw();
                }
            }
            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.teardown();
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args = Args::parse();
    let options = args.viewport_options()?;

    log::info!("Starting Vitrine with {}", args.model_path().display());

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(options, (args.width, args.height));

    log::info!("Running event loop");
    event_loop.run_app(&mut app)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_args() {
        let args = Args::try_parse_from(["vitrine_viewer"]).unwrap();
        assert_eq!(args.model_path(), PathBuf::from("models/phantom.glb"));
        assert_eq!((args.width, args.height), (1280, 720));
        assert!(!args.no_panel);
    }

    #[test]
    fn test_model_flag_and_positional() {
        let positional = Args::try_parse_from(["vitrine_viewer", "shoe.glb"]).unwrap();
        assert_eq!(positional.model_path(), PathBuf::from("shoe.glb"));

        let flag = Args::try_parse_from(["vitrine_viewer", "--model", "watch.gltf", "--no-panel"])
            .unwrap();
        assert_eq!(flag.model_path(), PathBuf::from("watch.gltf"));
        assert!(flag.no_panel);

        assert!(Args::try_parse_from(["vitrine_viewer", "a.glb", "--model", "b.glb"]).is_err());
    }

    #[test]
    fn test_scheduler_waits_for_viewport() {
        let args = Args::try_parse_from(["vitrine_viewer"]).unwrap();
        let app = App::new(args.viewport_options().unwrap(), (args.width, args.height));
        assert!(app.viewport.is_none());
        assert!(app.scheduler.is_none());
    }

    #[test]
    fn test_missing_settings_file_is_an_error() {
        let args = Args::try_parse_from(["vitrine_viewer", "--settings", "/nonexistent/look.json"])
            .unwrap();
        assert!(args.viewport_options().is_err());
    }
}
