/// meshview viewer - wgpu frontend for STL preview and PNG export
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{error, info, warn};
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, KeyEvent, MouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::WindowBuilder;

pub mod batch;
pub mod capture;
pub mod config;
pub mod controller;
pub mod error;
pub mod gpu;
pub mod renderer;
pub mod shader;

pub use batch::{collect_inputs, run_batch, BatchSummary};
pub use config::ViewerConfig;
pub use controller::{Action, Input, ViewerController, ViewerHost};
pub use error::RenderError;
pub use gpu::RenderTarget;
pub use renderer::{RenderCoordinator, SceneRenderer, Viewport};

use controller::{initial_view, pixels_to_lines};

/// Interactive viewer window
pub struct ViewerApp {
    config: ViewerConfig,
    config_path: PathBuf,
    initial_mesh: Option<PathBuf>,
}

/// State the controller drives while the window is open
struct Session {
    config: ViewerConfig,
    renderer: RenderCoordinator,
}

impl ViewerHost for Session {
    type Renderer = RenderCoordinator;

    fn config(&mut self) -> &mut ViewerConfig {
        &mut self.config
    }

    fn renderer(&mut self) -> &mut RenderCoordinator {
        &mut self.renderer
    }
}

/// Map a window event onto controller input.
fn translate(event: &WindowEvent) -> Option<Input> {
    match event {
        WindowEvent::CursorMoved { position, .. } => Some(Input::CursorMoved {
            x: position.x,
            y: position.y,
        }),
        WindowEvent::MouseInput {
            state,
            button: MouseButton::Left,
            ..
        } => Some(Input::PrimaryButton {
            pressed: *state == ElementState::Pressed,
        }),
        WindowEvent::MouseWheel { delta, .. } => Some(Input::Scroll(match delta {
            MouseScrollDelta::LineDelta(_, y) => *y,
            MouseScrollDelta::PixelDelta(position) => pixels_to_lines(position.y as f32),
        })),
        WindowEvent::KeyboardInput {
            event:
                KeyEvent {
                    logical_key,
                    state: ElementState::Pressed,
                    ..
                },
            ..
        } => match logical_key {
            Key::Named(NamedKey::Escape) => Some(Input::Escape),
            Key::Character(text) => text
                .chars()
                .next()
                .map(|c| Input::Key(c.to_ascii_lowercase())),
            _ => None,
        },
        WindowEvent::DroppedFile(path) => Some(Input::FileDropped(path.clone())),
        _ => None,
    }
}

impl ViewerApp {
    pub fn new(config: ViewerConfig, config_path: PathBuf, initial_mesh: Option<PathBuf>) -> Self {
        Self {
            config,
            config_path,
            initial_mesh,
        }
    }

    /// Open the window and run until it is closed. The config is saved on exit.
    pub fn run(self) -> Result<()> {
        let event_loop = EventLoop::new().context("Failed to create event loop")?;
        let window = Arc::new(
            WindowBuilder::new()
                .with_title("meshview")
                .with_inner_size(PhysicalSize::new(
                    self.config.window.width,
                    self.config.window.height,
                ))
                .build(&event_loop)
                .context("Failed to create window")?,
        );

        let size = window.inner_size();
        let mut renderer = RenderCoordinator::initialize(
            size.width,
            size.height,
            RenderTarget::Window(window.clone()),
        )
        .context("Failed to initialize renderer")?;
        renderer.set_background_color(self.config.render.background());
        renderer.set_model_color(self.config.render.model());

        if let Some(path) = &self.initial_mesh {
            if let Err(err) = renderer.load_mesh(path) {
                error!("Could not load {}: {err}", path.display());
            }
        }
        initial_view(&mut renderer, &self.config.camera);

        let mut session = Session {
            config: self.config,
            renderer,
        };
        let mut controller = ViewerController::new();
        let config_path = self.config_path;

        info!("Viewer ready: drag to orbit, wheel to zoom, C centre, R reset, P projection, S save, Q quit");
        event_loop.set_control_flow(ControlFlow::Wait);
        event_loop
            .run(move |event, elwt| match event {
                Event::WindowEvent { window_id, event } if window_id == window.id() => match event {
                    WindowEvent::CloseRequested => elwt.exit(),
                    WindowEvent::Resized(new_size) => {
                        session.renderer.resize(new_size.width, new_size.height);
                        window.request_redraw();
                    }
                    WindowEvent::RedrawRequested => {
                        let size = window.inner_size();
                        let viewport = Viewport::full(size.width, size.height);
                        if let Err(err) = session.renderer.render_frame(viewport) {
                            error!("Rendering failed: {err}");
                            elwt.exit();
                        }
                    }
                    other => {
                        let Some(input) = translate(&other) else {
                            return;
                        };
                        match controller.handle(&mut session, input) {
                            Action::Redraw => window.request_redraw(),
                            Action::Exit => elwt.exit(),
                            Action::None => {}
                        }
                    }
                },
                Event::LoopExiting => {
                    if let Err(err) = session.config.save(&config_path) {
                        warn!("Could not save config: {err}");
                    }
                }
                _ => {}
            })
            .context("Event loop failed")?;

        Ok(())
    }
}
