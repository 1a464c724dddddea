//! Pointer and keyboard handling for the interactive viewer.
//!
//! The controller never touches winit types: the event loop translates window
//! events into [`Input`] values, and the controller drives whatever
//! [`ViewerHost`] it is given. Camera changes are mirrored into the config so
//! the last view is saved on exit.

use std::path::{Path, PathBuf};

use log::{info, warn};
use meshview_core::ProjectionMode;

use crate::batch::is_stl;
use crate::config::{CameraConfig, ViewerConfig};
use crate::renderer::SceneRenderer;

/// Orbit restored by the reset key
pub const RESET_ORBIT: (f32, f32, f32) = (0.8, 0.5, 3.0);

/// Pixel scroll deltas are converted to wheel lines at this rate
pub const PIXELS_PER_LINE: f32 = 40.0;

/// Export name when no mesh file is loaded
pub const PREVIEW_EXPORT_NAME: &str = "preview.png";

/// Window input after translation from the windowing system.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    CursorMoved { x: f64, y: f64 },
    /// Primary button pressed or released
    PrimaryButton { pressed: bool },
    /// Wheel motion in lines; positive zooms in
    Scroll(f32),
    /// Key press, lower-cased
    Key(char),
    Escape,
    FileDropped(PathBuf),
}

/// What the event loop should do after an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    Redraw,
    Exit,
}

/// Capabilities the controller needs from the application.
pub trait ViewerHost {
    type Renderer: SceneRenderer;

    fn config(&mut self) -> &mut ViewerConfig;
    fn renderer(&mut self) -> &mut Self::Renderer;
}

pub fn pixels_to_lines(pixels: f32) -> f32 {
    pixels / PIXELS_PER_LINE
}

/// `<stem>_render.png` next to the mesh file, or `preview.png` when there is none.
pub fn export_path(mesh_source: Option<&Path>) -> PathBuf {
    match mesh_source.and_then(|p| p.file_stem().map(|stem| (p, stem))) {
        Some((path, stem)) => {
            let mut name = stem.to_os_string();
            name.push("_render.png");
            path.with_file_name(name)
        }
        None => PathBuf::from(PREVIEW_EXPORT_NAME),
    }
}

/// Camera for a freshly opened window: aimed at the mesh if there is one,
/// then the stored orbit and projection (or framing) from the config.
pub fn initial_view<R: SceneRenderer>(renderer: &mut R, config: &CameraConfig) {
    if renderer.has_mesh() {
        renderer.center_camera_on_mesh();
    }
    renderer.apply_camera_config(config);
}

#[derive(Debug, Default)]
pub struct ViewerController {
    dragging: bool,
    last_cursor: Option<(f64, f64)>,
}

impl ViewerController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle<H: ViewerHost>(&mut self, host: &mut H, input: Input) -> Action {
        match input {
            Input::CursorMoved { x, y } => {
                let previous = self.last_cursor.replace((x, y));
                match previous {
                    Some((px, py)) if self.dragging => {
                        let sensitivity = host.config().camera.drag_sensitivity;
                        host.renderer().camera_mut().drag_delta(
                            (x - px) as f32,
                            (y - py) as f32,
                            sensitivity,
                        );
                        self.store_camera(host);
                        Action::Redraw
                    }
                    _ => Action::None,
                }
            }
            Input::PrimaryButton { pressed } => {
                self.dragging = pressed;
                Action::None
            }
            Input::Scroll(lines) => {
                if lines == 0.0 {
                    return Action::None;
                }
                let sensitivity = host.config().camera.zoom_sensitivity;
                host.renderer().camera_mut().zoom_delta(lines, sensitivity);
                self.store_camera(host);
                Action::Redraw
            }
            Input::Escape | Input::Key('q') => Action::Exit,
            Input::Key('c') => {
                host.renderer().center_camera_on_mesh();
                self.store_camera(host);
                Action::Redraw
            }
            Input::Key('r') => {
                let (yaw, pitch, distance) = RESET_ORBIT;
                host.renderer().set_camera_orbit(yaw, pitch, distance);
                self.store_camera(host);
                Action::Redraw
            }
            Input::Key('p') => {
                host.renderer().camera_mut().projection.toggle_mode();
                self.store_camera(host);
                Action::Redraw
            }
            Input::Key('s') => {
                self.export_view(host);
                Action::None
            }
            Input::Key(_) => Action::None,
            Input::FileDropped(path) => self.load_dropped(host, &path),
        }
    }

    /// Mirror the camera into the config.
    fn store_camera<H: ViewerHost>(&self, host: &mut H) {
        let camera = host.renderer().camera();
        let (yaw, pitch, distance) = (camera.yaw(), camera.pitch(), camera.distance());
        let orthographic = camera.projection.mode == ProjectionMode::Orthographic;

        let stored = &mut host.config().camera;
        stored.yaw = yaw;
        stored.pitch = pitch;
        stored.distance = distance;
        stored.orthographic = orthographic;
    }

    fn export_view<H: ViewerHost>(&self, host: &mut H) {
        let render = host.config().render.clone();
        let path = export_path(host.renderer().mesh_source());

        let renderer = host.renderer();
        renderer.set_output_size(render.output_width, render.output_height);
        match renderer.render_to_file(&path, render.transparent_background) {
            Ok(()) => info!("Saved view to {}", path.display()),
            Err(err) => warn!("Export to {} failed: {err}", path.display()),
        }
    }

    fn load_dropped<H: ViewerHost>(&self, host: &mut H, path: &Path) -> Action {
        if !is_stl(path) {
            info!("Ignoring dropped file {}", path.display());
            return Action::None;
        }
        match host.renderer().load_mesh(path) {
            Ok(()) => {
                host.renderer().center_camera_on_mesh();
                self.store_camera(host);
                Action::Redraw
            }
            Err(err) => {
                warn!("Could not load {}: {err}", path.display());
                Action::None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RenderError;
    use meshview_core::{Mesh, MeshError, OrbitCamera};

    /// Records exports and serves a fixed mesh for `.stl` loads
    #[derive(Default)]
    struct FakeRenderer {
        camera: OrbitCamera,
        mesh: Option<Mesh>,
        source: Option<PathBuf>,
        output_size: (u32, u32),
        exports: Vec<(PathBuf, bool)>,
    }

    impl SceneRenderer for FakeRenderer {
        fn camera(&self) -> &OrbitCamera {
            &self.camera
        }
        fn camera_mut(&mut self) -> &mut OrbitCamera {
            &mut self.camera
        }
        fn has_mesh(&self) -> bool {
            self.mesh.is_some()
        }
        fn mesh_source(&self) -> Option<&Path> {
            self.source.as_deref()
        }
        fn load_mesh(&mut self, path: &Path) -> Result<(), RenderError> {
            if path.to_string_lossy().contains("broken") {
                return Err(MeshError::Empty.into());
            }
            self.mesh = Some(Mesh::cube(4.0));
            self.source = Some(path.to_path_buf());
            Ok(())
        }
        fn center_camera_on_mesh(&mut self) {
            if let Some(mesh) = &self.mesh {
                self.camera.frame_mesh(mesh);
            }
        }
        fn set_output_size(&mut self, width: u32, height: u32) {
            self.output_size = (width, height);
        }
        fn render_to_file(&mut self, path: &Path, transparent: bool) -> Result<(), RenderError> {
            self.exports.push((path.to_path_buf(), transparent));
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeHost {
        config: ViewerConfig,
        renderer: FakeRenderer,
    }

    impl ViewerHost for FakeHost {
        type Renderer = FakeRenderer;

        fn config(&mut self) -> &mut ViewerConfig {
            &mut self.config
        }
        fn renderer(&mut self) -> &mut FakeRenderer {
            &mut self.renderer
        }
    }

    fn host_at(yaw: f32, pitch: f32, distance: f32) -> FakeHost {
        let mut host = FakeHost::default();
        host.renderer.camera.set_orbit(yaw, pitch, distance);
        host
    }

    #[test]
    fn test_drag_orbits_only_while_pressed() {
        let mut host = host_at(0.8, 0.5, 3.0);
        let mut controller = ViewerController::new();

        // Motion without a press is ignored
        controller.handle(&mut host, Input::CursorMoved { x: 10.0, y: 10.0 });
        assert_eq!(
            controller.handle(&mut host, Input::CursorMoved { x: 50.0, y: 10.0 }),
            Action::None
        );
        assert_eq!(host.renderer.camera.yaw(), 0.8);

        controller.handle(&mut host, Input::PrimaryButton { pressed: true });
        let action = controller.handle(&mut host, Input::CursorMoved { x: 60.0, y: 30.0 });
        assert_eq!(action, Action::Redraw);

        let mut expected = OrbitCamera::new();
        expected.set_orbit(0.8, 0.5, 3.0);
        expected.drag_delta(10.0, 20.0, 0.01);
        assert_eq!(host.renderer.camera, expected);

        controller.handle(&mut host, Input::PrimaryButton { pressed: false });
        controller.handle(&mut host, Input::CursorMoved { x: 200.0, y: 200.0 });
        assert_eq!(host.renderer.camera, expected);
    }

    #[test]
    fn test_camera_written_back_to_config() {
        let mut host = host_at(0.8, 0.5, 3.0);
        let mut controller = ViewerController::new();

        controller.handle(&mut host, Input::Scroll(5.0));
        assert_eq!(host.config.camera.distance, host.renderer.camera.distance());
        assert!((host.config.camera.distance - 2.5).abs() < 1e-6);

        controller.handle(&mut host, Input::Key('p'));
        assert!(host.config.camera.orthographic);
    }

    #[test]
    fn test_reset_and_quit_keys() {
        let mut host = host_at(-2.0, -1.0, 15.0);
        let mut controller = ViewerController::new();

        assert_eq!(controller.handle(&mut host, Input::Key('r')), Action::Redraw);
        assert_eq!(host.renderer.camera.yaw(), 0.8);
        assert_eq!(host.renderer.camera.pitch(), 0.5);
        assert_eq!(host.renderer.camera.distance(), 3.0);

        assert_eq!(controller.handle(&mut host, Input::Escape), Action::Exit);
        assert_eq!(controller.handle(&mut host, Input::Key('q')), Action::Exit);
        assert_eq!(controller.handle(&mut host, Input::Key('x')), Action::None);
    }

    #[test]
    fn test_dropped_stl_is_loaded_and_framed() {
        let mut host = host_at(0.0, 0.0, 10.0);
        let mut controller = ViewerController::new();

        let action = controller.handle(&mut host, Input::FileDropped("parts/Bracket.STL".into()));
        assert_eq!(action, Action::Redraw);
        assert!(host.renderer.has_mesh());
        assert_eq!(host.renderer.camera.yaw(), 0.8);
        assert!((host.config.camera.distance - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_dropped_files_that_fail_are_ignored() {
        let mut host = host_at(0.0, 0.0, 10.0);
        let mut controller = ViewerController::new();

        assert_eq!(
            controller.handle(&mut host, Input::FileDropped("notes.txt".into())),
            Action::None
        );
        assert_eq!(
            controller.handle(&mut host, Input::FileDropped("broken.stl".into())),
            Action::None
        );
        assert!(!host.renderer.has_mesh());
        assert_eq!(host.renderer.camera.distance(), 10.0);
    }

    #[test]
    fn test_export_uses_configured_output() {
        let mut host = FakeHost::default();
        host.config.render.output_width = 320;
        host.config.render.output_height = 200;
        host.config.render.transparent_background = true;
        let mut controller = ViewerController::new();

        controller.handle(&mut host, Input::Key('s'));
        assert_eq!(host.renderer.output_size, (320, 200));
        assert_eq!(
            host.renderer.exports,
            vec![(PathBuf::from("preview.png"), true)]
        );

        controller.handle(&mut host, Input::FileDropped("models/gear.stl".into()));
        controller.handle(&mut host, Input::Key('s'));
        assert_eq!(
            host.renderer.exports[1].0,
            PathBuf::from("models/gear_render.png")
        );
    }

    #[test]
    fn test_initial_view_without_mesh_uses_config() {
        let mut host = FakeHost::default();
        host.config.camera.yaw = -0.3;
        host.config.camera.pitch = 0.2;
        host.config.camera.distance = 7.0;
        host.config.camera.orthographic = true;

        let config = host.config.camera.clone();
        initial_view(&mut host.renderer, &config);
        let camera = &host.renderer.camera;
        assert_eq!((camera.yaw(), camera.pitch(), camera.distance()), (-0.3, 0.2, 7.0));
        assert_eq!(camera.projection.mode, ProjectionMode::Orthographic);

        // Later camera edits keep the stored projection
        let mut controller = ViewerController::new();
        controller.handle(&mut host, Input::Scroll(1.0));
        assert!(host.config.camera.orthographic);
    }

    #[test]
    fn test_initial_view_with_mesh_targets_it() {
        let mut host = FakeHost::default();
        host.renderer.load_mesh(Path::new("gear.stl")).unwrap();
        host.config.camera.frame_on_load = true;

        let config = host.config.camera.clone();
        initial_view(&mut host.renderer, &config);
        assert!((host.renderer.camera.distance() - 1.5).abs() < 1e-6);
        assert_eq!(host.renderer.camera.yaw(), 0.8);
    }

    #[test]
    fn test_pixel_scroll_conversion() {
        assert_eq!(pixels_to_lines(120.0), 3.0);
        assert_eq!(pixels_to_lines(-40.0), -1.0);
    }
}
