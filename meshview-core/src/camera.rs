/// Orbit camera and projection utilities
use nalgebra::{Matrix4, Point3, Vector3};

use crate::geometry::Mesh;

/// Pitch limit in radians; keeps the camera off the poles where the fixed up vector flips
pub const PITCH_LIMIT: f32 = 1.5;
pub const MIN_DISTANCE: f32 = 1.0;
pub const MAX_DISTANCE: f32 = 20.0;

/// Three-quarter view used whenever the camera is framed on a mesh
pub const FRAME_YAW: f32 = 0.8;
pub const FRAME_PITCH: f32 = 0.5;
pub const FRAME_DISTANCE_FACTOR: f32 = 1.5;

/// Projection mode for rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionMode {
    Orthographic,
    Perspective,
}

/// Projection parameters shared by the preview and export paths
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    pub mode: ProjectionMode,
    pub fov: f32,
    pub near: f32,
    pub far: f32,
}

impl Projection {
    /// Create the projection matrix for a target with the given aspect ratio.
    ///
    /// The orthographic box is as tall as the camera is far from its target,
    /// so zooming still changes the framing.
    pub fn matrix(&self, aspect: f32, distance: f32) -> Matrix4<f32> {
        match self.mode {
            ProjectionMode::Perspective => {
                Matrix4::new_perspective(aspect, self.fov, self.near, self.far)
            }
            ProjectionMode::Orthographic => {
                let height = distance;
                let width = height * aspect;
                Matrix4::new_orthographic(
                    -width / 2.0,
                    width / 2.0,
                    -height / 2.0,
                    height / 2.0,
                    self.near,
                    self.far,
                )
            }
        }
    }

    pub fn toggle_mode(&mut self) {
        self.mode = match self.mode {
            ProjectionMode::Perspective => ProjectionMode::Orthographic,
            ProjectionMode::Orthographic => ProjectionMode::Perspective,
        };
    }
}

impl Default for Projection {
    fn default() -> Self {
        Self {
            mode: ProjectionMode::Perspective,
            fov: std::f32::consts::PI / 4.0, // 45 degrees
            near: 0.1,
            far: 100.0,
        }
    }
}

/// Camera orbiting a target point.
///
/// Yaw, pitch and distance are the source of truth; position and view matrix
/// are derived from them on every change, so the same parameters always
/// produce bit-identical results.
#[derive(Debug, Clone, PartialEq)]
pub struct OrbitCamera {
    yaw: f32,
    pitch: f32,
    distance: f32,
    target: Point3<f32>,
    up: Vector3<f32>,
    position: Point3<f32>,
    view: Matrix4<f32>,
    pub projection: Projection,
}

impl OrbitCamera {
    pub fn new() -> Self {
        let mut camera = Self {
            yaw: 0.0,
            pitch: 0.0,
            distance: 5.0,
            target: Point3::origin(),
            up: Vector3::y(),
            position: Point3::origin(),
            view: Matrix4::identity(),
            projection: Projection::default(),
        };
        camera.place(0.0, 0.0, 5.0);
        camera
    }

    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    pub fn distance(&self) -> f32 {
        self.distance
    }

    pub fn target(&self) -> Point3<f32> {
        self.target
    }

    pub fn position(&self) -> Point3<f32> {
        self.position
    }

    /// Create the view matrix (camera transformation)
    pub fn view_matrix(&self) -> Matrix4<f32> {
        self.view
    }

    pub fn projection_matrix(&self, aspect: f32) -> Matrix4<f32> {
        self.projection.matrix(aspect, self.distance)
    }

    /// Move the camera to the given orbit, clamping pitch and distance to the interactive limits.
    pub fn set_orbit(&mut self, yaw: f32, pitch: f32, distance: f32) {
        self.place(
            yaw,
            pitch.clamp(-PITCH_LIMIT, PITCH_LIMIT),
            distance.clamp(MIN_DISTANCE, MAX_DISTANCE),
        );
    }

    /// Orbit by a pointer drag of `(dx, dy)` pixels.
    pub fn drag_delta(&mut self, dx: f32, dy: f32, sensitivity: f32) {
        let yaw = self.yaw + dx * sensitivity;
        let pitch = (self.pitch + dy * sensitivity).clamp(-PITCH_LIMIT, PITCH_LIMIT);
        self.set_orbit(yaw, pitch, self.distance);
    }

    /// Dolly in (positive ticks) or out (negative ticks).
    pub fn zoom_delta(&mut self, wheel_ticks: f32, sensitivity: f32) {
        let distance = (self.distance - wheel_ticks * sensitivity).clamp(MIN_DISTANCE, MAX_DISTANCE);
        self.set_orbit(self.yaw, self.pitch, distance);
    }

    /// Aim at the mesh centre from the canonical three-quarter view.
    ///
    /// Works in render space, where the mesh is drawn with its `scale` applied.
    /// Orientation is reset rather than preserved. The distance follows the
    /// mesh size with no upper clamp, but never drops below [`MIN_DISTANCE`].
    pub fn frame_mesh(&mut self, mesh: &Mesh) {
        self.target = mesh.center * mesh.scale;
        let extent = mesh.max_dimension() * mesh.scale;
        let distance = (extent * FRAME_DISTANCE_FACTOR).max(MIN_DISTANCE);
        self.place(FRAME_YAW, FRAME_PITCH, distance);
    }

    fn place(&mut self, yaw: f32, pitch: f32, distance: f32) {
        self.yaw = yaw;
        self.pitch = pitch;
        self.distance = distance;

        let offset = Vector3::new(
            pitch.cos() * yaw.cos(),
            pitch.sin(),
            pitch.cos() * yaw.sin(),
        ) * distance;
        self.position = self.target + offset;
        self.view = Matrix4::look_at_rh(&self.position, &self.target, &self.up);
    }
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self::new()
    }
}
